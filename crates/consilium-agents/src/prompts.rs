//! Prompt construction for the four agent roles.
//!
//! There is exactly one [`PromptBuilder`] per process, shared by every
//! runner. Template updates are an atomic pointer swap: an in-flight call
//! sees either the old or the new set, never a torn mix, and no agent keeps
//! a private copy that could drift.

use crate::roles::AgentInput;
use consilium_core::lang::uncertainty_acknowledgement;
use consilium_core::{Context, Language};
use std::sync::{Arc, RwLock};

/// One template per role. Placeholders: `{query}`, `{context}`, `{draft}`,
/// `{analysis}`, `{language}`, `{acknowledgement}`, `{source_language}`,
/// `{target_language}`, `{text}`.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub generator: String,
    pub verifier: String,
    pub reformer: String,
    pub translator: String,
}

const GENERATOR_TEMPLATE: &str = "\
You are the Generator, an assistant for medical research questions. Answer \
strictly from the provided sources; never invent medical facts.

Sources:
{context}

Question: {query}

Rules:
- Answer in {language}.
- Structure the answer as bullet points, one per line with a blank line \
after each: 💊 for medical benefits, ⚠️ for warnings, 🔬 for research \
findings, 📚 for source references.
- If the sources do not cover the question, reply exactly: \
\"{acknowledgement}\"
- End with a line `CONFIDENCE: <0.0-1.0>` scoring how well the sources \
support your answer.

Answer:";

const VERIFIER_TEMPLATE: &str = "\
You are the Verifier. Judge whether the draft answer below is accurate, \
complete, safe, and grounded in the sources.

Question: {query}

Sources:
{context}

Draft answer:
{draft}

Write a short analysis, then end with exactly two lines:
VOTE: YES or VOTE: NO
CONFIDENCE: <0.0-1.0>";

const REFORMER_TEMPLATE: &str = "\
You are the Reformer. Rewrite the draft answer to address the verifier's \
criticism. Preserve every supported factual claim; add structure, do not \
add new claims.

Question: {query}

Sources:
{context}

Draft answer:
{draft}

Verifier analysis:
{analysis}

Rules:
- Answer in {language}.
- Keep the bullet structure with one point per line and a blank line after \
each (💊 / ⚠️ / 🔬 / 📚).

Rewritten answer:";

const TRANSLATOR_TEMPLATE: &str = "\
You are the Translator. Translate the answer below from {source_language} \
to {target_language}. Preserve medical terminology, safety warnings, source \
references, and the bullet structure exactly.

Answer:
{text}

Translation:";

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            generator: GENERATOR_TEMPLATE.to_string(),
            verifier: VERIFIER_TEMPLATE.to_string(),
            reformer: REFORMER_TEMPLATE.to_string(),
            translator: TRANSLATOR_TEMPLATE.to_string(),
        }
    }
}

/// Shared prompt constructor. Hand one `Arc<PromptBuilder>` to all four
/// runners; `update` propagates to every agent on its next call.
pub struct PromptBuilder {
    current: RwLock<Arc<PromptSet>>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(PromptSet::default())),
        }
    }

    pub fn with_set(set: PromptSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Swap in a new template set.
    pub fn update(&self, set: PromptSet) {
        let mut guard = self.current.write().expect("prompt lock poisoned");
        *guard = Arc::new(set);
    }

    /// The template set currently in effect.
    pub fn snapshot(&self) -> Arc<PromptSet> {
        self.current.read().expect("prompt lock poisoned").clone()
    }

    /// Render the prompt for one agent invocation.
    pub fn build(&self, input: &AgentInput) -> String {
        let set = self.snapshot();
        match input {
            AgentInput::Generate {
                query,
                context,
                language,
            } => set
                .generator
                .replace("{context}", &context_block(context))
                .replace("{query}", query)
                .replace("{language}", language.name())
                .replace("{acknowledgement}", uncertainty_acknowledgement(*language)),
            AgentInput::Verify {
                query,
                context,
                draft,
                ..
            } => set
                .verifier
                .replace("{context}", &context_block(context))
                .replace("{query}", query)
                .replace("{draft}", draft),
            AgentInput::Reform {
                query,
                context,
                draft,
                analysis,
                language,
            } => set
                .reformer
                .replace("{context}", &context_block(context))
                .replace("{query}", query)
                .replace("{draft}", draft)
                .replace("{analysis}", analysis)
                .replace("{language}", language.name()),
            AgentInput::Translate {
                text,
                source,
                target,
            } => set
                .translator
                .replace("{source_language}", source.name())
                .replace("{target_language}", target.name())
                .replace("{text}", text),
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn context_block(context: &Context) -> String {
    if context.is_empty() {
        "(no relevant passages were retrieved)".to_string()
    } else {
        context.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consilium_core::Context;

    fn generate_input(language: Language) -> AgentInput {
        AgentInput::Generate {
            query: "What is the mechanism of action of paracetamol?".into(),
            context: Context {
                text: "Paracetamol inhibits central COX pathways.".into(),
                sources: vec![],
            },
            language,
        }
    }

    #[test]
    fn generator_prompt_carries_language_and_acknowledgement() {
        let builder = PromptBuilder::new();
        let prompt = builder.build(&generate_input(Language::Fr));
        assert!(prompt.contains("Answer in French."));
        assert!(prompt.contains("Je ne trouve pas cette information"));
        assert!(prompt.contains("Paracetamol inhibits central COX pathways."));
        assert!(prompt.contains("💊"));
    }

    #[test]
    fn empty_context_gets_explicit_marker() {
        let builder = PromptBuilder::new();
        let prompt = builder.build(&AgentInput::Generate {
            query: "What is the weather today?".into(),
            context: Context::empty(),
            language: Language::En,
        });
        assert!(prompt.contains("(no relevant passages were retrieved)"));
    }

    #[test]
    fn verifier_prompt_demands_vote_protocol() {
        let builder = PromptBuilder::new();
        let prompt = builder.build(&AgentInput::Verify {
            query: "q".into(),
            context: Context::empty(),
            draft: "the draft".into(),
            language: Language::En,
        });
        assert!(prompt.contains("VOTE: YES or VOTE: NO"));
        assert!(prompt.contains("CONFIDENCE:"));
        assert!(prompt.contains("the draft"));
    }

    #[test]
    fn translator_prompt_names_both_languages() {
        let builder = PromptBuilder::new();
        let prompt = builder.build(&AgentInput::Translate {
            text: "• 💊 Pain relief".into(),
            source: Language::En,
            target: Language::De,
        });
        assert!(prompt.contains("from English"));
        assert!(prompt.contains("to German"));
        assert!(prompt.contains("• 💊 Pain relief"));
    }

    #[test]
    fn update_propagates_to_next_build() {
        let builder = PromptBuilder::new();
        let before = builder.build(&generate_input(Language::En));
        assert!(!before.contains("CUSTOM GENERATOR"));

        let mut set = PromptSet::default();
        set.generator = "CUSTOM GENERATOR {query}".to_string();
        builder.update(set);

        let after = builder.build(&generate_input(Language::En));
        assert!(after.starts_with("CUSTOM GENERATOR"));
    }

    #[test]
    fn snapshot_is_stable_across_update() {
        let builder = PromptBuilder::new();
        let old = builder.snapshot();
        builder.update(PromptSet {
            generator: "new".into(),
            ..PromptSet::default()
        });
        // The old snapshot still points at the old templates.
        assert!(old.generator.contains("You are the Generator"));
        assert!(builder.snapshot().generator == "new");
    }
}
