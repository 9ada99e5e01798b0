//! Per-role input variants and strict output parsing.
//!
//! Each role has its own output obligation: the Generator must ground its
//! confidence, the Verifier must vote through a closed protocol, the
//! Reformer and Translator must return usable text. Anything that fails the
//! role contract is mapped here, never in the orchestrator.

use crate::llm::Completion;
use consilium_core::lang;
use consilium_core::{AgentOutput, AgentRole, ConsiliumError, ConsiliumResult, Context, Language, Vote};
use std::time::Duration;

/// Floor for a grounded (non-uncertain) Generator answer; keeps it clear of
/// the reject band.
const GROUNDED_CONFIDENCE_FLOOR: f32 = 0.35;

/// Ceiling for an uncertainty acknowledgement.
const UNCERTAIN_CONFIDENCE_CEILING: f32 = 0.3;

/// Default verifier confidence when the vote line parsed but no
/// `CONFIDENCE:` line was given: squarely in the middle band.
const VERIFIER_DEFAULT_CONFIDENCE: f32 = 0.5;

/// Input to one agent invocation.
#[derive(Debug, Clone)]
pub enum AgentInput {
    Generate {
        query: String,
        context: Context,
        language: Language,
    },
    Verify {
        query: String,
        context: Context,
        draft: String,
        language: Language,
    },
    Reform {
        query: String,
        context: Context,
        draft: String,
        analysis: String,
        language: Language,
    },
    Translate {
        text: String,
        source: Language,
        target: Language,
    },
}

impl AgentInput {
    pub fn role(&self) -> AgentRole {
        match self {
            AgentInput::Generate { .. } => AgentRole::Generator,
            AgentInput::Verify { .. } => AgentRole::Verifier,
            AgentInput::Reform { .. } => AgentRole::Reformer,
            AgentInput::Translate { .. } => AgentRole::Translator,
        }
    }

    /// Role-contract pre-conditions.
    pub fn validate(&self) -> ConsiliumResult<()> {
        let invalid = |what: &str| {
            Err(ConsiliumError::InputInvalid(format!(
                "{} must not be empty",
                what
            )))
        };
        match self {
            AgentInput::Generate { query, .. } if query.trim().is_empty() => invalid("query"),
            AgentInput::Verify { query, draft, .. }
                if query.trim().is_empty() || draft.trim().is_empty() =>
            {
                invalid("query and draft")
            }
            AgentInput::Reform { draft, .. } if draft.trim().is_empty() => invalid("draft"),
            AgentInput::Translate { text, source, target } => {
                if text.trim().is_empty() {
                    return invalid("text");
                }
                if source == target {
                    return Err(ConsiliumError::InputInvalid(
                        "translation source and target languages are equal".into(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Map a raw completion to a typed [`AgentOutput`] per the role contract.
pub fn parse_output(
    input: &AgentInput,
    completion: Completion,
    latency: Duration,
) -> ConsiliumResult<AgentOutput> {
    let latency_ms = latency.as_millis() as u64;
    match input {
        AgentInput::Generate {
            context, language, ..
        } => parse_generator(completion, context, *language, latency_ms),
        AgentInput::Verify { .. } => Ok(parse_verifier(completion, latency_ms)),
        AgentInput::Reform { .. } => parse_reformer(completion, latency_ms),
        AgentInput::Translate { .. } => parse_translator(completion, latency_ms),
    }
}

fn parse_generator(
    completion: Completion,
    context: &Context,
    language: Language,
    latency_ms: u64,
) -> ConsiliumResult<AgentOutput> {
    let (text, inline_confidence) = split_confidence_trailer(completion.text.trim());
    if text.is_empty() {
        return Err(ConsiliumError::OutputParse(
            "generator returned an empty answer".into(),
        ));
    }

    let uncertain = is_uncertainty_acknowledgement(&text, language);
    let reported = completion
        .self_confidence
        .or(inline_confidence)
        .unwrap_or_else(|| context.max_similarity());
    let confidence = if uncertain {
        reported.min(UNCERTAIN_CONFIDENCE_CEILING)
    } else {
        reported.clamp(GROUNDED_CONFIDENCE_FLOOR, 1.0)
    };

    Ok(AgentOutput {
        role: AgentRole::Generator,
        text,
        confidence,
        vote: None,
        analysis: None,
        latency_ms,
    })
}

/// Peel a trailing `CONFIDENCE: <0..1>` self-report off a generator answer.
fn split_confidence_trailer(text: &str) -> (String, Option<f32>) {
    if let Some((body, last)) = text.rsplit_once('\n') {
        let upper = last.trim().to_ascii_uppercase();
        if let Some(value) = upper.strip_prefix("CONFIDENCE:") {
            if let Ok(c) = value.trim().parse::<f32>() {
                return (body.trim().to_string(), Some(c.clamp(0.0, 1.0)));
            }
        }
    }
    (text.to_string(), None)
}

/// Detect the per-language uncertainty acknowledgement.
pub fn is_uncertainty_acknowledgement(text: &str, language: Language) -> bool {
    let lowered = text.to_lowercase();
    let canonical = lang::uncertainty_acknowledgement(language).to_lowercase();
    if lowered.contains(&canonical) {
        return true;
    }
    // Shortened phrasings the model may produce.
    const MARKERS: &[&str] = &[
        "cannot find this information",
        "ne trouve pas cette information",
        "no encuentro esta información",
        "kann diese information",
    ];
    MARKERS.iter().any(|m| lowered.contains(m))
}

/// Strict verifier parsing: a well-formed reply carries a `VOTE: YES|NO`
/// line and optionally `CONFIDENCE: <0..1>`. Anything else is `UNKNOWN`
/// with confidence 0.0 — never an error, so the orchestrator can route it
/// into the reform path.
fn parse_verifier(completion: Completion, latency_ms: u64) -> AgentOutput {
    let mut vote: Option<Vote> = None;
    let mut confidence: Option<f32> = None;
    let mut analysis_lines: Vec<&str> = Vec::new();

    for line in completion.text.lines() {
        let trimmed = line.trim();
        let upper = trimmed.to_ascii_uppercase();
        if let Some(value) = upper.strip_prefix("VOTE:") {
            vote = match value.trim().trim_end_matches(['.', '!']) {
                "YES" => Some(Vote::Yes),
                "NO" => Some(Vote::No),
                _ => None,
            };
        } else if let Some(value) = upper.strip_prefix("CONFIDENCE:") {
            confidence = value.trim().parse::<f32>().ok().map(|c| c.clamp(0.0, 1.0));
        } else if !trimmed.is_empty() {
            analysis_lines.push(trimmed);
        }
    }

    let analysis = analysis_lines.join("\n");
    match vote {
        Some(v) => AgentOutput {
            role: AgentRole::Verifier,
            text: completion.text.trim().to_string(),
            confidence: confidence.unwrap_or(VERIFIER_DEFAULT_CONFIDENCE),
            vote: Some(v),
            analysis: Some(analysis),
            latency_ms,
        },
        None => AgentOutput {
            role: AgentRole::Verifier,
            text: completion.text.trim().to_string(),
            confidence: 0.0,
            vote: Some(Vote::Unknown),
            analysis: Some(analysis),
            latency_ms,
        },
    }
}

fn parse_reformer(completion: Completion, latency_ms: u64) -> ConsiliumResult<AgentOutput> {
    let text = strip_code_fences(completion.text.trim());
    if text.is_empty() {
        return Err(ConsiliumError::OutputParse(
            "reformer returned an empty rewrite".into(),
        ));
    }
    Ok(AgentOutput {
        role: AgentRole::Reformer,
        text,
        confidence: completion.self_confidence.unwrap_or(0.5),
        vote: None,
        analysis: None,
        latency_ms,
    })
}

fn parse_translator(completion: Completion, latency_ms: u64) -> ConsiliumResult<AgentOutput> {
    let text = completion.text.trim().to_string();
    if text.is_empty() {
        return Err(ConsiliumError::OutputParse(
            "translator returned an empty translation".into(),
        ));
    }
    Ok(AgentOutput {
        role: AgentRole::Translator,
        text,
        confidence: completion.self_confidence.unwrap_or(1.0),
        vote: None,
        analysis: None,
        latency_ms,
    })
}

/// Models occasionally wrap their rewrite in a markdown fence; unwrap the
/// first fenced block, otherwise return the text as-is.
fn strip_code_fences(text: &str) -> String {
    if let Some(start) = text.find("```") {
        let after = start + 3;
        let body_start = text[after..]
            .find('\n')
            .map(|i| after + i + 1)
            .unwrap_or(after);
        if let Some(end) = text[body_start..].find("```") {
            return text[body_start..body_start + end].trim().to_string();
        }
    }
    text.to_string()
}
