//! Core data model: queries, retrieval context, agent outputs, and the
//! final response envelope.

use crate::error::{ConsiliumError, ConsiliumResult};
use crate::lang::Language;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Query length bounds, in characters.
pub const MIN_QUERY_CHARS: usize = 10;
pub const MAX_QUERY_CHARS: usize = 1000;

/// A user-submitted question. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub target_language: Option<Language>,
    pub enable_human_loop: bool,
    pub request_id: Uuid,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target_language: None,
            enable_human_loop: true,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn with_target_language(mut self, lang: Language) -> Self {
        self.target_language = Some(lang);
        self
    }

    pub fn with_human_loop(mut self, enabled: bool) -> Self {
        self.enable_human_loop = enabled;
        self
    }

    /// Pre-condition check applied before any workflow starts.
    pub fn validate(&self) -> ConsiliumResult<()> {
        let len = self.text.chars().count();
        if len < MIN_QUERY_CHARS {
            return Err(ConsiliumError::InputInvalid(format!(
                "query too short: {} chars (minimum {})",
                len, MIN_QUERY_CHARS
            )));
        }
        if len > MAX_QUERY_CHARS {
            return Err(ConsiliumError::InputInvalid(format!(
                "query too long: {} chars (maximum {})",
                len, MAX_QUERY_CHARS
            )));
        }
        Ok(())
    }

    /// Stable fingerprint over (normalized text, target language, human-loop
    /// flag); key for caching and single-flight coalescing.
    pub fn fingerprint(&self) -> String {
        let target = self
            .target_language
            .map(|l| l.code())
            .unwrap_or("AUTO");
        let material = format!(
            "{}\n{}\n{}",
            normalize_query(&self.text),
            target,
            self.enable_human_loop
        );
        let digest = Sha256::digest(material.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..32].to_string()
    }
}

/// Lowercase and collapse whitespace; punctuation is preserved so that
/// "dose?" and "dose!" remain distinct queries.
pub fn normalize_query(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// One retrieved grounding passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub doc_id: String,
    pub excerpt: String,
    pub similarity: f32,
}

/// Retrieved grounding for a query. May be empty: the Generator then answers
/// with an explicit uncertainty acknowledgement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    pub text: String,
    pub sources: Vec<Source>,
}

impl Context {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Highest source similarity, 0.0 when no sources were retrieved.
    pub fn max_similarity(&self) -> f32 {
        self.sources
            .iter()
            .map(|s| s.similarity)
            .fold(0.0_f32, f32::max)
    }
}

/// Verifier verdict. `Unknown` is reserved for parser failure and never
/// emitted by a well-formed model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vote {
    Yes,
    No,
    Unknown,
}

impl std::fmt::Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vote::Yes => f.write_str("YES"),
            Vote::No => f.write_str("NO"),
            Vote::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// The four specialized agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Generator,
    Verifier,
    Reformer,
    Translator,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Generator => f.write_str("generator"),
            AgentRole::Verifier => f.write_str("verifier"),
            AgentRole::Reformer => f.write_str("reformer"),
            AgentRole::Translator => f.write_str("translator"),
        }
    }
}

/// Result of one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub role: AgentRole,
    pub text: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<Vote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    pub latency_ms: u64,
}

/// One pass through the verify/reform loop, accumulated inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_out: Option<AgentOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_out: Option<AgentOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reformer_out: Option<AgentOutput>,
}

/// Terminal verdict of the iteration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Consensus {
    Approved,
    ReformedApproved,
    PendingValidation,
    Fallback,
    Failed,
}

impl Consensus {
    /// Only fully approved outcomes are memoized.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Consensus::Approved | Consensus::ReformedApproved)
    }
}

impl std::fmt::Display for Consensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Consensus::Approved => "APPROVED",
            Consensus::ReformedApproved => "REFORMED_APPROVED",
            Consensus::PendingValidation => "PENDING_VALIDATION",
            Consensus::Fallback => "FALLBACK",
            Consensus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// The output envelope for a completed workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    pub success: bool,
    pub answer: String,
    pub sources: Vec<Source>,
    pub detected_language: Language,
    pub target_language: Language,
    pub consensus: Consensus,
    pub iterations_used: u32,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub flagged_uncertain: bool,
    #[serde(default)]
    pub untranslated: bool,
}

impl FinalResponse {
    pub fn is_cacheable(&self) -> bool {
        self.consensus.is_cacheable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_validation_bounds() {
        assert!(Query::new("too short").validate().is_err());
        assert!(Query::new("What is paracetamol used for?").validate().is_ok());
        assert!(Query::new("x".repeat(1001)).validate().is_err());
        assert!(Query::new("x".repeat(1000)).validate().is_ok());
    }

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_query("  What   IS\tparacetamol? "),
            "what is paracetamol?"
        );
    }

    #[test]
    fn fingerprint_is_stable_under_whitespace_and_case() {
        let a = Query::new("What is paracetamol?");
        let b = Query::new("  what IS   paracetamol? ");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_preserves_punctuation() {
        let a = Query::new("What is paracetamol?");
        let b = Query::new("What is paracetamol!");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_varies_with_target_language_and_human_loop() {
        let base = Query::new("What is paracetamol used for?");
        let with_lang = base.clone().with_target_language(Language::Fr);
        let without_hitl = base.clone().with_human_loop(false);
        assert_ne!(base.fingerprint(), with_lang.fingerprint());
        assert_ne!(base.fingerprint(), without_hitl.fingerprint());
    }

    #[test]
    fn context_emptiness_and_similarity() {
        let empty = Context::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.max_similarity(), 0.0);

        let ctx = Context {
            text: "Paracetamol inhibits COX enzymes.".into(),
            sources: vec![
                Source {
                    doc_id: "doc-1".into(),
                    excerpt: "COX inhibition".into(),
                    similarity: 0.62,
                },
                Source {
                    doc_id: "doc-2".into(),
                    excerpt: "analgesic".into(),
                    similarity: 0.81,
                },
            ],
        };
        assert!(!ctx.is_empty());
        assert_eq!(ctx.max_similarity(), 0.81);
    }

    #[test]
    fn consensus_cacheability() {
        assert!(Consensus::Approved.is_cacheable());
        assert!(Consensus::ReformedApproved.is_cacheable());
        assert!(!Consensus::PendingValidation.is_cacheable());
        assert!(!Consensus::Fallback.is_cacheable());
        assert!(!Consensus::Failed.is_cacheable());
    }

    #[test]
    fn consensus_wire_format() {
        assert_eq!(
            serde_json::to_string(&Consensus::ReformedApproved).unwrap(),
            "\"REFORMED_APPROVED\""
        );
        assert_eq!(
            serde_json::to_string(&Consensus::PendingValidation).unwrap(),
            "\"PENDING_VALIDATION\""
        );
    }

    #[test]
    fn vote_wire_format() {
        assert_eq!(serde_json::to_string(&Vote::Yes).unwrap(), "\"YES\"");
        let v: Vote = serde_json::from_str("\"UNKNOWN\"").unwrap();
        assert_eq!(v, Vote::Unknown);
    }

    #[test]
    fn final_response_roundtrip() {
        let resp = FinalResponse {
            success: true,
            answer: "• 💊 Analgesic effect".into(),
            sources: vec![],
            detected_language: Language::En,
            target_language: Language::En,
            consensus: Consensus::Approved,
            iterations_used: 1,
            processing_time_ms: 42,
            validation_id: None,
            error: None,
            flagged_uncertain: false,
            untranslated: false,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("validation_id"));
        let parsed: FinalResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.consensus, Consensus::Approved);
        assert_eq!(parsed.iterations_used, 1);
    }
}
