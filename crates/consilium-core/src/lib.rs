//! Core data model, classifiers, configuration, and audit sink for the
//! Consilium consensus engine.
//!
//! Everything the other crates share lives here: the error taxonomy, the
//! query/response envelope types, the human-validation types, the pure
//! language and safety classifiers, and the append-only audit log.

/// Append-only audit sink.
pub mod audit;
/// Orchestrator tunables.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Language detection and localized service messages.
pub mod lang;
/// Safety-trigger classification.
pub mod safety;
/// Query, context, agent output, and response envelope types.
pub mod types;
/// Human-validation request types.
pub mod validation;

pub use audit::{AuditEntry, AuditLog};
pub use config::OrchestratorConfig;
pub use error::{ConsiliumError, ConsiliumResult};
pub use lang::{detect, safe_refusal, uncertainty_acknowledgement, Detection, Language};
pub use safety::{classify, SafetyTrigger, TriggerKind};
pub use types::{
    normalize_query, AgentOutput, AgentRole, Consensus, Context, FinalResponse, IterationRecord,
    Query, Source, Vote, MAX_QUERY_CHARS, MIN_QUERY_CHARS,
};
pub use validation::{
    Decision, DecisionBody, ValidationRequest, ValidationStats, ValidationStatus,
};
