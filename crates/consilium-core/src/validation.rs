//! Human-validation types shared by the review manager, the orchestrator,
//! and the gateway.
//!
//! These live in `consilium-core` so the three consumers can share them
//! without circular deps.

use crate::lang::Language;
use crate::safety::TriggerKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a validation request. `Pending` is the only
/// non-terminal state; `Expired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
    Modified,
    Expired,
}

impl ValidationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ValidationStatus::Pending)
    }
}

/// A reviewer's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    Rejected,
    Modified,
}

impl Decision {
    /// The terminal status this decision transitions a request into.
    pub fn terminal_status(&self) -> ValidationStatus {
        match self {
            Decision::Approved => ValidationStatus::Approved,
            Decision::Rejected => ValidationStatus::Rejected,
            Decision::Modified => ValidationStatus::Modified,
        }
    }
}

/// Body of a decision submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionBody {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A pending (or resolved) human validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub id: Uuid,
    pub query_fingerprint: String,
    pub query_text: String,
    pub detected_language: Language,
    pub trigger_kind: TriggerKind,
    pub priority: u8,
    pub draft_response: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ValidationRequest {
    pub fn new(
        query_fingerprint: impl Into<String>,
        query_text: impl Into<String>,
        detected_language: Language,
        trigger_kind: TriggerKind,
        draft_response: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            query_fingerprint: query_fingerprint.into(),
            query_text: query_text.into(),
            detected_language,
            trigger_kind,
            priority: trigger_kind.priority(),
            draft_response: draft_response.into(),
            created_at: now,
            expires_at: now + timeout,
            status: ValidationStatus::Pending,
            decision: None,
            modified_text: None,
            reviewer_notes: None,
            resolved_at: None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ValidationStatus::Pending && now >= self.expires_at
    }

    /// The text a terminal decision selects: the reviewer's replacement for
    /// MODIFIED, the original draft otherwise.
    pub fn effective_text(&self) -> &str {
        match self.status {
            ValidationStatus::Modified => {
                self.modified_text.as_deref().unwrap_or(&self.draft_response)
            }
            _ => &self.draft_response,
        }
    }

    /// Wall-clock wait between creation and resolution, if resolved.
    pub fn wait_ms(&self) -> Option<u64> {
        self.resolved_at.map(|resolved| {
            (resolved - self.created_at).num_milliseconds().max(0) as u64
        })
    }
}

/// Queue statistics. The field names `pending`, `approved`, `rejected`,
/// `expired` and `avg_wait_ms` are part of the external contract; the rest
/// are additive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationStats {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub modified: usize,
    pub expired: usize,
    pub total: usize,
    pub avg_wait_ms: u64,
    pub approval_rate: f32,
}
