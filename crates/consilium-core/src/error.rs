use thiserror::Error;

pub type ConsiliumResult<T> = Result<T, ConsiliumError>;

#[derive(Debug, Error)]
pub enum ConsiliumError {
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("LLM transport error: {0}")]
    LlmTransport(String),

    #[error("Output parse error: {0}")]
    OutputParse(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Human loop expired: {0}")]
    HumanLoopExpired(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsiliumError {
    /// Stable taxonomy code for this error, surfaced in `FinalResponse.error`
    /// and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            ConsiliumError::InputInvalid(_) => "INPUT_INVALID",
            ConsiliumError::RetrievalUnavailable(_) => "RETRIEVAL_UNAVAILABLE",
            ConsiliumError::LlmTransport(_) => "LLM_TRANSPORT",
            ConsiliumError::OutputParse(_) => "OUTPUT_PARSE",
            ConsiliumError::Timeout(_) => "TIMEOUT",
            ConsiliumError::HumanLoopExpired(_) => "HUMAN_LOOP_EXPIRED",
            ConsiliumError::Conflict(_) => "CONFLICT",
            ConsiliumError::NotFound(_) => "NOT_FOUND",
            ConsiliumError::Config(_) => "CONFIG",
            ConsiliumError::Internal(_) | ConsiliumError::Json(_) | ConsiliumError::Io(_) => {
                "INTERNAL"
            }
        }
    }

    /// Whether this error is transient and worth retrying with backoff.
    ///
    /// Only transport failures and timeouts qualify. Parse errors are not
    /// retried: the prompt is deterministic, so reissuing rarely helps.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConsiliumError::LlmTransport(_) | ConsiliumError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_match_taxonomy() {
        assert_eq!(ConsiliumError::InputInvalid("x".into()).kind(), "INPUT_INVALID");
        assert_eq!(ConsiliumError::LlmTransport("x".into()).kind(), "LLM_TRANSPORT");
        assert_eq!(ConsiliumError::OutputParse("x".into()).kind(), "OUTPUT_PARSE");
        assert_eq!(ConsiliumError::Timeout("x".into()).kind(), "TIMEOUT");
        assert_eq!(
            ConsiliumError::HumanLoopExpired("x".into()).kind(),
            "HUMAN_LOOP_EXPIRED"
        );
        assert_eq!(ConsiliumError::Internal("x".into()).kind(), "INTERNAL");
    }

    #[test]
    fn transient_classification() {
        assert!(ConsiliumError::LlmTransport("503".into()).is_transient());
        assert!(ConsiliumError::Timeout("slow".into()).is_transient());
        assert!(!ConsiliumError::OutputParse("bad vote".into()).is_transient());
        assert!(!ConsiliumError::InputInvalid("short".into()).is_transient());
    }

    #[test]
    fn display_format() {
        let err = ConsiliumError::Conflict("already resolved".into());
        assert_eq!(err.to_string(), "Conflict: already resolved");
    }
}
