use async_trait::async_trait;
use consilium_core::ConsiliumResult;

/// Per-call completion options.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub timeout_ms: u64,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_tokens: 1024,
        }
    }
}

/// A raw model completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Model-reported confidence in its own answer, when the backend
    /// provides one.
    pub self_confidence: Option<f32>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            self_confidence: None,
        }
    }
}

/// The LLM transport capability. The engine treats it as fallible and
/// possibly slow; retries and backoff live in [`crate::AgentRunner`], not in
/// implementations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> ConsiliumResult<Completion>;
}
