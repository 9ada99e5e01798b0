use serde::{Deserialize, Serialize};

/// Tunables for the query lifecycle. Every field has a serde default so a
/// partial TOML section deserializes cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on verify/reform loop passes.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// vote=YES with confidence at or above this approves.
    #[serde(default = "default_approve_threshold")]
    pub verifier_approve_threshold: f32,
    /// vote=NO, or confidence below this, enters the reform path.
    #[serde(default = "default_reject_threshold")]
    pub verifier_reject_threshold: f32,
    /// Per-LLM-call retry cap for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Exponential backoff base delay.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Cap for the exponential backoff delay.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Per-LLM-call timeout.
    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,
    /// End-to-end workflow cap, excluding the human-loop wait.
    #[serde(default = "default_workflow_timeout_ms")]
    pub workflow_timeout_ms: u64,
    /// Cache entry lifetime in seconds.
    #[serde(default = "default_cache_ttl_s")]
    pub cache_ttl_s: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Validation expiry in seconds.
    #[serde(default = "default_human_loop_timeout_s")]
    pub human_loop_timeout_s: u64,
    /// Default for requests omitting `enable_human_loop`.
    #[serde(default = "default_enable_human_loop")]
    pub enable_human_loop_default: bool,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_approve_threshold() -> f32 {
    0.7
}

fn default_reject_threshold() -> f32 {
    0.3
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_llm_timeout_ms() -> u64 {
    30_000
}

fn default_llm_max_tokens() -> u32 {
    1024
}

fn default_workflow_timeout_ms() -> u64 {
    120_000
}

fn default_cache_ttl_s() -> u64 {
    3600
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_human_loop_timeout_s() -> u64 {
    3600
}

fn default_enable_human_loop() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            verifier_approve_threshold: default_approve_threshold(),
            verifier_reject_threshold: default_reject_threshold(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            llm_timeout_ms: default_llm_timeout_ms(),
            llm_max_tokens: default_llm_max_tokens(),
            workflow_timeout_ms: default_workflow_timeout_ms(),
            cache_ttl_s: default_cache_ttl_s(),
            cache_capacity: default_cache_capacity(),
            human_loop_timeout_s: default_human_loop_timeout_s(),
            enable_human_loop_default: default_enable_human_loop(),
        }
    }
}
