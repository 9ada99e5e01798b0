use crate::llm::{CompletionOptions, LlmClient};
use crate::prompts::PromptBuilder;
use crate::roles::{parse_output, AgentInput};
use consilium_core::{AgentOutput, AgentRole, ConsiliumError, ConsiliumResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// Retry behaviour for transient LLM failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Cap for the exponential backoff delay.
    pub max_delay_ms: u64,
    /// Symmetric jitter fraction applied to each delay (0.2 = ±20 %).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: 0.2,
        }
    }
}

/// Exponential backoff (×2 per attempt) capped at `max_delay_ms`.
fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.max_delay_ms)
}

/// Spread the delay by ±`jitter` so coinciding workflows don't retry in
/// lockstep.
fn apply_jitter(delay_ms: u64, jitter: f64) -> u64 {
    if jitter <= 0.0 || delay_ms == 0 {
        return delay_ms;
    }
    let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
    (delay_ms as f64 * factor).round() as u64
}

/// Per-role wrapper over the LLM transport: builds the prompt through the
/// shared [`PromptBuilder`], applies the role's input/output contract, and
/// retries transient failures with exponential backoff.
pub struct AgentRunner {
    role: AgentRole,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptBuilder>,
    policy: RetryPolicy,
    options: CompletionOptions,
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl AgentRunner {
    pub fn new(
        role: AgentRole,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptBuilder>,
        policy: RetryPolicy,
        options: CompletionOptions,
    ) -> Self {
        Self {
            role,
            llm,
            prompts,
            policy,
            options,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    /// Run one agent invocation. Transient transport/timeout failures are
    /// retried up to `max_retries`; parse failures are surfaced immediately.
    pub async fn invoke(&self, input: &AgentInput) -> ConsiliumResult<AgentOutput> {
        if input.role() != self.role {
            return Err(ConsiliumError::InputInvalid(format!(
                "input for role {} sent to {} runner",
                input.role(),
                self.role
            )));
        }
        input.validate()?;

        let prompt = self.prompts.build(input);
        let started = Instant::now();
        let mut last_err: Option<ConsiliumError> = None;

        for attempt in 0..=self.policy.max_retries {
            match self.llm.complete(&prompt, &self.options).await {
                Ok(completion) => {
                    let output = parse_output(input, completion, started.elapsed())?;
                    info!(
                        role = %self.role,
                        attempt,
                        latency_ms = output.latency_ms,
                        confidence = output.confidence,
                        "Agent invocation complete"
                    );
                    return Ok(output);
                }
                Err(e) if e.is_transient() => {
                    if attempt < self.policy.max_retries {
                        let delay =
                            apply_jitter(compute_backoff(&self.policy, attempt), self.policy.jitter);
                        warn!(
                            role = %self.role,
                            attempt,
                            delay_ms = delay,
                            error = %e,
                            "Transient LLM error, backing off"
                        );
                        self.do_sleep(delay).await;
                    }
                    last_err = Some(e);
                }
                Err(e) => {
                    warn!(role = %self.role, attempt, error = %e, "Non-retryable LLM error");
                    return Err(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ConsiliumError::Internal("retry loop exited without error".into())))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
