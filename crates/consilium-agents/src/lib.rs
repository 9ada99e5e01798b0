//! Role-specialized LLM agents for the Consilium pipeline.
//!
//! # Main types
//!
//! - [`LlmClient`] — the abstract completion transport (HTTP backend included).
//! - [`PromptBuilder`] — the single shared prompt constructor.
//! - [`AgentRunner`] — per-role wrapper applying input validation, output
//!   parsing, and retry with exponential backoff.
//! - [`AgentInput`] — typed per-role invocation inputs.

/// LLM transport backends.
pub mod backends;
/// Completion transport capability.
pub mod llm;
/// Shared prompt templates.
pub mod prompts;
/// Per-role input and output contracts.
pub mod roles;
/// The retrying agent runner.
pub mod runner;

pub use backends::HttpLlmClient;
pub use llm::{Completion, CompletionOptions, LlmClient};
pub use prompts::{PromptBuilder, PromptSet};
pub use roles::AgentInput;
pub use runner::{AgentRunner, RetryPolicy};
