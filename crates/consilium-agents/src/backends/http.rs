use crate::llm::{Completion, CompletionOptions, LlmClient};
use async_trait::async_trait;
use consilium_core::{ConsiliumError, ConsiliumResult};
use serde::Serialize;
use std::time::Duration;

/// HTTP completion backend for any provider exposing a
/// `POST {base}/v1/completions` endpoint with bearer auth.
pub struct HttpLlmClient {
    base_url: String,
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> ConsiliumResult<Completion> {
        let url = format!("{}/v1/completions", self.base_url.trim_end_matches('/'));
        let body = CompletionBody {
            model: &self.model,
            prompt,
            max_tokens: options.max_tokens,
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_millis(options.timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConsiliumError::Timeout(format!("LLM call exceeded {}ms", options.timeout_ms))
                } else {
                    ConsiliumError::LlmTransport(e.to_string())
                }
            })?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ConsiliumError::LlmTransport(e.to_string()))?;

        if !status.is_success() {
            return Err(ConsiliumError::LlmTransport(format!(
                "LLM API error {}: {}",
                status, resp_body
            )));
        }

        let text = resp_body["text"]
            .as_str()
            .or_else(|| resp_body["choices"][0]["text"].as_str())
            .ok_or_else(|| {
                ConsiliumError::OutputParse("missing text in completion response".into())
            })?
            .to_string();

        let self_confidence = resp_body["self_confidence"]
            .as_f64()
            .map(|c| c.clamp(0.0, 1.0) as f32);

        Ok(Completion {
            text,
            self_confidence,
        })
    }
}
