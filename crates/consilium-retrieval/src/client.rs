use async_trait::async_trait;
use consilium_core::{ConsiliumError, ConsiliumResult, Context, Source};
use serde::Serialize;

/// The retrieval capability: grounding passages for a query.
///
/// Implementations may return an empty context; the pipeline treats that as
/// a normal outcome, not a failure.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn retrieve(&self, query: &str) -> ConsiliumResult<Context>;
}

/// HTTP retrieval backend: `POST {base}/retrieve` with
/// `{"query": ..., "top_k": ...}`, expecting
/// `{"context": string, "sources": [{doc_id, excerpt, similarity}]}`.
pub struct HttpRetrievalClient {
    base_url: String,
    top_k: usize,
    http: reqwest::Client,
}

impl HttpRetrievalClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            top_k: 5,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[derive(Serialize)]
struct RetrieveBody<'a> {
    query: &'a str,
    top_k: usize,
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn retrieve(&self, query: &str) -> ConsiliumResult<Context> {
        let url = format!("{}/retrieve", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(&RetrieveBody {
                query,
                top_k: self.top_k,
            })
            .send()
            .await
            .map_err(|e| ConsiliumError::RetrievalUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ConsiliumError::RetrievalUnavailable(format!(
                "retrieval service returned {}",
                status
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ConsiliumError::RetrievalUnavailable(e.to_string()))?;

        let text = body["context"].as_str().unwrap_or_default().to_string();
        let sources = body["sources"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|s| {
                        Some(Source {
                            doc_id: s["doc_id"].as_str()?.to_string(),
                            excerpt: s["excerpt"].as_str().unwrap_or_default().to_string(),
                            similarity: s["similarity"].as_f64().unwrap_or(0.0) as f32,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Context { text, sources })
    }
}
