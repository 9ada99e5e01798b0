use crate::client::RetrievalClient;
use async_trait::async_trait;
use consilium_core::{ConsiliumResult, Context, Source};
use tokio::sync::RwLock;

/// A document in the in-memory corpus.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
}

/// In-memory retrieval over a small corpus using brute-force keyword
/// overlap. Suitable for the CLI one-shot mode and tests; production
/// deployments point at a real retrieval service instead.
pub struct InMemoryRetrieval {
    docs: RwLock<Vec<Document>>,
    top_k: usize,
    min_score: f32,
}

impl InMemoryRetrieval {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            top_k: 3,
            min_score: 0.1,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub async fn insert(&self, doc_id: impl Into<String>, text: impl Into<String>) {
        let mut docs = self.docs.write().await;
        docs.push(Document {
            doc_id: doc_id.into(),
            text: text.into(),
        });
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

impl Default for InMemoryRetrieval {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of distinct query tokens (length > 2) found in the document.
fn overlap_score(query: &str, doc: &str) -> f32 {
    let doc_lower = doc.to_lowercase();
    let doc_tokens: std::collections::HashSet<&str> = doc_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .collect();

    let query_lower = query.to_lowercase();
    let query_tokens: std::collections::HashSet<&str> = query_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .collect();

    if query_tokens.is_empty() {
        return 0.0;
    }
    let matched = query_tokens
        .iter()
        .filter(|t| doc_tokens.contains(**t))
        .count();
    matched as f32 / query_tokens.len() as f32
}

/// First ~200 chars of the document, on a char boundary.
fn excerpt_of(text: &str) -> String {
    text.chars().take(200).collect()
}

#[async_trait]
impl RetrievalClient for InMemoryRetrieval {
    async fn retrieve(&self, query: &str) -> ConsiliumResult<Context> {
        let docs = self.docs.read().await;

        let mut scored: Vec<(f32, &Document)> = docs
            .iter()
            .map(|d| (overlap_score(query, &d.text), d))
            .filter(|(score, _)| *score >= self.min_score)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.top_k);

        if scored.is_empty() {
            return Ok(Context::empty());
        }

        let text = scored
            .iter()
            .map(|(_, d)| d.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = scored
            .iter()
            .map(|(score, d)| Source {
                doc_id: d.doc_id.clone(),
                excerpt: excerpt_of(&d.text),
                similarity: *score,
            })
            .collect();

        Ok(Context { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store() -> InMemoryRetrieval {
        let store = InMemoryRetrieval::new();
        store
            .insert(
                "paracetamol-moa",
                "Paracetamol exerts its analgesic mechanism through central \
                 inhibition of COX pathways and serotonergic modulation.",
            )
            .await;
        store
            .insert(
                "ibuprofen-profile",
                "Ibuprofen is a non-selective NSAID with peripheral COX \
                 inhibition and anti-inflammatory action.",
            )
            .await;
        store
            .insert("storage-note", "Store all tablets below 25 degrees.")
            .await;
        store
    }

    #[tokio::test]
    async fn retrieves_relevant_document_first() {
        let store = seeded_store().await;
        let ctx = store
            .retrieve("What is the mechanism of paracetamol?")
            .await
            .unwrap();
        assert!(!ctx.is_empty());
        assert_eq!(ctx.sources[0].doc_id, "paracetamol-moa");
        assert!(ctx.sources[0].similarity > 0.0);
        assert!(ctx.text.contains("analgesic mechanism"));
    }

    #[tokio::test]
    async fn unrelated_query_yields_empty_context() {
        let store = seeded_store().await;
        let ctx = store.retrieve("weather forecast tomorrow").await.unwrap();
        assert!(ctx.is_empty());
        assert!(ctx.sources.is_empty());
    }

    #[tokio::test]
    async fn top_k_bounds_results() {
        let store = InMemoryRetrieval::new().with_top_k(1);
        store.insert("a", "paracetamol dose info").await;
        store.insert("b", "paracetamol overdose info").await;
        let ctx = store.retrieve("paracetamol info").await.unwrap();
        assert_eq!(ctx.sources.len(), 1);
    }

    #[tokio::test]
    async fn empty_store_is_empty_context() {
        let store = InMemoryRetrieval::new();
        assert!(store.is_empty().await);
        let ctx = store.retrieve("anything at all").await.unwrap();
        assert!(ctx.is_empty());
    }

    #[test]
    fn overlap_scoring() {
        let score = overlap_score(
            "paracetamol mechanism",
            "the mechanism of paracetamol is central",
        );
        assert_eq!(score, 1.0);
        assert_eq!(overlap_score("zzz", "entirely different text"), 0.0);
    }
}
