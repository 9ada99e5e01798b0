use consilium_cache::ResponseCache;
use consilium_review::HumanLoopManager;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Health snapshot of the core components.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall: String,
    pub components: BTreeMap<String, serde_json::Value>,
}

pub(crate) async fn report(
    cache: &Arc<ResponseCache>,
    human_loop: &Arc<HumanLoopManager>,
) -> HealthReport {
    let cache_stats = cache.stats().await;
    let validation_stats = human_loop.statistics().await;

    let mut components = BTreeMap::new();
    components.insert(
        "orchestrator".to_string(),
        serde_json::json!({ "status": "healthy" }),
    );
    components.insert(
        "cache".to_string(),
        serde_json::json!({
            "status": "healthy",
            "entries": cache_stats.entries,
            "in_flight": cache_stats.in_flight,
        }),
    );
    components.insert(
        "human_loop".to_string(),
        serde_json::json!({
            "status": "healthy",
            "pending": validation_stats.pending,
        }),
    );
    // Transport capabilities are injected; their liveness shows up as
    // workflow outcomes, not as a probe here.
    components.insert(
        "llm".to_string(),
        serde_json::json!({ "status": "configured" }),
    );
    components.insert(
        "retrieval".to_string(),
        serde_json::json!({ "status": "configured" }),
    );

    HealthReport {
        overall: "healthy".to_string(),
        components,
    }
}
