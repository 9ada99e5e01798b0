use crate::single_flight::{Flight, SingleFlight};
use chrono::{DateTime, Duration, Utc};
use consilium_core::FinalResponse;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A memoized terminal response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: FinalResponse,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub capacity: usize,
    pub ttl_s: u64,
}

/// TTL-bounded response cache with single-flight coalescing.
///
/// Expired entries are evicted lazily on lookup; a background sweep can
/// additionally reap them. When the capacity bound is reached the entry
/// closest to expiry is evicted first.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    flights: SingleFlight,
    ttl: Duration,
    ttl_s: u64,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(ttl_s: u64, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            flights: SingleFlight::new(),
            ttl: Duration::seconds(ttl_s as i64),
            ttl_s,
            capacity,
        }
    }

    /// Fetch a live entry, evicting it if expired.
    pub async fn lookup(&self, fingerprint: &str) -> Option<FinalResponse> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                Some(entry) if now < entry.expires_at => {
                    return Some(entry.response.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: upgrade to a write lock and evict.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(fingerprint) {
            if now >= entry.expires_at {
                entries.remove(fingerprint);
                debug!(fingerprint, "Evicted expired cache entry");
            } else {
                return Some(entry.response.clone());
            }
        }
        None
    }

    /// Store a terminal response. Non-cacheable consensus values are
    /// rejected here as a second line of defense behind the orchestrator.
    pub async fn put(&self, fingerprint: &str, response: FinalResponse) {
        if !response.is_cacheable() {
            warn!(
                fingerprint,
                consensus = %response.consensus,
                "Refusing to cache non-approved response"
            );
            return;
        }
        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity && !entries.contains_key(fingerprint) {
            // Capacity policy: drop the entry closest to expiry.
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&victim);
            }
        }
        entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                response,
                expires_at: Utc::now() + self.ttl,
            },
        );
    }

    /// Register a fingerprint for single-flight execution.
    pub fn begin(&self, fingerprint: &str) -> Flight {
        self.flights.begin(fingerprint)
    }

    /// Remove every expired entry; returns the number reaped.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        before - entries.len()
    }

    /// Spawn a periodic background sweep.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: std::time::Duration) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                let reaped = cache.sweep().await;
                if reaped > 0 {
                    debug!(reaped, "Cache sweep complete");
                }
            }
        });
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().await.len(),
            in_flight: self.flights.in_flight(),
            capacity: self.capacity,
            ttl_s: self.ttl_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consilium_core::{Consensus, Language};

    fn response(consensus: Consensus) -> FinalResponse {
        FinalResponse {
            success: true,
            answer: "• answer".into(),
            sources: vec![],
            detected_language: Language::En,
            target_language: Language::En,
            consensus,
            iterations_used: 1,
            processing_time_ms: 3,
            validation_id: None,
            error: None,
            flagged_uncertain: false,
            untranslated: false,
        }
    }

    #[tokio::test]
    async fn hit_within_ttl() {
        let cache = ResponseCache::new(3600, 16);
        cache.put("fp", response(Consensus::Approved)).await;
        let hit = cache.lookup("fp").await.unwrap();
        assert_eq!(hit.consensus, Consensus::Approved);
    }

    #[tokio::test]
    async fn zero_ttl_entry_is_never_returned() {
        let cache = ResponseCache::new(0, 16);
        cache.put("fp", response(Consensus::Approved)).await;
        assert!(cache.lookup("fp").await.is_none());
        // Lazy eviction removed it entirely.
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn miss_on_unknown_fingerprint() {
        let cache = ResponseCache::new(3600, 16);
        assert!(cache.lookup("missing").await.is_none());
    }

    #[tokio::test]
    async fn only_approved_consensus_is_cached() {
        let cache = ResponseCache::new(3600, 16);
        cache.put("a", response(Consensus::Approved)).await;
        cache.put("b", response(Consensus::ReformedApproved)).await;
        cache.put("c", response(Consensus::PendingValidation)).await;
        cache.put("d", response(Consensus::Fallback)).await;
        cache.put("e", response(Consensus::Failed)).await;

        assert!(cache.lookup("a").await.is_some());
        assert!(cache.lookup("b").await.is_some());
        assert!(cache.lookup("c").await.is_none());
        assert!(cache.lookup("d").await.is_none());
        assert!(cache.lookup("e").await.is_none());
    }

    #[tokio::test]
    async fn sweep_reaps_expired_entries() {
        let cache = ResponseCache::new(0, 16);
        cache.put("x", response(Consensus::Approved)).await;
        cache.put("y", response(Consensus::Approved)).await;
        assert_eq!(cache.sweep().await, 2);
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn capacity_evicts_nearest_expiry() {
        let cache = ResponseCache::new(3600, 2);
        cache.put("first", response(Consensus::Approved)).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cache.put("second", response(Consensus::Approved)).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cache.put("third", response(Consensus::Approved)).await;

        // "first" was closest to expiry and should be gone.
        assert!(cache.lookup("first").await.is_none());
        assert!(cache.lookup("second").await.is_some());
        assert!(cache.lookup("third").await.is_some());
        assert_eq!(cache.stats().await.entries, 2);
    }

    #[tokio::test]
    async fn overwrite_same_fingerprint_does_not_evict_others() {
        let cache = ResponseCache::new(3600, 2);
        cache.put("a", response(Consensus::Approved)).await;
        cache.put("b", response(Consensus::Approved)).await;
        cache.put("a", response(Consensus::ReformedApproved)).await;
        assert_eq!(cache.stats().await.entries, 2);
        assert_eq!(
            cache.lookup("a").await.unwrap().consensus,
            Consensus::ReformedApproved
        );
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = ResponseCache::new(3600, 16);
        cache.put("a", response(Consensus::Approved)).await;
        cache.clear().await;
        assert!(cache.lookup("a").await.is_none());
    }
}
