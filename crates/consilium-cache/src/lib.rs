//! Response memoization: a TTL-bounded cache keyed by query fingerprint,
//! with single-flight coalescing so concurrent identical queries share one
//! in-progress workflow.

/// TTL cache.
pub mod cache;
/// Per-fingerprint flight coalescing.
pub mod single_flight;

pub use cache::{CacheEntry, CacheStats, ResponseCache};
pub use single_flight::{await_published, Flight, FlightGuard, SingleFlight};
