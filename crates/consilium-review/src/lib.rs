//! Human-in-the-loop validation: a queue of pending reviews, a non-polling
//! resumption channel per request, timeout enforcement, and statistics.

/// The validation queue manager.
pub mod manager;

pub use manager::HumanLoopManager;
