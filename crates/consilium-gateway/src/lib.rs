//! HTTP adapter for the Consilium core: query submission, validation
//! decisions, queue/statistics observers, and health.

/// Router construction and handlers.
pub mod server;

pub use server::{AppState, GatewayServer};
