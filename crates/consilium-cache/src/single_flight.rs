//! At-most-one-in-flight coalescing per query fingerprint.
//!
//! The first caller for a fingerprint becomes the leader and owns the
//! computation; everyone else becomes a follower and receives an exact copy
//! of the leader's terminal response — including failures. The fingerprint
//! is released when the leader publishes (or abandons) its flight.

use consilium_core::{ConsiliumError, ConsiliumResult, FinalResponse};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

type FlightMap = Arc<Mutex<HashMap<String, watch::Receiver<Option<FinalResponse>>>>>;

/// Outcome of registering a fingerprint.
pub enum Flight {
    /// This caller owns the computation and must publish through the guard.
    Leader(FlightGuard),
    /// Another workflow is already running; await its published result.
    Follower(watch::Receiver<Option<FinalResponse>>),
}

/// Leader-side handle. Publishing delivers the response to every follower
/// and releases the fingerprint; dropping without publishing closes the
/// channel so followers observe the abandonment instead of hanging.
pub struct FlightGuard {
    fingerprint: String,
    tx: Option<watch::Sender<Option<FinalResponse>>>,
    map: FlightMap,
}

impl FlightGuard {
    /// Deliver the terminal response to all followers and release the
    /// fingerprint.
    pub fn publish(mut self, response: FinalResponse) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(response));
        }
        self.release();
    }

    fn release(&mut self) {
        let mut map = self.map.lock().expect("flight map lock poisoned");
        map.remove(&self.fingerprint);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // Abandoned without publish: release so a later request can retry.
        if self.tx.is_some() {
            self.release();
        }
    }
}

pub struct SingleFlight {
    map: FlightMap,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            map: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register `fingerprint`, becoming leader or follower atomically.
    pub fn begin(&self, fingerprint: &str) -> Flight {
        let mut map = self.map.lock().expect("flight map lock poisoned");
        if let Some(rx) = map.get(fingerprint) {
            return Flight::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        map.insert(fingerprint.to_string(), rx);
        Flight::Leader(FlightGuard {
            fingerprint: fingerprint.to_string(),
            tx: Some(tx),
            map: self.map.clone(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.map.lock().expect("flight map lock poisoned").len()
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Follower-side wait for the leader's published response.
pub async fn await_published(
    mut rx: watch::Receiver<Option<FinalResponse>>,
) -> ConsiliumResult<FinalResponse> {
    loop {
        if let Some(resp) = rx.borrow().clone() {
            return Ok(resp);
        }
        if rx.changed().await.is_err() {
            // Sender dropped. A value may still have been published just
            // before the drop.
            return rx.borrow().clone().ok_or_else(|| {
                ConsiliumError::Internal("in-flight workflow was abandoned".into())
            });
        }
    }
}
