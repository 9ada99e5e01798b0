use chrono::{Duration, Utc};
use consilium_core::{
    ConsiliumError, ConsiliumResult, Decision, DecisionBody, Language, SafetyTrigger,
    ValidationRequest, ValidationStats, ValidationStatus,
};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

const HISTORY_CAP: usize = 1000;

struct PendingSlot {
    request: ValidationRequest,
    tx: watch::Sender<ValidationRequest>,
}

/// Manages the queue of pending human validations.
///
/// Each request carries a `watch` channel publishing full request
/// snapshots, so any number of awaiters observe the terminal transition
/// without polling and all receive the same outcome. A PENDING request past
/// its expiry is transitioned to EXPIRED before any caller observes it.
pub struct HumanLoopManager {
    pending: RwLock<HashMap<Uuid, PendingSlot>>,
    history: RwLock<VecDeque<ValidationRequest>>,
    timeout: Duration,
}

impl HumanLoopManager {
    pub fn new(timeout_s: u64) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            timeout: Duration::seconds(timeout_s as i64),
        }
    }

    /// Create a validation request for a matched trigger, or pass through
    /// when no trigger fired.
    pub async fn maybe_require_validation(
        &self,
        query_fingerprint: &str,
        query_text: &str,
        detected_language: Language,
        trigger: Option<&SafetyTrigger>,
        draft_response: &str,
    ) -> Option<ValidationRequest> {
        let trigger = trigger?;
        Some(
            self.create(
                query_fingerprint,
                query_text,
                detected_language,
                trigger,
                draft_response,
            )
            .await,
        )
    }

    pub async fn create(
        &self,
        query_fingerprint: &str,
        query_text: &str,
        detected_language: Language,
        trigger: &SafetyTrigger,
        draft_response: &str,
    ) -> ValidationRequest {
        let request = ValidationRequest::new(
            query_fingerprint,
            query_text,
            detected_language,
            trigger.kind,
            draft_response,
            self.timeout,
        );
        let (tx, _rx) = watch::channel(request.clone());
        info!(
            validation_id = %request.id,
            trigger = %trigger.kind,
            priority = request.priority,
            "Validation request created"
        );
        self.pending.write().await.insert(
            request.id,
            PendingSlot {
                request: request.clone(),
                tx,
            },
        );
        request
    }

    /// Fetch a request by id, expiring it first if overdue.
    pub async fn get(&self, id: Uuid) -> Option<ValidationRequest> {
        self.expire_if_overdue(id).await;
        if let Some(slot) = self.pending.read().await.get(&id) {
            return Some(slot.request.clone());
        }
        self.history
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Record a reviewer decision.
    ///
    /// Submitting to a terminal request is idempotent when the decision
    /// matches the recorded terminal state and a `CONFLICT` otherwise.
    pub async fn submit_decision(
        &self,
        id: Uuid,
        body: DecisionBody,
    ) -> ConsiliumResult<ValidationRequest> {
        if body.decision == Decision::Modified && body.modified_text.is_none() {
            return Err(ConsiliumError::InputInvalid(
                "MODIFIED decision requires modified_text".into(),
            ));
        }

        self.expire_if_overdue(id).await;

        let mut pending = self.pending.write().await;
        if let Some(mut slot) = pending.remove(&id) {
            slot.request.status = body.decision.terminal_status();
            slot.request.decision = Some(body.decision);
            slot.request.modified_text = body.modified_text;
            slot.request.reviewer_notes = body.notes;
            slot.request.resolved_at = Some(Utc::now());

            let resolved = slot.request.clone();
            let _ = slot.tx.send(resolved.clone());
            // History is written before the pending lock is released so a
            // concurrent observer always finds the request somewhere.
            self.push_history(resolved.clone()).await;
            drop(pending);

            info!(
                validation_id = %id,
                decision = ?body.decision,
                "Validation decision recorded"
            );
            return Ok(resolved);
        }
        drop(pending);

        // Already terminal: idempotent only for the matching state.
        let history = self.history.read().await;
        match history.iter().find(|r| r.id == id) {
            Some(prior) if prior.status == body.decision.terminal_status() => Ok(prior.clone()),
            Some(prior) => Err(ConsiliumError::Conflict(format!(
                "validation {} already {:?}",
                id, prior.status
            ))),
            None => Err(ConsiliumError::NotFound(format!("validation {}", id))),
        }
    }

    /// Wait for a decision without polling. Returns the terminal request;
    /// when the wait or the request's own expiry elapses first, the request
    /// transitions to EXPIRED and is returned in that state.
    pub async fn await_decision(
        &self,
        id: Uuid,
        timeout: std::time::Duration,
    ) -> ConsiliumResult<ValidationRequest> {
        self.expire_if_overdue(id).await;

        let mut rx = {
            let pending = self.pending.read().await;
            match pending.get(&id) {
                Some(slot) => slot.tx.subscribe(),
                None => {
                    drop(pending);
                    return self
                        .history
                        .read()
                        .await
                        .iter()
                        .find(|r| r.id == id)
                        .cloned()
                        .ok_or_else(|| {
                            ConsiliumError::NotFound(format!("validation {}", id))
                        });
                }
            }
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let current = rx.borrow().clone();
                if current.status.is_terminal() {
                    return Ok(current);
                }
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return self.expire(id).await;
            }
            match tokio::time::timeout(remaining, rx.changed()).await {
                Ok(Ok(())) => continue,
                // Sender dropped: the slot resolved concurrently.
                Ok(Err(_)) => {
                    let current = rx.borrow().clone();
                    if current.status.is_terminal() {
                        return Ok(current);
                    }
                    return Err(ConsiliumError::Internal(format!(
                        "validation {} channel closed while pending",
                        id
                    )));
                }
                Err(_) => {
                    return self.expire(id).await;
                }
            }
        }
    }

    /// Force a pending request into EXPIRED (terminal).
    async fn expire(&self, id: Uuid) -> ConsiliumResult<ValidationRequest> {
        let mut pending = self.pending.write().await;
        if let Some(mut slot) = pending.remove(&id) {
            slot.request.status = ValidationStatus::Expired;
            slot.request.resolved_at = Some(Utc::now());
            let expired = slot.request.clone();
            let _ = slot.tx.send(expired.clone());
            self.push_history(expired.clone()).await;
            drop(pending);
            warn!(validation_id = %id, "Validation request expired");
            return Ok(expired);
        }
        drop(pending);
        self.history
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| ConsiliumError::NotFound(format!("validation {}", id)))
    }

    async fn expire_if_overdue(&self, id: Uuid) {
        let overdue = {
            let pending = self.pending.read().await;
            pending
                .get(&id)
                .map(|slot| slot.request.is_overdue(Utc::now()))
                .unwrap_or(false)
        };
        if overdue {
            let _ = self.expire(id).await;
        }
    }

    /// Transition every overdue PENDING request; returns how many expired.
    pub async fn expire_overdue(&self) -> usize {
        let now = Utc::now();
        let overdue: Vec<Uuid> = {
            let pending = self.pending.read().await;
            pending
                .values()
                .filter(|slot| slot.request.is_overdue(now))
                .map(|slot| slot.request.id)
                .collect()
        };
        let count = overdue.len();
        for id in overdue {
            let _ = self.expire(id).await;
        }
        count
    }

    /// Snapshot of pending requests, highest priority first, oldest first
    /// within a priority.
    pub async fn get_pending(&self) -> Vec<ValidationRequest> {
        self.expire_overdue().await;
        let pending = self.pending.read().await;
        let mut items: Vec<ValidationRequest> =
            pending.values().map(|slot| slot.request.clone()).collect();
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        items
    }

    /// Most recent resolved requests, newest last.
    pub async fn get_history(&self, limit: usize) -> Vec<ValidationRequest> {
        let history = self.history.read().await;
        history
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    pub async fn statistics(&self) -> ValidationStats {
        self.expire_overdue().await;
        let pending = self.pending.read().await.len();
        let history = self.history.read().await;

        let mut stats = ValidationStats {
            pending,
            ..ValidationStats::default()
        };
        let mut wait_total_ms: u64 = 0;
        let mut decided = 0usize;
        for req in history.iter() {
            match req.status {
                ValidationStatus::Approved => stats.approved += 1,
                ValidationStatus::Rejected => stats.rejected += 1,
                ValidationStatus::Modified => stats.modified += 1,
                ValidationStatus::Expired => stats.expired += 1,
                ValidationStatus::Pending => {}
            }
            if req.status != ValidationStatus::Expired {
                if let Some(wait) = req.wait_ms() {
                    wait_total_ms += wait;
                    decided += 1;
                }
            }
        }
        stats.total = pending + history.len();
        if decided > 0 {
            stats.avg_wait_ms = wait_total_ms / decided as u64;
        }
        let resolved = history.len();
        if resolved > 0 {
            stats.approval_rate = (stats.approved + stats.modified) as f32 / resolved as f32;
        }
        stats
    }

    async fn push_history(&self, request: ValidationRequest) {
        let mut history = self.history.write().await;
        history.push_back(request);
        while history.len() > HISTORY_CAP {
            history.pop_front();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use consilium_core::{classify, TriggerKind};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn trigger() -> SafetyTrigger {
        classify("What is the lethal dose of paracetamol for a child?").unwrap()
    }

    async fn manager_with_request(timeout_s: u64) -> (Arc<HumanLoopManager>, ValidationRequest) {
        let manager = Arc::new(HumanLoopManager::new(timeout_s));
        let req = manager
            .create("fp-1", "lethal dose?", Language::En, &trigger(), "the draft")
            .await;
        (manager, req)
    }

    #[tokio::test]
    async fn maybe_require_validation_passes_through_without_trigger() {
        let manager = HumanLoopManager::new(3600);
        assert!(manager
            .maybe_require_validation("fp", "benign question", Language::En, None, "draft")
            .await
            .is_none());

        let t = trigger();
        let req = manager
            .maybe_require_validation("fp", "lethal dose?", Language::En, Some(&t), "draft")
            .await
            .unwrap();
        assert_eq!(req.status, ValidationStatus::Pending);
        assert_eq!(manager.get_pending().await.len(), 1);
    }

    #[tokio::test]
    async fn submit_approval_transitions_to_terminal() {
        let (manager, req) = manager_with_request(3600).await;
        let resolved = manager
            .submit_decision(
                req.id,
                DecisionBody {
                    decision: Decision::Approved,
                    modified_text: None,
                    notes: Some("checked against guidelines".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, ValidationStatus::Approved);
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.effective_text(), "the draft");

        // No longer pending.
        assert!(manager.get_pending().await.is_empty());
        assert_eq!(manager.get(req.id).await.unwrap().status, ValidationStatus::Approved);
    }

    #[tokio::test]
    async fn modified_decision_replaces_draft() {
        let (manager, req) = manager_with_request(3600).await;
        let resolved = manager
            .submit_decision(
                req.id,
                DecisionBody {
                    decision: Decision::Modified,
                    modified_text: Some("the corrected draft".into()),
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, ValidationStatus::Modified);
        assert_eq!(resolved.effective_text(), "the corrected draft");
    }

    #[tokio::test]
    async fn modified_without_text_is_invalid() {
        let (manager, req) = manager_with_request(3600).await;
        let err = manager
            .submit_decision(
                req.id,
                DecisionBody {
                    decision: Decision::Modified,
                    modified_text: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INPUT_INVALID");
    }

    #[tokio::test]
    async fn await_decision_observes_submission_without_polling() {
        let (manager, req) = manager_with_request(3600).await;

        let m = manager.clone();
        let id = req.id;
        let waiter = tokio::spawn(async move {
            m.await_decision(id, StdDuration::from_secs(5)).await
        });

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        manager
            .submit_decision(
                id,
                DecisionBody {
                    decision: Decision::Rejected,
                    modified_text: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let observed = waiter.await.unwrap().unwrap();
        assert_eq!(observed.status, ValidationStatus::Rejected);
    }

    #[tokio::test]
    async fn multiple_awaiters_see_the_same_outcome() {
        let (manager, req) = manager_with_request(3600).await;

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let m = manager.clone();
            let id = req.id;
            waiters.push(tokio::spawn(async move {
                m.await_decision(id, StdDuration::from_secs(5)).await
            }));
        }

        tokio::time::sleep(StdDuration::from_millis(30)).await;
        manager
            .submit_decision(
                req.id,
                DecisionBody {
                    decision: Decision::Approved,
                    modified_text: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        for w in waiters {
            let observed = w.await.unwrap().unwrap();
            assert_eq!(observed.status, ValidationStatus::Approved);
        }
    }

    #[tokio::test]
    async fn await_times_out_into_expired() {
        let (manager, req) = manager_with_request(3600).await;
        let observed = manager
            .await_decision(req.id, StdDuration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(observed.status, ValidationStatus::Expired);

        // EXPIRED is terminal: a late decision now conflicts.
        let err = manager
            .submit_decision(
                req.id,
                DecisionBody {
                    decision: Decision::Approved,
                    modified_text: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
    }

    #[tokio::test]
    async fn overdue_request_expires_before_observation() {
        let (manager, req) = manager_with_request(0).await;
        // Every observer path must see EXPIRED, never an overdue PENDING.
        assert!(manager.get_pending().await.is_empty());
        assert_eq!(
            manager.get(req.id).await.unwrap().status,
            ValidationStatus::Expired
        );
        assert_eq!(manager.statistics().await.expired, 1);
    }

    #[tokio::test]
    async fn resubmitting_same_decision_is_idempotent() {
        let (manager, req) = manager_with_request(3600).await;
        let body = DecisionBody {
            decision: Decision::Approved,
            modified_text: None,
            notes: None,
        };
        manager.submit_decision(req.id, body.clone()).await.unwrap();
        let second = manager.submit_decision(req.id, body).await.unwrap();
        assert_eq!(second.status, ValidationStatus::Approved);

        let conflicting = manager
            .submit_decision(
                req.id,
                DecisionBody {
                    decision: Decision::Rejected,
                    modified_text: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(conflicting.kind(), "CONFLICT");
    }

    #[tokio::test]
    async fn unknown_validation_is_not_found() {
        let manager = HumanLoopManager::new(3600);
        let err = manager
            .submit_decision(
                Uuid::new_v4(),
                DecisionBody {
                    decision: Decision::Approved,
                    modified_text: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn pending_queue_orders_by_priority_then_age() {
        let manager = HumanLoopManager::new(3600);
        let qa = classify("Please verify this answer").unwrap();
        assert_eq!(qa.kind, TriggerKind::QualityAssurance);
        let safety = trigger();

        let low = manager
            .create("fp-low", "verify q", Language::En, &qa, "d1")
            .await;
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        let high_old = manager
            .create("fp-high-1", "lethal q", Language::En, &safety, "d2")
            .await;
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        let high_new = manager
            .create("fp-high-2", "lethal q2", Language::En, &safety, "d3")
            .await;

        let queue = manager.get_pending().await;
        assert_eq!(queue.len(), 3);
        assert_eq!(queue[0].id, high_old.id);
        assert_eq!(queue[1].id, high_new.id);
        assert_eq!(queue[2].id, low.id);
    }

    #[tokio::test]
    async fn statistics_aggregate_outcomes() {
        let manager = HumanLoopManager::new(3600);
        let safety = trigger();

        let a = manager
            .create("fp-a", "q a", Language::En, &safety, "d")
            .await;
        let b = manager
            .create("fp-b", "q b", Language::En, &safety, "d")
            .await;
        let _still_pending = manager
            .create("fp-c", "q c", Language::En, &safety, "d")
            .await;

        manager
            .submit_decision(
                a.id,
                DecisionBody {
                    decision: Decision::Approved,
                    modified_text: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        manager
            .submit_decision(
                b.id,
                DecisionBody {
                    decision: Decision::Rejected,
                    modified_text: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let stats = manager.statistics().await;
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.total, 3);
        assert!((stats.approval_rate - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn history_is_bounded_and_ordered() {
        let (manager, req) = manager_with_request(3600).await;
        manager
            .submit_decision(
                req.id,
                DecisionBody {
                    decision: Decision::Approved,
                    modified_text: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let history = manager.get_history(10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, req.id);
    }
}
