use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// One audit record: a state transition of interest in a query workflow.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub event: String,
    pub details: serde_json::Value,
}

/// Append-only audit sink. Entries are queued on an unbounded channel and
/// written to `audit.jsonl` by a background task, so the hot path never
/// blocks on disk.
pub struct AuditLog {
    tx: mpsc::UnboundedSender<AuditEntry>,
}

impl AuditLog {
    /// Create a new AuditLog writing under `log_dir`.
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();

        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let _ = tokio::fs::create_dir_all(&log_dir).await;
            let log_file = log_dir.join("audit.jsonl");

            while let Some(entry) = rx.recv().await {
                let Ok(mut line) = serde_json::to_string(&entry) else {
                    continue;
                };
                line.push('\n');
                if let Ok(mut file) = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&log_file)
                    .await
                {
                    let _ = file.write_all(line.as_bytes()).await;
                }
            }
        });

        Self { tx }
    }

    pub fn log_event(
        &self,
        request_id: Uuid,
        event: impl Into<String>,
        details: serde_json::Value,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            request_id,
            event: event.into(),
            details,
        };
        info!(
            request_id = %entry.request_id,
            event = %entry.event,
            "audit"
        );
        let _ = self.tx.send(entry);
    }
}
