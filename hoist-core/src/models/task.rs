use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque unique identifier for a transfer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Ulid);

impl TaskId {
    pub(crate) fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a submitter hands the engine: one file, one destination object.
///
/// `size_bytes` is signed on purpose — a negative value is rejected at
/// submit time rather than silently wrapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferRequest {
    pub source_path: String,
    pub bucket: String,
    pub key: String,
    pub size_bytes: i64,
}

/// A concrete unit of work: one file, one object. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferTask {
    pub id: TaskId,
    pub source_path: String,
    pub bucket: String,
    pub key: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl TransferTask {
    pub(crate) fn from_request(req: TransferRequest) -> Self {
        Self {
            id: TaskId::new(),
            source_path: req.source_path,
            bucket: req.bucket,
            key: req.key,
            size_bytes: req.size_bytes as u64,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of one transfer.
///
/// Transitions are monotonic: Queued → InProgress → {Retrying → InProgress}*
/// → {Succeeded | Failed | Cancelled}. Nothing ever leaves a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TransferStatus {
    Queued,
    InProgress,
    Retrying { attempt: u32, last_error: String },
    Succeeded,
    Failed { error: String },
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Succeeded | TransferStatus::Failed { .. } | TransferStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!TransferStatus::Queued.is_terminal());
        assert!(!TransferStatus::InProgress.is_terminal());
        assert!(!TransferStatus::Retrying { attempt: 1, last_error: "x".into() }.is_terminal());
        assert!(TransferStatus::Succeeded.is_terminal());
        assert!(TransferStatus::Failed { error: "x".into() }.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
    }

    #[test]
    fn task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TransferStatus::InProgress).unwrap();
        assert_eq!(json, r#"{"state":"in_progress"}"#);

        let json = serde_json::to_string(&TransferStatus::Retrying {
            attempt: 2,
            last_error: "timed out".into(),
        })
        .unwrap();
        assert!(json.contains(r#""state":"retrying""#));
        assert!(json.contains(r#""attempt":2"#));
    }
}
