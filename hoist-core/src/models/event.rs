use chrono::{DateTime, Utc};
use serde::Serialize;

use super::task::{TaskId, TransferStatus};

/// One progress record, emitted for every status transition of a task.
///
/// Events for the same task arrive in transition order; ordering across
/// different tasks is unspecified. Error detail, when present, is carried
/// inside the status variant.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub status: TransferStatus,
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    pub(crate) fn now(task_id: TaskId, status: TransferStatus) -> Self {
        Self { task_id, status, timestamp: Utc::now() }
    }
}
