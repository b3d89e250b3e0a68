use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::engine::board::StatusBoard;
use crate::engine::retry::{RetryDecision, RetryPolicy};
use crate::models::TransferTask;
use crate::store::{ObjectStoreClient, StoreError};

/// Execute one task to a terminal state: attempt, classify, back off, retry.
///
/// Cancellation is checked before each attempt (via the board refusing to
/// start one) and interrupts the backoff sleep; an attempt already inside
/// `put_object` is allowed to finish or fail on its own, but its late result
/// is discarded by the board once the task is Cancelled.
pub(crate) async fn run_task(
	board: &StatusBoard,
	store: &Arc<dyn ObjectStoreClient>,
	policy: &RetryPolicy,
	attempt_timeout: Duration,
	task: TransferTask,
) {
	let Some(cancel) = board.cancel_signal(task.id) else {
		return;
	};

	loop {
		let Some(attempt) = board.begin_attempt(task.id) else {
			// Already terminal — cancelled while sitting in the queue
			debug!(task = %task.id, "skipping task in terminal state");
			return;
		};

		match attempt_upload(store.as_ref(), attempt_timeout, &task).await {
			Ok(()) => {
				if board.complete(task.id) {
					debug!(
						task = %task.id,
						bucket = %task.bucket,
						key = %task.key,
						attempt,
						"upload complete"
					);
				} else {
					debug!(task = %task.id, "late success after cancellation, discarded");
				}
				return;
			}
			Err(err) => match policy.decide(attempt, &err) {
				RetryDecision::GiveUp => {
					if board.fail(task.id, &err) {
						error!(
							task = %task.id,
							bucket = %task.bucket,
							key = %task.key,
							attempt,
							error = %err,
							"upload failed"
						);
					}
					return;
				}
				RetryDecision::Retry { delay } => {
					if !board.retrying(task.id, attempt, &err) {
						// Cancelled while the attempt was in flight
						return;
					}
					warn!(
						task = %task.id,
						attempt,
						delay_ms = delay.as_millis() as u64,
						error = %err,
						"upload attempt failed, will retry"
					);

					tokio::select! {
						_ = tokio::time::sleep(delay) => {}
						_ = cancel.cancelled() => {
							// Board was marked Cancelled by the requester
							return;
						}
					}
				}
			},
		}
	}
}

/// One PUT attempt: open the source, stream it to the store, bound the whole
/// call with the per-attempt timeout.
async fn attempt_upload(
	store: &dyn ObjectStoreClient,
	attempt_timeout: Duration,
	task: &TransferTask,
) -> Result<(), StoreError> {
	// Opened fresh per attempt; a source that vanished is permanent.
	let file = tokio::fs::File::open(&task.source_path)
		.await
		.map_err(|e| map_open_error(e, &task.source_path))?;

	let put = store.put_object(&task.bucket, &task.key, Box::new(file), task.size_bytes);
	match tokio::time::timeout(attempt_timeout, put).await {
		Ok(result) => result,
		Err(_) => Err(StoreError::Timeout(format!(
			"attempt exceeded {}s",
			attempt_timeout.as_secs()
		))),
	}
}

fn map_open_error(err: io::Error, path: &str) -> StoreError {
	match err.kind() {
		io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
		io::ErrorKind::PermissionDenied => StoreError::AccessDenied(path.to_string()),
		_ => StoreError::Unknown(format!("{path}: {err}")),
	}
}
