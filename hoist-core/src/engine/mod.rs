pub(crate) mod board;
pub mod retry;
mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{ConfigError, EngineConfig};
use crate::models::{TaskEvent, TaskId, TransferRequest, TransferStatus, TransferTask};
use crate::store::ObjectStoreClient;

use board::StatusBoard;

/// How long shutdown waits after force-cancelling before aborting workers.
const FORCE_CANCEL_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SubmitError {
	/// Bad input, rejected before anything is enqueued. Never retried.
	#[error("invalid task at index {index}: {reason}")]
	InvalidTask { index: usize, reason: String },

	/// Backpressure: the queue has no room for the batch. Retry later.
	#[error("upload queue is full")]
	QueueFull,

	#[error("engine is shutting down")]
	ShuttingDown,
}

/// What `shutdown` managed to do within its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
	/// True if every task reached a terminal state within the drain timeout.
	pub drained: bool,
	/// Tasks force-cancelled because the drain timeout expired.
	pub force_cancelled: u64,
}

/// Concurrent batch upload engine.
///
/// Owns a bounded FIFO queue and a fixed pool of workers, each running one
/// task to completion (including its retries) before pulling the next.
/// `submit` and `snapshot` are synchronous and never wait on an in-flight
/// transfer. Every status transition is delivered, in per-task order, on the
/// event stream returned by [`UploadEngine::new`].
pub struct UploadEngine {
	board: Arc<StatusBoard>,
	queue_tx: Mutex<Option<mpsc::Sender<TransferTask>>>,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

impl UploadEngine {
	/// Start the engine: spawns the worker pool immediately. The returned
	/// receiver is the progress sink's end of the event stream; subscribe
	/// (hold it) before submitting, events are not replayed.
	pub fn new(
		config: EngineConfig,
		store: Arc<dyn ObjectStoreClient>,
	) -> Result<(Self, mpsc::UnboundedReceiver<TaskEvent>), ConfigError> {
		config.validate()?;

		let (event_tx, event_rx) = mpsc::unbounded_channel();
		let board = Arc::new(StatusBoard::new(event_tx));

		let (queue_tx, queue_rx) = mpsc::channel::<TransferTask>(config.queue_capacity);
		let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));

		let policy = config.retry_policy();
		let attempt_timeout = config.attempt_timeout();

		let mut workers = Vec::with_capacity(config.workers);
		for worker_id in 0..config.workers {
			let board = board.clone();
			let store = store.clone();
			let policy = policy.clone();
			let queue_rx = queue_rx.clone();

			workers.push(tokio::spawn(async move {
				loop {
					// Lock held only while waiting for the next task; one
					// worker per task, no task seen twice.
					let task = { queue_rx.lock().await.recv().await };
					match task {
						Some(task) => {
							worker::run_task(&board, &store, &policy, attempt_timeout, task).await;
						}
						None => break,
					}
				}
				debug!(worker = worker_id, "upload worker exiting");
			}));
		}

		let engine = Self {
			board,
			queue_tx: Mutex::new(Some(queue_tx)),
			workers: Mutex::new(workers),
		};
		Ok((engine, event_rx))
	}

	/// Enqueue a batch in submission order. All-or-nothing: the whole batch
	/// is validated and queue capacity reserved for all of it before any task
	/// is enqueued. Never blocks beyond queue insertion.
	pub fn submit(&self, requests: Vec<TransferRequest>) -> Result<Vec<TaskId>, SubmitError> {
		for (index, req) in requests.iter().enumerate() {
			validate_request(index, req)?;
		}

		let tx_guard = self.queue_tx.lock();
		let Some(tx) = tx_guard.as_ref() else {
			return Err(SubmitError::ShuttingDown);
		};

		let permits = tx.try_reserve_many(requests.len()).map_err(|e| match e {
			TrySendError::Full(()) => SubmitError::QueueFull,
			TrySendError::Closed(()) => SubmitError::ShuttingDown,
		})?;

		let mut ids = Vec::with_capacity(requests.len());
		for (permit, req) in permits.zip(requests) {
			let task = TransferTask::from_request(req);
			ids.push(task.id);
			// Queued is recorded (and emitted) before the task can reach a
			// worker, keeping per-task event order intact.
			self.board.insert(task.id);
			permit.send(task);
		}
		Ok(ids)
	}

	/// Request cancellation. A queued task is cancelled outright; a running
	/// one is marked Cancelled and its worker signalled to stop at the next
	/// check point. No-op on terminal or unknown tasks. Returns true if this
	/// call cancelled the task.
	pub fn cancel(&self, id: TaskId) -> bool {
		self.board.request_cancel(id)
	}

	/// Point-in-time status of every task submitted in the engine's
	/// lifetime. Does not block workers.
	pub fn snapshot(&self) -> HashMap<TaskId, TransferStatus> {
		self.board.snapshot()
	}

	/// Stop accepting tasks, wait up to `drain_timeout` for in-flight work
	/// to finish, then force-cancel whatever remains.
	pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
		// Closing the queue lets idle workers exit and busy ones drain.
		{
			self.queue_tx.lock().take();
		}
		let mut handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());

		let drained = tokio::time::timeout(drain_timeout, join_workers(&mut handles))
			.await
			.is_ok();

		let mut force_cancelled = 0;
		if !drained {
			force_cancelled = self.board.cancel_all_active();

			let flushed = tokio::time::timeout(FORCE_CANCEL_GRACE, join_workers(&mut handles))
				.await
				.is_ok();
			if !flushed {
				// A worker stuck inside an uninterruptible store call; its
				// task is already Cancelled on the board.
				for handle in &handles {
					handle.abort();
				}
			}
		}

		ShutdownReport { drained, force_cancelled }
	}
}

async fn join_workers(handles: &mut [JoinHandle<()>]) {
	for handle in handles.iter_mut() {
		if !handle.is_finished() {
			let _ = handle.await;
		}
	}
}

fn validate_request(index: usize, req: &TransferRequest) -> Result<(), SubmitError> {
	let reason = if req.source_path.is_empty() {
		"empty source path"
	} else if req.bucket.is_empty() {
		"empty bucket name"
	} else if req.key.is_empty() {
		"empty object key"
	} else if req.size_bytes < 0 {
		"negative size"
	} else {
		return Ok(());
	};

	Err(SubmitError::InvalidTask { index, reason: reason.to_string() })
}
