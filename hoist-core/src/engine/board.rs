use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};

use crate::models::{TaskEvent, TaskId, TransferStatus};
use crate::store::StoreError;

/// Per-task cooperative cancellation handle. `notify` wakes the owning
/// worker out of a backoff sleep; `notify_one` semantics mean a cancel that
/// lands before the worker starts waiting is not lost.
#[derive(Debug, Default)]
pub(crate) struct CancelSignal {
	notify: Notify,
}

impl CancelSignal {
	pub(crate) async fn cancelled(&self) {
		self.notify.notified().await;
	}
}

struct TaskState {
	status: TransferStatus,
	attempts: u32,
	cancel: Arc<CancelSignal>,
}

/// The engine's only shared mutable state: per-task status and attempt
/// bookkeeping, guarded by a sync RwLock so `snapshot()` never waits on an
/// in-flight transfer.
///
/// Every mutation goes through a method that enforces the monotonic state
/// machine — nothing transitions out of a terminal state — and emits the
/// matching `TaskEvent` while still holding the write lock, which is what
/// makes per-task event order strict.
pub(crate) struct StatusBoard {
	tasks: RwLock<HashMap<TaskId, TaskState>>,
	events: mpsc::UnboundedSender<TaskEvent>,
}

impl StatusBoard {
	pub(crate) fn new(events: mpsc::UnboundedSender<TaskEvent>) -> Self {
		Self { tasks: RwLock::new(HashMap::new()), events }
	}

	/// Register a freshly submitted task as Queued.
	pub(crate) fn insert(&self, id: TaskId) {
		let mut tasks = self.tasks.write();
		tasks.insert(
			id,
			TaskState {
				status: TransferStatus::Queued,
				attempts: 0,
				cancel: Arc::new(CancelSignal::default()),
			},
		);
		self.emit(id, TransferStatus::Queued);
	}

	/// Start the next attempt for a task. Returns the 1-based attempt number,
	/// or None if the task is already terminal (cancelled before dispatch,
	/// typically) and must not be executed.
	pub(crate) fn begin_attempt(&self, id: TaskId) -> Option<u32> {
		let mut tasks = self.tasks.write();
		let state = tasks.get_mut(&id)?;
		if state.status.is_terminal() {
			return None;
		}

		state.attempts += 1;
		let attempt = state.attempts;
		state.status = TransferStatus::InProgress;
		self.emit(id, TransferStatus::InProgress);
		Some(attempt)
	}

	/// Record a failed attempt that will be retried after a backoff sleep.
	/// Returns false if the task went terminal in the meantime.
	pub(crate) fn retrying(&self, id: TaskId, attempt: u32, error: &StoreError) -> bool {
		let status = TransferStatus::Retrying { attempt, last_error: error.to_string() };
		self.transition(id, status)
	}

	/// Mark a task Succeeded. Refused (returns false) if the task is already
	/// terminal — in particular when cancellation was requested while the
	/// final attempt was in flight; the late success is then not reported.
	pub(crate) fn complete(&self, id: TaskId) -> bool {
		self.transition(id, TransferStatus::Succeeded)
	}

	pub(crate) fn fail(&self, id: TaskId, error: &StoreError) -> bool {
		self.transition(id, TransferStatus::Failed { error: error.to_string() })
	}

	/// Request cancellation. A non-terminal task is marked Cancelled
	/// immediately (the engine's bookkeeping is authoritative regardless of
	/// any in-flight store call) and its worker is woken. No-op on terminal
	/// or unknown tasks. Returns true if the task was cancelled by this call.
	pub(crate) fn request_cancel(&self, id: TaskId) -> bool {
		let mut tasks = self.tasks.write();
		let Some(state) = tasks.get_mut(&id) else {
			return false;
		};
		if state.status.is_terminal() {
			return false;
		}

		state.status = TransferStatus::Cancelled;
		state.cancel.notify.notify_one();
		self.emit(id, TransferStatus::Cancelled);
		true
	}

	/// Cancel every non-terminal task. Used by shutdown's force phase.
	pub(crate) fn cancel_all_active(&self) -> u64 {
		let ids: Vec<TaskId> = {
			let tasks = self.tasks.read();
			tasks
				.iter()
				.filter(|(_, s)| !s.status.is_terminal())
				.map(|(id, _)| *id)
				.collect()
		};

		let mut cancelled = 0;
		for id in ids {
			if self.request_cancel(id) {
				cancelled += 1;
			}
		}
		cancelled
	}

	pub(crate) fn cancel_signal(&self, id: TaskId) -> Option<Arc<CancelSignal>> {
		self.tasks.read().get(&id).map(|s| s.cancel.clone())
	}

	/// Point-in-time view of every task the engine has ever accepted.
	pub(crate) fn snapshot(&self) -> HashMap<TaskId, TransferStatus> {
		self.tasks
			.read()
			.iter()
			.map(|(id, s)| (*id, s.status.clone()))
			.collect()
	}

	fn transition(&self, id: TaskId, next: TransferStatus) -> bool {
		let mut tasks = self.tasks.write();
		let Some(state) = tasks.get_mut(&id) else {
			return false;
		};
		if state.status.is_terminal() {
			return false;
		}

		state.status = next.clone();
		self.emit(id, next);
		true
	}

	/// Emit one event per transition. Send errors are ignored: a dropped
	/// receiver means nobody is listening, which is allowed.
	fn emit(&self, id: TaskId, status: TransferStatus) {
		let _ = self.events.send(TaskEvent::now(id, status));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn board() -> (StatusBoard, mpsc::UnboundedReceiver<TaskEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(StatusBoard::new(tx), rx)
	}

	fn drain(rx: &mut mpsc::UnboundedReceiver<TaskEvent>) -> Vec<TransferStatus> {
		let mut out = Vec::new();
		while let Ok(ev) = rx.try_recv() {
			out.push(ev.status);
		}
		out
	}

	#[test]
	fn normal_lifecycle_emits_ordered_events() {
		let (board, mut rx) = board();
		let id = TaskId::new();

		board.insert(id);
		assert_eq!(board.begin_attempt(id), Some(1));
		assert!(board.complete(id));

		assert_eq!(
			drain(&mut rx),
			vec![TransferStatus::Queued, TransferStatus::InProgress, TransferStatus::Succeeded]
		);
	}

	#[test]
	fn no_transition_out_of_terminal() {
		let (board, mut rx) = board();
		let id = TaskId::new();

		board.insert(id);
		board.begin_attempt(id);
		assert!(board.complete(id));

		assert!(!board.fail(id, &StoreError::Unknown("late".into())));
		assert!(!board.complete(id));
		assert!(!board.request_cancel(id));
		assert_eq!(board.begin_attempt(id), None);

		let events = drain(&mut rx);
		assert_eq!(events.last(), Some(&TransferStatus::Succeeded));
		assert_eq!(events.len(), 3); // nothing after the terminal event
	}

	#[test]
	fn cancel_queued_task() {
		let (board, mut rx) = board();
		let id = TaskId::new();

		board.insert(id);
		assert!(board.request_cancel(id));

		// A worker pulling it later must refuse to run it
		assert_eq!(board.begin_attempt(id), None);
		assert_eq!(drain(&mut rx), vec![TransferStatus::Queued, TransferStatus::Cancelled]);
	}

	#[test]
	fn cancel_beats_late_success() {
		let (board, _rx) = board();
		let id = TaskId::new();

		board.insert(id);
		board.begin_attempt(id);
		assert!(board.request_cancel(id));

		// Store call finished after cancellation: must not flip to Succeeded
		assert!(!board.complete(id));
		assert_eq!(board.snapshot()[&id], TransferStatus::Cancelled);
	}

	#[test]
	fn attempts_count_across_retries() {
		let (board, _rx) = board();
		let id = TaskId::new();
		let err = StoreError::Timeout("x".into());

		board.insert(id);
		assert_eq!(board.begin_attempt(id), Some(1));
		assert!(board.retrying(id, 1, &err));
		assert_eq!(board.begin_attempt(id), Some(2));
		assert!(board.retrying(id, 2, &err));
		assert_eq!(board.begin_attempt(id), Some(3));
		assert!(board.complete(id));
	}

	#[test]
	fn cancel_unknown_task_is_noop() {
		let (board, mut rx) = board();
		assert!(!board.request_cancel(TaskId::new()));
		assert!(drain(&mut rx).is_empty());
	}

	#[test]
	fn cancel_all_active_skips_terminal() {
		let (board, _rx) = board();
		let done = TaskId::new();
		let queued = TaskId::new();
		let running = TaskId::new();

		board.insert(done);
		board.begin_attempt(done);
		board.complete(done);
		board.insert(queued);
		board.insert(running);
		board.begin_attempt(running);

		assert_eq!(board.cancel_all_active(), 2);
		let snap = board.snapshot();
		assert_eq!(snap[&done], TransferStatus::Succeeded);
		assert_eq!(snap[&queued], TransferStatus::Cancelled);
		assert_eq!(snap[&running], TransferStatus::Cancelled);
	}

	#[tokio::test]
	async fn cancel_signal_wakes_waiter() {
		let (board, _rx) = board();
		let id = TaskId::new();
		board.insert(id);

		let signal = board.cancel_signal(id).unwrap();
		board.request_cancel(id);

		// Permit was stored by notify_one, so this completes immediately
		signal.cancelled().await;
	}
}
