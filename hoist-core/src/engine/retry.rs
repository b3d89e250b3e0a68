use std::time::Duration;

use crate::store::{StoreError, StoreErrorKind};

/// How a failed attempt is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	/// Expected to succeed on retry (timeouts, throttling).
	Transient,
	/// Retrying will not help (missing source, bad credentials, bad target).
	Permanent,
}

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
	Retry { delay: Duration },
	GiveUp,
}

/// Exponential backoff with full jitter, multiplier 2, capped.
///
/// Stateless: each decision is derived from the attempt count and the error,
/// nothing is carried between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub base_delay: Duration,
	pub max_delay: Duration,
	/// Total attempts per task, including the first.
	pub max_attempts: u32,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			base_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(30),
			max_attempts: 5,
		}
	}
}

impl RetryPolicy {
	pub fn classify(error: &StoreError) -> ErrorClass {
		match error.kind() {
			StoreErrorKind::Timeout | StoreErrorKind::Throttled => ErrorClass::Transient,
			StoreErrorKind::NotFound | StoreErrorKind::AccessDenied => ErrorClass::Permanent,
			// Unknown errors are treated as transient, but decide() caps
			// them at a single retry so nothing loops on a mystery failure.
			StoreErrorKind::Unknown => ErrorClass::Transient,
		}
	}

	/// Decide what to do after attempt number `attempt` (1-based) failed
	/// with `error`.
	pub fn decide(&self, attempt: u32, error: &StoreError) -> RetryDecision {
		if attempt >= self.max_attempts {
			return RetryDecision::GiveUp;
		}

		match Self::classify(error) {
			ErrorClass::Permanent => RetryDecision::GiveUp,
			ErrorClass::Transient => {
				if error.kind() == StoreErrorKind::Unknown && attempt >= 2 {
					return RetryDecision::GiveUp;
				}
				RetryDecision::Retry { delay: self.backoff_delay(attempt) }
			}
		}
	}

	/// Delay before the next attempt: uniform in [0, min(base * 2^(n-1), cap)].
	/// Full jitter keeps a burst of throttled tasks from retrying in lockstep.
	fn backoff_delay(&self, attempt: u32) -> Duration {
		let exp = attempt.saturating_sub(1).min(16);
		let computed = self
			.base_delay
			.saturating_mul(1u32 << exp)
			.min(self.max_delay);

		let cap_ms = computed.as_millis() as u64;
		Duration::from_millis(rand::random::<u64>() % (cap_ms + 1))
	}
}
