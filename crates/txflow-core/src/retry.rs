//! Exponential backoff for fallible asynchronous operations.
//!
//! [`retry`] runs an operation until it succeeds, fails with an error that
//! is not worth repeating, or runs out of attempts. A failed attempt `k`
//! (counting from zero) is followed by a pause of `base_delay * 2^k`.
//! The pauses are driven by the `backoff` crate; every call owns its
//! backoff state, so concurrent retries never influence each other.

use backoff::backoff::Backoff;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use txflow_chain::ChainError;
use txflow_config::RetryConfig;

/// Classifies errors into those that may succeed when repeated and those
/// that will not.
pub trait Retryable {
	fn is_retryable(&self) -> bool;
}

impl Retryable for ChainError {
	fn is_retryable(&self) -> bool {
		self.is_transient()
	}
}

/// Attempt budget and base delay of a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts, the first one included. Zero behaves like one.
	pub max_attempts: u32,
	/// Pause after the first failed attempt.
	pub base_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_secs(1),
		}
	}
}

impl From<&RetryConfig> for RetryPolicy {
	fn from(config: &RetryConfig) -> Self {
		Self {
			max_attempts: config.max_attempts,
			base_delay: config.base_delay(),
		}
	}
}

impl RetryPolicy {
	pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
		Self {
			max_attempts,
			base_delay,
		}
	}

	/// Pause after failed attempt `attempt`, counting from zero.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
		self.base_delay.saturating_mul(factor)
	}
}

/// Final error of a retried operation.
///
/// Both variants keep the operation name, the number of attempts made and
/// the last underlying error.
#[derive(Debug, Error)]
pub enum RetryError<E> {
	/// Every attempt failed with a retryable error.
	#[error("{operation} failed after {attempts} attempts: {source}")]
	Exhausted {
		operation: String,
		attempts: u32,
		source: E,
	},
	/// An attempt failed with an error that is not worth repeating.
	#[error("{operation} failed permanently on attempt {attempts}: {source}")]
	Permanent {
		operation: String,
		attempts: u32,
		source: E,
	},
}

impl<E> RetryError<E> {
	pub fn attempts(&self) -> u32 {
		match self {
			RetryError::Exhausted { attempts, .. } | RetryError::Permanent { attempts, .. } => {
				*attempts
			},
		}
	}

	/// The last underlying error.
	pub fn last_error(&self) -> &E {
		match self {
			RetryError::Exhausted { source, .. } | RetryError::Permanent { source, .. } => source,
		}
	}

	pub fn into_inner(self) -> E {
		match self {
			RetryError::Exhausted { source, .. } | RetryError::Permanent { source, .. } => source,
		}
	}
}

/// Feeds a [`RetryPolicy`] into the `backoff` driver: one pause per failed
/// attempt until the attempt budget is spent.
struct PolicyBackoff {
	policy: RetryPolicy,
	attempt: u32,
}

impl PolicyBackoff {
	fn new(policy: RetryPolicy) -> Self {
		Self { policy, attempt: 0 }
	}
}

impl Backoff for PolicyBackoff {
	fn reset(&mut self) {
		self.attempt = 0;
	}

	fn next_backoff(&mut self) -> Option<Duration> {
		if self.attempt + 1 >= self.policy.max_attempts.max(1) {
			return None;
		}
		let delay = self.policy.delay_for(self.attempt);
		self.attempt += 1;
		Some(delay)
	}
}

/// Runs `operation` under `policy`.
pub async fn retry<T, E, F, Fut>(
	policy: &RetryPolicy,
	operation: &str,
	mut attempt_fn: F,
) -> Result<T, RetryError<E>>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: Retryable + Display,
{
	let mut attempts = 0u32;

	let result = backoff::future::retry_notify(
		PolicyBackoff::new(*policy),
		|| {
			attempts += 1;
			let attempt = attempt_fn();
			async move {
				attempt.await.map_err(|e| {
					if e.is_retryable() {
						backoff::Error::transient(e)
					} else {
						backoff::Error::permanent(e)
					}
				})
			}
		},
		|e: E, delay: Duration| {
			tracing::debug!(
				operation,
				delay_ms = delay.as_millis() as u64,
				error = %e,
				"Attempt failed, backing off"
			);
		},
	)
	.await;

	match result {
		Ok(value) => {
			if attempts > 1 {
				tracing::debug!(operation, attempts, "Succeeded after retry");
			}
			Ok(value)
		},
		Err(e) if e.is_retryable() => {
			tracing::warn!(operation, attempts, error = %e, "Retries exhausted");
			Err(RetryError::Exhausted {
				operation: operation.to_string(),
				attempts,
				source: e,
			})
		},
		Err(e) => Err(RetryError::Permanent {
			operation: operation.to_string(),
			attempts,
			source: e,
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use tokio::time::Instant;

	#[derive(Debug)]
	enum TestError {
		Flaky,
		Broken,
	}

	impl Display for TestError {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			match self {
				TestError::Flaky => f.write_str("flaky"),
				TestError::Broken => f.write_str("broken"),
			}
		}
	}

	impl std::error::Error for TestError {}

	impl Retryable for TestError {
		fn is_retryable(&self) -> bool {
			matches!(self, TestError::Flaky)
		}
	}

	fn policy() -> RetryPolicy {
		RetryPolicy::new(3, Duration::from_secs(1))
	}

	#[test]
	fn test_delay_doubles() {
		let policy = policy();
		assert_eq!(policy.delay_for(0), Duration::from_secs(1));
		assert_eq!(policy.delay_for(1), Duration::from_secs(2));
		assert_eq!(policy.delay_for(2), Duration::from_secs(4));
		assert_eq!(policy.delay_for(40), Duration::from_secs(u32::MAX as u64));
	}

	#[test]
	fn test_policy_backoff_schedule() {
		let mut backoff = PolicyBackoff::new(policy());
		assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));
		assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
		assert_eq!(backoff.next_backoff(), None);

		backoff.reset();
		assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));

		let mut single = PolicyBackoff::new(RetryPolicy::new(0, Duration::from_secs(1)));
		assert_eq!(single.next_backoff(), None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_succeeds_after_n_failures() {
		let calls = AtomicU32::new(0);
		let started = Instant::now();

		let result: Result<u32, RetryError<TestError>> = retry(&policy(), "flaky-op", || async {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			if n < 2 {
				Err(TestError::Flaky)
			} else {
				Ok(n)
			}
		})
		.await;

		assert_eq!(result.unwrap(), 2);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		// 1s after the first failure, 2s after the second.
		assert_eq!(started.elapsed(), Duration::from_secs(3));
	}

	#[tokio::test(start_paused = true)]
	async fn test_always_failing_is_exhausted() {
		let calls = AtomicU32::new(0);

		let result: Result<(), _> = retry(&policy(), "doomed-op", || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(TestError::Flaky)
		})
		.await;

		let err = result.unwrap_err();
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		assert_eq!(err.attempts(), 3);
		assert!(matches!(err, RetryError::Exhausted { .. }));
		assert_eq!(err.to_string(), "doomed-op failed after 3 attempts: flaky");
	}

	#[tokio::test(start_paused = true)]
	async fn test_permanent_error_not_retried() {
		let calls = AtomicU32::new(0);

		let result: Result<(), _> = retry(&policy(), "rejected-op", || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(TestError::Broken)
		})
		.await;

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(matches!(
			result.unwrap_err(),
			RetryError::Permanent { attempts: 1, .. }
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_zero_attempts_runs_once() {
		let calls = AtomicU32::new(0);
		let policy = RetryPolicy::new(0, Duration::from_millis(10));

		let result: Result<(), _> = retry(&policy, "once", || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(TestError::Flaky)
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_chain_errors_classified() {
		let calls = AtomicU32::new(0);
		let result: Result<(), _> = retry(&policy(), "submit", || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(ChainError::Rejected("abort_by_post_condition".into()))
		})
		.await;

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(matches!(
			result.unwrap_err().into_inner(),
			ChainError::Rejected(_)
		));
	}
}
