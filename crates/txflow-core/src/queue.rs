//! Buffer of calls waiting for the next batch cycle.

use std::sync::{Mutex, MutexGuard, PoisonError};
use txflow_types::PendingCall;

/// Unbounded FIFO of pending calls.
///
/// `drain` swaps the buffer for an empty one under the lock, so every call
/// added concurrently with a drain ends up in exactly one drained batch.
#[derive(Default)]
pub struct TransactionQueue {
	calls: Mutex<Vec<PendingCall>>,
}

impl TransactionQueue {
	pub fn new() -> Self {
		Self::default()
	}

	fn calls(&self) -> MutexGuard<'_, Vec<PendingCall>> {
		self.calls.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Appends a call to the tail of the queue.
	pub fn add(&self, call: PendingCall) {
		self.calls().push(call);
	}

	/// Takes every queued call, in insertion order.
	pub fn drain(&self) -> Vec<PendingCall> {
		std::mem::take(&mut *self.calls())
	}

	pub fn len(&self) -> usize {
		self.calls().len()
	}

	pub fn is_empty(&self) -> bool {
		self.calls().is_empty()
	}
}
