//! Broadcast channel for orchestration lifecycle events.
//!
//! Every component that changes the state of a call publishes here and
//! observers subscribe. Nothing in the engine depends on receiving these
//! events: slow receivers lag and lose old events rather than blocking
//! publishers.

use tokio::sync::broadcast;
use txflow_types::LifecycleEvent;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct LifecycleBus {
	sender: broadcast::Sender<LifecycleEvent>,
}

impl Default for LifecycleBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

impl LifecycleBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.sender.subscribe()
	}

	/// Publishes to current receivers; fails only when there are none.
	pub fn publish(
		&self,
		event: LifecycleEvent,
	) -> Result<usize, broadcast::error::SendError<LifecycleEvent>> {
		self.sender.send(event)
	}
}
