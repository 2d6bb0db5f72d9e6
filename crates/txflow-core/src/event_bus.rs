//! In-process publish/subscribe for decoded contract events.
//!
//! Subscribers register under a [`Topic`], the pair of a contract and an
//! event name. [`EventBus::emit`] hands the event to every callback
//! registered on its topic at that moment, in registration order. A
//! callback that returns an error or panics is logged and counted; the
//! remaining callbacks still run and the emitter never sees the failure.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use txflow_types::{ContractEvent, Topic};

/// Error a subscriber reports back to the bus.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl From<&str> for SubscriberError {
	fn from(message: &str) -> Self {
		SubscriberError(message.to_string())
	}
}

impl From<String> for SubscriberError {
	fn from(message: String) -> Self {
		SubscriberError(message)
	}
}

/// Callback invoked for every event on a topic.
pub type EventCallback = Arc<dyn Fn(&ContractEvent) -> Result<(), SubscriberError> + Send + Sync>;

/// Handle identifying a single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
	/// Callbacks that returned `Ok`.
	pub delivered: usize,
	/// Callbacks that returned an error or panicked.
	pub failed: usize,
}

struct Subscription {
	id: SubscriptionId,
	callback: EventCallback,
}

#[derive(Default)]
pub struct EventBus {
	topics: RwLock<HashMap<Topic, Vec<Subscription>>>,
	next_id: AtomicU64,
}

impl EventBus {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `callback` for events on `topic`.
	pub fn subscribe<F>(&self, topic: Topic, callback: F) -> SubscriptionId
	where
		F: Fn(&ContractEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
	{
		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
		tracing::debug!(topic = %topic, subscription = id.0, "Subscribed");

		self.topics
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.entry(topic)
			.or_default()
			.push(Subscription {
				id,
				callback: Arc::new(callback),
			});
		id
	}

	/// Removes a subscription. Returns whether it was registered.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
		let mut removed = false;
		topics.retain(|_, subscriptions| {
			let before = subscriptions.len();
			subscriptions.retain(|s| s.id != id);
			removed |= subscriptions.len() != before;
			!subscriptions.is_empty()
		});
		removed
	}

	pub fn subscriber_count(&self, topic: &Topic) -> usize {
		self.topics
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(topic)
			.map_or(0, Vec::len)
	}

	/// Delivers `event` to the current subscribers of its topic.
	///
	/// Callbacks run outside the subscriber lock, so a callback may itself
	/// subscribe or unsubscribe; such changes apply from the next emit.
	pub fn emit(&self, event: &ContractEvent) -> EmitReport {
		let topic = event.topic();
		let callbacks: Vec<(SubscriptionId, EventCallback)> = self
			.topics
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&topic)
			.map(|subscriptions| {
				subscriptions
					.iter()
					.map(|s| (s.id, s.callback.clone()))
					.collect()
			})
			.unwrap_or_default();

		let mut report = EmitReport::default();
		for (id, callback) in callbacks {
			match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
				Ok(Ok(())) => report.delivered += 1,
				Ok(Err(e)) => {
					report.failed += 1;
					tracing::warn!(topic = %topic, subscription = id.0, error = %e, "Subscriber failed");
				},
				Err(_) => {
					report.failed += 1;
					tracing::error!(topic = %topic, subscription = id.0, "Subscriber panicked");
				},
			}
		}
		report
	}
}
