//! Contract health records.

use crate::ContractId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Liveness signal derived from polling a contract's recent events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
	/// Monitored contract.
	pub contract: ContractId,
	/// Whether the last poll succeeded.
	pub is_responding: bool,
	/// Time of the last poll, successful or not. Never moves backwards.
	pub last_checked: DateTime<Utc>,
	/// Round-trip time of the last poll.
	pub response_latency: Duration,
	/// Failed polls since the last successful one.
	pub consecutive_error_count: u32,
	/// Failed polls over the lifetime of the record.
	pub total_error_count: u64,
	/// Number of events returned by the last successful poll.
	pub event_count: usize,
	/// Block time of the newest event seen, if any.
	pub last_activity: Option<DateTime<Utc>>,
}

impl HealthRecord {
	/// A record for a contract that has not been polled yet.
	pub fn new(contract: ContractId) -> Self {
		Self {
			contract,
			is_responding: true,
			last_checked: DateTime::<Utc>::UNIX_EPOCH,
			response_latency: Duration::ZERO,
			consecutive_error_count: 0,
			total_error_count: 0,
			event_count: 0,
			last_activity: None,
		}
	}

	/// Time since the newest event, measured at `now`.
	pub fn last_activity_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
		self.last_activity.map(|at| now - at)
	}
}
