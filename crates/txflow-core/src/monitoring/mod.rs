//! Polling loops for transaction confirmations and contract liveness.
//!
//! Both monitors keep at most one loop per key. Starting a loop for a key
//! that is already watched replaces the old loop. Poll intervals below
//! [`MIN_POLL_INTERVAL`] are raised to it.

use std::time::Duration;

pub mod health;
pub(crate) mod registry;
pub mod transaction;

pub use health::{HealthMonitor, HealthSettings};
pub use transaction::{MonitorError, PendingTransaction, PollSettings, TransactionMonitor};

/// Shortest interval a polling loop runs at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
