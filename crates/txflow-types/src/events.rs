//! Lifecycle event types.
//!
//! These events describe what the orchestrator did with a call: queued it,
//! submitted it, saw it confirmed or gave up on it. They flow through the
//! lifecycle bus so that observers can react to progress without polling
//! the components directly. Decoded on-chain events are a separate type,
//! [`crate::ContractEvent`].

use crate::{ContractId, HealthRecord, PendingCall, TransactionId, TransactionStatus};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all orchestration events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
	/// A call passed validation and was added to the queue.
	CallQueued { call: PendingCall },
	/// A batch finished executing.
	BatchExecuted {
		sender: String,
		submitted: usize,
		failed: usize,
	},
	/// A call was accepted by the chain and is awaiting confirmation.
	TransactionSubmitted {
		call: PendingCall,
		transaction_id: TransactionId,
	},
	/// A transaction reached `Success`.
	TransactionConfirmed {
		transaction_id: TransactionId,
		status: TransactionStatus,
	},
	/// A transaction was aborted or rejected by the chain.
	TransactionFailed {
		transaction_id: TransactionId,
		reason: String,
	},
	/// Monitoring gave up without a terminal chain response.
	TransactionTimedOut {
		transaction_id: TransactionId,
		attempts: u32,
	},
	/// A contract switched between responding and not responding.
	HealthChanged {
		contract: ContractId,
		record: HealthRecord,
	},
}
