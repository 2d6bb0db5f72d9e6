//! Contract calls, batches and submission results.

use crate::{ChainValue, ContractId, TransactionId};
use serde::{Deserialize, Serialize};

/// A contract call waiting to be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCall {
	/// Target contract.
	pub contract: ContractId,
	/// Public function to invoke.
	pub function_name: String,
	/// Ordered, typed arguments.
	pub args: Vec<ChainValue>,
	/// Identity the call is sent from.
	pub sender: String,
	/// Lower values are submitted first when a batch is optimised.
	pub priority: u32,
}

impl PendingCall {
	pub fn new(
		contract: ContractId,
		function_name: impl Into<String>,
		args: Vec<ChainValue>,
		sender: impl Into<String>,
	) -> Self {
		Self {
			contract,
			function_name: function_name.into(),
			args,
			sender: sender.into(),
			priority: 0,
		}
	}

	pub fn with_priority(mut self, priority: u32) -> Self {
		self.priority = priority;
		self
	}

	/// Short human-readable identity used in logs and errors.
	pub fn describe(&self) -> String {
		format!("{}::{}", self.contract, self.function_name)
	}
}

/// A fixed, ordered group of calls sent by one sender.
///
/// Calls are submitted in order but not atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
	pub calls: Vec<PendingCall>,
	pub sender: String,
}

impl Batch {
	pub fn new(calls: Vec<PendingCall>, sender: impl Into<String>) -> Self {
		Self {
			calls,
			sender: sender.into(),
		}
	}

	/// Splits calls into one batch per sender.
	///
	/// Batches are ordered by the first appearance of their sender and keep
	/// the original relative order of calls.
	pub fn group_by_sender(calls: Vec<PendingCall>) -> Vec<Batch> {
		let mut batches: Vec<Batch> = Vec::new();
		for call in calls {
			match batches.iter_mut().find(|b| b.sender == call.sender) {
				Some(batch) => batch.calls.push(call),
				None => {
					let sender = call.sender.clone();
					batches.push(Batch::new(vec![call], sender));
				},
			}
		}
		batches
	}

	pub fn len(&self) -> usize {
		self.calls.len()
	}

	pub fn is_empty(&self) -> bool {
		self.calls.is_empty()
	}
}

/// Outcome of submitting a single call of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
	/// The call that was submitted.
	pub call: PendingCall,
	/// Id assigned by the chain, absent when submission failed.
	pub transaction_id: Option<TransactionId>,
	/// Final error after retries, absent on success.
	pub error: Option<String>,
	/// Number of submission attempts made.
	pub attempts: u32,
}

impl SubmissionResult {
	pub fn submitted(call: PendingCall, transaction_id: TransactionId, attempts: u32) -> Self {
		Self {
			call,
			transaction_id: Some(transaction_id),
			error: None,
			attempts,
		}
	}

	pub fn failed(call: PendingCall, error: impl Into<String>, attempts: u32) -> Self {
		Self {
			call,
			transaction_id: None,
			error: Some(error.into()),
			attempts,
		}
	}

	pub fn is_success(&self) -> bool {
		self.transaction_id.is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn call(sender: &str, function: &str) -> PendingCall {
		PendingCall::new(ContractId::new("SP1", "vault"), function, vec![], sender)
	}

	#[test]
	fn test_group_by_sender_preserves_order() {
		let calls = vec![
			call("alice", "a1"),
			call("bob", "b1"),
			call("alice", "a2"),
			call("bob", "b2"),
			call("carol", "c1"),
		];

		let batches = Batch::group_by_sender(calls);
		let shape: Vec<(String, Vec<String>)> = batches
			.iter()
			.map(|b| {
				(
					b.sender.clone(),
					b.calls.iter().map(|c| c.function_name.clone()).collect(),
				)
			})
			.collect();

		assert_eq!(
			shape,
			vec![
				("alice".to_string(), vec!["a1".to_string(), "a2".to_string()]),
				("bob".to_string(), vec!["b1".to_string(), "b2".to_string()]),
				("carol".to_string(), vec!["c1".to_string()]),
			]
		);
	}

	#[test]
	fn test_group_empty() {
		assert!(Batch::group_by_sender(vec![]).is_empty());
	}
}
