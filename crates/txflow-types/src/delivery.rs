//! Transaction delivery types.
//!
//! This module defines types related to transaction submission and
//! confirmation tracking, including transaction ids, statuses and account
//! balances.

use crate::validation::{validate_transaction_id, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction id as returned by the chain, e.g. `0x` + 64 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
	pub fn new(id: impl Into<String>) -> Self {
		TransactionId(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn validate(&self) -> Result<(), ValidationError> {
		validate_transaction_id(&self.0)
	}
}

impl fmt::Display for TransactionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Status of a submitted transaction as reported by the chain.
///
/// `Pending` may move to exactly one of the terminal states; a terminal
/// state never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
	/// Not yet included in a block.
	Pending,
	/// Included and executed successfully.
	Success {
		/// Block the transaction was included in.
		block_height: u64,
		/// Fee paid, in the chain's smallest unit.
		fee: u64,
	},
	/// Aborted or rejected by the chain.
	Failed {
		/// Reason reported by the chain.
		reason: String,
	},
}

impl TransactionStatus {
	pub fn is_terminal(&self) -> bool {
		!matches!(self, TransactionStatus::Pending)
	}

	pub fn is_success(&self) -> bool {
		matches!(self, TransactionStatus::Success { .. })
	}
}

impl fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransactionStatus::Pending => write!(f, "pending"),
			TransactionStatus::Success { block_height, .. } => {
				write!(f, "success (block {})", block_height)
			},
			TransactionStatus::Failed { reason } => write!(f, "failed: {}", reason),
		}
	}
}

/// Balance snapshot of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
	/// Account address.
	pub address: String,
	/// Spendable balance in the smallest unit.
	pub balance: u128,
	/// Locked (stacked) amount in the smallest unit.
	pub locked: u128,
	/// Next nonce for the account.
	pub nonce: u64,
}
