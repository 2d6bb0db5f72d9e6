//! Contract identities and the events they emit.

use crate::validation::{validate_address, validate_contract_name, ValidationError};
use crate::{ChainValue, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A deployed contract, identified by deployer address and contract name.
///
/// The textual form is `<address>.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractId {
	/// Address of the deployer.
	pub address: String,
	/// Name the contract was deployed under.
	pub name: String,
}

impl ContractId {
	/// Creates a contract id without validating it.
	///
	/// Use [`str::parse`] when the input comes from outside the process.
	pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			address: address.into(),
			name: name.into(),
		}
	}

	/// Validates both halves of the id.
	pub fn validate(&self) -> Result<(), ValidationError> {
		validate_address(&self.address)?;
		validate_contract_name(&self.name)
	}
}

impl fmt::Display for ContractId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.address, self.name)
	}
}

impl FromStr for ContractId {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (address, name) = s
			.split_once('.')
			.ok_or_else(|| ValidationError::ContractId(s.to_string()))?;
		let id = ContractId::new(address, name);
		id.validate()?;
		Ok(id)
	}
}

/// Subscription key of the event bus: a contract plus an event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
	pub fn new(contract: &ContractId, event_name: &str) -> Self {
		Topic(format!("{}:{}", contract, event_name))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Topic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// An event decoded from the chain for a given contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
	/// Contract that emitted the event.
	pub contract: ContractId,
	/// Event name, e.g. `Transfer`.
	pub event_name: String,
	/// Transaction the event was emitted in.
	pub transaction_id: TransactionId,
	/// Position of the event inside its transaction.
	pub event_index: u32,
	/// Block the transaction was included in.
	pub block_height: u64,
	/// Block time, when the chain reports one.
	pub block_time: Option<DateTime<Utc>>,
	/// Decoded event data.
	pub payload: ChainValue,
}

impl ContractEvent {
	/// Topic this event is delivered on.
	pub fn topic(&self) -> Topic {
		Topic::new(&self.contract, &self.event_name)
	}

	/// Identity used to recognise an event seen in an earlier poll.
	pub fn key(&self) -> (TransactionId, u32) {
		(self.transaction_id.clone(), self.event_index)
	}
}
