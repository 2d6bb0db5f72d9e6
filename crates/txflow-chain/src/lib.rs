//! Chain client abstraction for the txflow orchestrator.
//!
//! Everything that talks to a node or indexer sits behind [`ChainClient`].
//! The orchestrator never assumes a wire protocol; it only relies on the
//! error taxonomy of [`ChainError`] to decide whether an operation may be
//! retried. [`ChainService`] wraps a client, validates every input before
//! it reaches the network and caches account balance reads.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use txflow_storage::Cache;
use txflow_types::{
	truncate_id, validation, AccountBalance, ContractEvent, ContractId, ImplementationRegistry,
	PendingCall, TransactionId, TransactionStatus, ValidationError,
};

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors returned by chain clients.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
	/// The request did not reach the node or the connection dropped.
	#[error("Network error: {0}")]
	Network(String),
	/// The node did not answer in time.
	#[error("Timeout: {0}")]
	Timeout(String),
	/// The chain explicitly refused the call.
	#[error("Rejected: {0}")]
	Rejected(String),
	/// The requested transaction, contract or account is unknown.
	#[error("Not found: {0}")]
	NotFound(String),
	/// The node answered with something that could not be understood.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The client could not be built from its configuration.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// Input was malformed; no request was sent.
	#[error("Validation error: {0}")]
	Validation(#[from] ValidationError),
}

impl ChainError {
	/// Whether repeating the same request may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self, ChainError::Network(_) | ChainError::Timeout(_))
	}
}

/// Interface to a blockchain node or indexer.
///
/// Implementations must be safe to share between every polling loop of
/// the orchestrator.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Submits a contract call on behalf of `call.sender`.
	async fn submit_call(&self, call: &PendingCall) -> Result<TransactionId, ChainError>;

	/// Reports the current status of a transaction.
	async fn get_transaction_status(
		&self,
		transaction_id: &TransactionId,
	) -> Result<TransactionStatus, ChainError>;

	/// Returns at most `limit` recent events of a contract, newest first.
	async fn get_contract_events(
		&self,
		contract: &ContractId,
		limit: u32,
	) -> Result<Vec<ContractEvent>, ChainError>;

	/// Returns balance, locked amount and nonce of an account.
	async fn get_account_balance(&self, address: &str) -> Result<AccountBalance, ChainError>;
}

/// Type alias for chain client factory functions.
pub type ChainFactory = fn(&toml::Value) -> Result<Box<dyn ChainClient>, ChainError>;

/// Registry trait for chain client implementations.
pub trait ChainRegistry: ImplementationRegistry<Factory = ChainFactory> {}

/// Get all registered chain client implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ChainFactory)> {
	use implementations::memory;

	vec![(memory::Registry::NAME, memory::Registry::factory())]
}

/// Validated, cached access to a chain client.
pub struct ChainService {
	client: Arc<dyn ChainClient>,
	cache: Cache,
	balance_ttl: Option<Duration>,
}

impl ChainService {
	/// Creates a service; balances are cached for `balance_ttl`, or the
	/// cache's default TTL when `None`.
	pub fn new(client: Arc<dyn ChainClient>, cache: Cache, balance_ttl: Option<Duration>) -> Self {
		Self {
			client,
			cache,
			balance_ttl,
		}
	}

	pub fn client(&self) -> &Arc<dyn ChainClient> {
		&self.client
	}

	/// Submits a validated call.
	///
	/// The sender's cached balance is dropped afterwards, since its nonce
	/// has moved on.
	pub async fn submit_call(&self, call: &PendingCall) -> Result<TransactionId, ChainError> {
		validation::validate_call(call)?;

		let transaction_id = self.client.submit_call(call).await?;
		tracing::debug!(
			call = %call.describe(),
			tx_id = %truncate_id(transaction_id.as_str()),
			"Call accepted by chain"
		);

		if let Err(e) = self.cache.remove(&balance_key(&call.sender)).await {
			tracing::warn!(sender = %call.sender, error = %e, "Failed to invalidate balance");
		}
		Ok(transaction_id)
	}

	pub async fn transaction_status(
		&self,
		transaction_id: &TransactionId,
	) -> Result<TransactionStatus, ChainError> {
		transaction_id.validate()?;
		self.client.get_transaction_status(transaction_id).await
	}

	pub async fn contract_events(
		&self,
		contract: &ContractId,
		limit: u32,
	) -> Result<Vec<ContractEvent>, ChainError> {
		contract.validate()?;
		let mut events = self.client.get_contract_events(contract, limit).await?;
		events.truncate(limit as usize);
		Ok(events)
	}

	/// Balance of an account, served from cache while fresh.
	pub async fn account_balance(&self, address: &str) -> Result<AccountBalance, ChainError> {
		validation::validate_address(address)?;
		self.cache
			.get_or_fetch(&balance_key(address), self.balance_ttl, || {
				self.client.get_account_balance(address)
			})
			.await
	}
}

fn balance_key(address: &str) -> String {
	format!("balance:{}", address)
}
