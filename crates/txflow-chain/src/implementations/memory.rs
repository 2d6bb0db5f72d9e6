//! In-memory chain client.
//!
//! Simulates a chain well enough to drive the orchestrator without a node:
//! submitted calls confirm after a configurable number of status polls,
//! statuses can be scripted per transaction, contract events can be
//! recorded, and failures can be injected into every kind of request.
//! Every request is counted, including the ones that fail.

use crate::{ChainError, ChainClient};
use async_trait::async_trait;
use chrono::Utc;
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use txflow_types::{
	AccountBalance, ChainValue, ContractEvent, ContractId, ImplementationRegistry, PendingCall,
	TransactionId, TransactionStatus,
};

const DEFAULT_CONFIRMATION_POLLS: u32 = 1;
const DEFAULT_FEE: u64 = 1000;

struct TransactionEntry {
	call: Option<PendingCall>,
	script: VecDeque<TransactionStatus>,
	current: TransactionStatus,
}

#[derive(Default)]
struct ChainState {
	transactions: HashMap<TransactionId, TransactionEntry>,
	/// Oldest first.
	events: HashMap<ContractId, Vec<ContractEvent>>,
	accounts: HashMap<String, AccountBalance>,
	block_height: u64,
	sequence: u64,
	rejected_functions: HashSet<String>,
	submit_failures: u32,
	status_failures: u32,
	event_failures: u32,
}

impl ChainState {
	fn next_id(&mut self, seed: &str) -> TransactionId {
		self.sequence += 1;
		let digest = Keccak256::digest(format!("{}|{}", seed, self.sequence).as_bytes());
		TransactionId::new(format!("0x{}", hex::encode(digest)))
	}

	fn account(&mut self, address: &str) -> &mut AccountBalance {
		self.accounts
			.entry(address.to_string())
			.or_insert_with(|| AccountBalance {
				address: address.to_string(),
				balance: 0,
				locked: 0,
				nonce: 0,
			})
	}

	fn record_event(
		&mut self,
		contract: &ContractId,
		event_name: &str,
		transaction_id: TransactionId,
		payload: ChainValue,
	) -> ContractEvent {
		let events = self.events.entry(contract.clone()).or_default();
		let event_index = events
			.iter()
			.filter(|e| e.transaction_id == transaction_id)
			.count() as u32;
		let event = ContractEvent {
			contract: contract.clone(),
			event_name: event_name.to_string(),
			transaction_id,
			event_index,
			block_height: self.block_height,
			block_time: Some(Utc::now()),
			payload,
		};
		events.push(event.clone());
		event
	}
}

/// Decrements an injected failure budget, returning whether to fail.
fn take_failure(budget: &mut u32) -> bool {
	if *budget == 0 {
		return false;
	}
	*budget -= 1;
	true
}

/// Simulated chain client.
pub struct InMemoryChain {
	state: Mutex<ChainState>,
	confirmation_polls: u32,
	fee: u64,
	latency: Duration,
	submits: AtomicU32,
	status_queries: AtomicU32,
	event_queries: AtomicU32,
	balance_queries: AtomicU32,
}

impl Default for InMemoryChain {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryChain {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(ChainState::default()),
			confirmation_polls: DEFAULT_CONFIRMATION_POLLS,
			fee: DEFAULT_FEE,
			latency: Duration::ZERO,
			submits: AtomicU32::new(0),
			status_queries: AtomicU32::new(0),
			event_queries: AtomicU32::new(0),
			balance_queries: AtomicU32::new(0),
		}
	}

	/// Number of `Pending` answers a submitted call gets before it confirms.
	pub fn with_confirmation_polls(mut self, polls: u32) -> Self {
		self.confirmation_polls = polls;
		self
	}

	/// Simulated round-trip time applied to every request.
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = latency;
		self
	}

	fn state(&self) -> MutexGuard<'_, ChainState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	async fn round_trip(&self) {
		if !self.latency.is_zero() {
			tokio::time::sleep(self.latency).await;
		}
	}

	/// Replaces the status sequence of a transaction. Each status query
	/// consumes one entry; once the script is exhausted the transaction
	/// keeps reporting its last status, or `Pending` if none was terminal.
	pub fn script_transaction(&self, transaction_id: &TransactionId, statuses: Vec<TransactionStatus>) {
		let mut state = self.state();
		let call = state
			.transactions
			.remove(transaction_id)
			.and_then(|entry| entry.call);
		state.transactions.insert(
			transaction_id.clone(),
			TransactionEntry {
				call,
				script: statuses.into(),
				current: TransactionStatus::Pending,
			},
		);
	}

	/// Records an event emitted by `contract` in a fresh block.
	pub fn push_event(
		&self,
		contract: &ContractId,
		event_name: &str,
		payload: ChainValue,
	) -> ContractEvent {
		let mut state = self.state();
		state.block_height += 1;
		let transaction_id = state.next_id(&format!("{}|{}", contract, event_name));
		state.record_event(contract, event_name, transaction_id, payload)
	}

	pub fn set_balance(&self, address: &str, balance: u128, locked: u128) {
		let mut state = self.state();
		let account = state.account(address);
		account.balance = balance;
		account.locked = locked;
	}

	/// Calls to `function_name` are refused with [`ChainError::Rejected`].
	pub fn reject_function(&self, function_name: &str) {
		self.state()
			.rejected_functions
			.insert(function_name.to_string());
	}

	/// The next `count` submissions fail with a network error.
	pub fn fail_next_submissions(&self, count: u32) {
		self.state().submit_failures = count;
	}

	/// The next `count` status queries fail with a timeout.
	pub fn fail_next_status_queries(&self, count: u32) {
		self.state().status_failures = count;
	}

	/// The next `count` event queries fail with a network error.
	pub fn fail_next_event_queries(&self, count: u32) {
		self.state().event_failures = count;
	}

	pub fn submit_count(&self) -> u32 {
		self.submits.load(Ordering::SeqCst)
	}

	pub fn status_query_count(&self) -> u32 {
		self.status_queries.load(Ordering::SeqCst)
	}

	pub fn event_query_count(&self) -> u32 {
		self.event_queries.load(Ordering::SeqCst)
	}

	pub fn balance_query_count(&self) -> u32 {
		self.balance_queries.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl ChainClient for InMemoryChain {
	async fn submit_call(&self, call: &PendingCall) -> Result<TransactionId, ChainError> {
		self.submits.fetch_add(1, Ordering::SeqCst);
		self.round_trip().await;

		let mut state = self.state();
		if take_failure(&mut state.submit_failures) {
			return Err(ChainError::Network("connection reset".into()));
		}
		if state.rejected_functions.contains(&call.function_name) {
			return Err(ChainError::Rejected(format!(
				"{} refused by the chain",
				call.describe()
			)));
		}

		let nonce = state.account(&call.sender).nonce;
		state.account(&call.sender).nonce += 1;

		let transaction_id = state.next_id(&format!(
			"{}|{}|{:?}|{}",
			call.sender,
			call.describe(),
			call.args,
			nonce
		));

		let mut script: VecDeque<TransactionStatus> = (0..self.confirmation_polls)
			.map(|_| TransactionStatus::Pending)
			.collect();
		script.push_back(TransactionStatus::Success {
			block_height: state.block_height + u64::from(self.confirmation_polls) + 1,
			fee: self.fee,
		});

		state.transactions.insert(
			transaction_id.clone(),
			TransactionEntry {
				call: Some(call.clone()),
				script,
				current: TransactionStatus::Pending,
			},
		);
		Ok(transaction_id)
	}

	async fn get_transaction_status(
		&self,
		transaction_id: &TransactionId,
	) -> Result<TransactionStatus, ChainError> {
		self.status_queries.fetch_add(1, Ordering::SeqCst);
		self.round_trip().await;

		let mut guard = self.state();
		let state = &mut *guard;
		if take_failure(&mut state.status_failures) {
			return Err(ChainError::Timeout("status query timed out".into()));
		}

		let entry = state
			.transactions
			.get_mut(transaction_id)
			.ok_or_else(|| ChainError::NotFound(transaction_id.to_string()))?;

		if entry.current.is_terminal() {
			return Ok(entry.current.clone());
		}

		let Some(next) = entry.script.pop_front() else {
			return Ok(TransactionStatus::Pending);
		};
		entry.current = next.clone();

		if let (TransactionStatus::Success { block_height, .. }, Some(call)) =
			(&next, entry.call.clone())
		{
			state.block_height = state.block_height.max(*block_height);
			state.record_event(
				&call.contract,
				&call.function_name,
				transaction_id.clone(),
				ChainValue::List(call.args),
			);
		}
		Ok(next)
	}

	async fn get_contract_events(
		&self,
		contract: &ContractId,
		limit: u32,
	) -> Result<Vec<ContractEvent>, ChainError> {
		self.event_queries.fetch_add(1, Ordering::SeqCst);
		self.round_trip().await;

		let mut state = self.state();
		if take_failure(&mut state.event_failures) {
			return Err(ChainError::Network("event index unavailable".into()));
		}

		Ok(state
			.events
			.get(contract)
			.map(|events| {
				events
					.iter()
					.rev()
					.take(limit as usize)
					.cloned()
					.collect()
			})
			.unwrap_or_default())
	}

	async fn get_account_balance(&self, address: &str) -> Result<AccountBalance, ChainError> {
		self.balance_queries.fetch_add(1, Ordering::SeqCst);
		self.round_trip().await;

		Ok(self.state().account(address).clone())
	}
}

/// Factory function to create an in-memory chain from configuration.
///
/// Configuration parameters:
/// - `confirmation_polls` (optional): pending answers before confirmation, default 1
/// - `latency_ms` (optional): simulated round-trip time, default 0
pub fn create_chain(config: &toml::Value) -> Result<Box<dyn ChainClient>, ChainError> {
	let read_u64 = |key: &str| -> Result<Option<u64>, ChainError> {
		match config.get(key) {
			None => Ok(None),
			Some(value) => value
				.as_integer()
				.and_then(|v| u64::try_from(v).ok())
				.map(Some)
				.ok_or_else(|| {
					ChainError::Configuration(format!(
						"'{}' must be a non-negative integer",
						key
					))
				}),
		}
	};

	let mut chain = InMemoryChain::new();
	if let Some(polls) = read_u64("confirmation_polls")? {
		let polls = u32::try_from(polls).map_err(|_| {
			ChainError::Configuration("'confirmation_polls' is too large".into())
		})?;
		chain = chain.with_confirmation_polls(polls);
	}
	if let Some(latency_ms) = read_u64("latency_ms")? {
		chain = chain.with_latency(Duration::from_millis(latency_ms));
	}
	Ok(Box::new(chain))
}

/// Registry for the in-memory chain implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::ChainFactory;

	fn factory() -> Self::Factory {
		create_chain
	}
}

impl crate::ChainRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	const ADDR: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";

	fn vault() -> ContractId {
		ContractId::new(ADDR, "token-vault")
	}

	fn call() -> PendingCall {
		PendingCall::new(vault(), "deposit", vec![ChainValue::UInt(5)], ADDR)
	}

	#[tokio::test]
	async fn test_submitted_call_confirms_after_polls() {
		let chain = InMemoryChain::new().with_confirmation_polls(2);
		let id = chain.submit_call(&call()).await.unwrap();
		assert!(id.validate().is_ok());

		assert_eq!(
			chain.get_transaction_status(&id).await.unwrap(),
			TransactionStatus::Pending
		);
		assert_eq!(
			chain.get_transaction_status(&id).await.unwrap(),
			TransactionStatus::Pending
		);
		let status = chain.get_transaction_status(&id).await.unwrap();
		assert!(status.is_success());

		// Terminal status is sticky.
		assert_eq!(chain.get_transaction_status(&id).await.unwrap(), status);

		let events = chain.get_contract_events(&vault(), 10).await.unwrap();
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].event_name, "deposit");
		assert_eq!(events[0].transaction_id, id);
	}

	#[tokio::test]
	async fn test_ids_are_unique_per_submission() {
		let chain = InMemoryChain::new();
		let a = chain.submit_call(&call()).await.unwrap();
		let b = chain.submit_call(&call()).await.unwrap();
		assert_ne!(a, b);
		assert_eq!(chain.get_account_balance(ADDR).await.unwrap().nonce, 2);
	}

	#[tokio::test]
	async fn test_scripted_failure_is_sticky() {
		let chain = InMemoryChain::new();
		let id = TransactionId::new(format!("0x{}", "ab".repeat(32)));
		chain.script_transaction(
			&id,
			vec![
				TransactionStatus::Pending,
				TransactionStatus::Failed {
					reason: "abort_by_response".into(),
				},
			],
		);

		assert_eq!(
			chain.get_transaction_status(&id).await.unwrap(),
			TransactionStatus::Pending
		);
		for _ in 0..3 {
			assert!(matches!(
				chain.get_transaction_status(&id).await.unwrap(),
				TransactionStatus::Failed { .. }
			));
		}
	}

	#[tokio::test]
	async fn test_unknown_transaction_not_found() {
		let chain = InMemoryChain::new();
		let id = TransactionId::new(format!("0x{}", "00".repeat(32)));
		assert!(matches!(
			chain.get_transaction_status(&id).await,
			Err(ChainError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_injected_failures_are_counted() {
		let chain = InMemoryChain::new();
		chain.fail_next_submissions(2);

		assert!(chain.submit_call(&call()).await.unwrap_err().is_transient());
		assert!(chain.submit_call(&call()).await.is_err());
		assert!(chain.submit_call(&call()).await.is_ok());
		assert_eq!(chain.submit_count(), 3);

		chain.fail_next_event_queries(1);
		assert!(chain.get_contract_events(&vault(), 10).await.is_err());
		assert!(chain.get_contract_events(&vault(), 10).await.is_ok());
		assert_eq!(chain.event_query_count(), 2);
	}

	#[tokio::test]
	async fn test_rejected_function() {
		let chain = InMemoryChain::new();
		chain.reject_function("deposit");
		let err = chain.submit_call(&call()).await.unwrap_err();
		assert!(matches!(err, ChainError::Rejected(_)));
		assert!(!err.is_transient());
	}

	#[tokio::test]
	async fn test_events_newest_first() {
		let chain = InMemoryChain::new();
		let first = chain.push_event(&vault(), "Transfer", ChainValue::UInt(1));
		let second = chain.push_event(&vault(), "Transfer", ChainValue::UInt(2));
		assert!(second.block_height > first.block_height);

		let events = chain.get_contract_events(&vault(), 1).await.unwrap();
		assert_eq!(events, vec![second]);
	}

	#[test]
	fn test_factory_reads_config() {
		let config = toml::Value::Table(toml::from_str("confirmation_polls = 3\nlatency_ms = 5").unwrap());
		assert!(create_chain(&config).is_ok());

		let bad = toml::Value::Table(toml::from_str("confirmation_polls = -1").unwrap());
		assert!(matches!(
			create_chain(&bad),
			Err(ChainError::Configuration(_))
		));
	}
}
