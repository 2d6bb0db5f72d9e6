//! Orchestrator engine tying the components together.
//!
//! The [`Orchestrator`] owns one instance of every component and offers
//! the operations callers use: queue calls, flush the queue, watch
//! transactions, subscribe to contract events and manage health loops.
//! Every flush starts a confirmation loop for each submitted transaction
//! and records its outcome in the metrics store. [`Orchestrator::run`]
//! flushes the queue on a fixed interval until shutdown.

pub mod lifecycle;
pub mod lifecycle_bus;

use crate::batch::BatchExecutor;
use crate::event_bus::{EventBus, SubscriberError, SubscriptionId};
use crate::metrics::{TransactionMetric, TransactionMetrics};
use crate::monitoring::{HealthMonitor, MonitorError, PendingTransaction, TransactionMonitor};
use crate::queue::TransactionQueue;
use crate::state::{ContractRegistry, StateError, StateManager};
use lifecycle_bus::LifecycleBus;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::instrument;
use txflow_chain::{ChainError, ChainService};
use txflow_config::Config;
use txflow_storage::Cache;
use txflow_types::{
	truncate_id, validation, AccountBalance, ContractEvent, ContractId, HealthRecord,
	LifecycleEvent, PendingCall, SubmissionResult, Topic, TransactionId, TransactionStatus,
	ValidationError,
};

/// Errors returned by orchestrator operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Validation error: {0}")]
	Validation(#[from] ValidationError),
	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),
	#[error("Monitor error: {0}")]
	Monitor(#[from] MonitorError),
	#[error("State error: {0}")]
	State(#[from] StateError),
}

/// Main orchestrator coordinating submission, confirmation and events.
#[derive(Clone)]
pub struct Orchestrator {
	/// Orchestrator configuration.
	pub(crate) config: Config,
	/// Validated, cached access to the chain client.
	pub(crate) chain: Arc<ChainService>,
	/// Read cache shared with the chain service.
	pub(crate) cache: Cache,
	/// Calls waiting for the next batch cycle.
	pub(crate) queue: Arc<TransactionQueue>,
	pub(crate) executor: Arc<BatchExecutor>,
	pub(crate) transactions: Arc<TransactionMonitor>,
	pub(crate) health: Arc<HealthMonitor>,
	/// Contract event fan-out.
	pub(crate) events: Arc<EventBus>,
	/// Lifecycle notifications for observers.
	pub(crate) lifecycle: LifecycleBus,
	pub(crate) state: Arc<StateManager>,
	pub(crate) contracts: Arc<ContractRegistry>,
	/// Outcomes of recently settled transactions.
	pub(crate) metrics: Arc<TransactionMetrics>,
}

impl Orchestrator {
	/// Validates `call` and adds it to the queue for the next flush.
	#[instrument(skip_all, fields(call = %call.describe()))]
	pub fn enqueue(&self, call: PendingCall) -> Result<(), EngineError> {
		validation::validate_call(&call)?;

		self.queue.add(call.clone());
		tracing::debug!(queued = self.queue.len(), "Call queued");
		self.lifecycle
			.publish(LifecycleEvent::CallQueued { call })
			.ok();
		Ok(())
	}

	/// Number of calls waiting for the next flush.
	pub fn queued(&self) -> usize {
		self.queue.len()
	}

	/// Submits every queued call now, one batch per sender, and starts a
	/// confirmation loop for every transaction the chain accepted.
	///
	/// Failed submissions are recorded in the metrics right away; accepted
	/// ones once their confirmation loop settles.
	pub async fn flush(&self) -> Vec<SubmissionResult> {
		let results = self.executor.execute_queue(&self.queue).await;
		for result in &results {
			match &result.transaction_id {
				Some(transaction_id) => self.track(result, transaction_id),
				None => self
					.metrics
					.record(TransactionMetric::submission_failed(result)),
			}
		}
		results
	}

	fn track(&self, result: &SubmissionResult, transaction_id: &TransactionId) {
		let pending = match self.transactions.watch(transaction_id.clone()) {
			Ok(pending) => pending,
			Err(e) => {
				tracing::warn!(
					tx_id = %truncate_id(transaction_id.as_str()),
					error = %e,
					"Failed to start monitoring"
				);
				return;
			},
		};

		let metrics = self.metrics.clone();
		let result = result.clone();
		let started = Instant::now();
		tokio::spawn(async move {
			let outcome = pending.outcome().await;
			if let Some(metric) = TransactionMetric::settled(&result, &outcome, started.elapsed()) {
				metrics.record(metric);
			}
		});
	}

	/// Starts a confirmation loop for `transaction_id`.
	pub fn watch_transaction(
		&self,
		transaction_id: TransactionId,
	) -> Result<PendingTransaction, EngineError> {
		Ok(self.transactions.watch(transaction_id)?)
	}

	/// Waits for `transaction_id` to reach a terminal status, bounded by
	/// the configured wait timeout.
	pub async fn wait_for_transaction(
		&self,
		transaction_id: TransactionId,
	) -> Result<TransactionStatus, EngineError> {
		Ok(self
			.transactions
			.wait_for_transaction(transaction_id, self.config.monitor.wait_timeout())
			.await?)
	}

	pub fn stop_watching(&self, transaction_id: &TransactionId) {
		self.transactions.stop_monitoring(transaction_id);
	}

	/// Balance of `address`, served from the cache while fresh.
	pub async fn account_balance(&self, address: &str) -> Result<AccountBalance, EngineError> {
		Ok(self.chain.account_balance(address).await?)
	}

	/// Registers `callback` for `event_name` events of `contract`.
	pub fn subscribe<F>(&self, contract: &ContractId, event_name: &str, callback: F) -> SubscriptionId
	where
		F: Fn(&ContractEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
	{
		self.events
			.subscribe(Topic::new(contract, event_name), callback)
	}

	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.events.unsubscribe(id)
	}

	pub fn start_health_monitoring(&self, contract: ContractId) -> Result<(), EngineError> {
		Ok(self.health.start_monitoring(contract)?)
	}

	pub fn stop_health_monitoring(&self, contract: &ContractId) {
		self.health.stop_monitoring(contract);
	}

	pub fn health(&self, contract: &ContractId) -> Option<HealthRecord> {
		self.health.health(contract)
	}

	pub fn all_health(&self) -> Vec<HealthRecord> {
		self.health.all_health()
	}

	/// Binds `name` to `contract` in the contract registry.
	pub async fn register_contract(
		&self,
		name: &str,
		contract: &ContractId,
	) -> Result<(), EngineError> {
		Ok(self.contracts.register(name, contract).await?)
	}

	pub async fn contract(&self, name: &str) -> Result<Option<ContractId>, EngineError> {
		Ok(self.contracts.get(name).await?)
	}

	/// Subscribes to lifecycle events.
	pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.lifecycle.subscribe()
	}

	/// Returns a reference to the shared state store.
	pub fn state(&self) -> &StateManager {
		&self.state
	}

	pub fn contracts(&self) -> &ContractRegistry {
		&self.contracts
	}

	pub fn cache(&self) -> &Cache {
		&self.cache
	}

	pub fn chain(&self) -> &Arc<ChainService> {
		&self.chain
	}

	pub fn transactions(&self) -> &TransactionMonitor {
		&self.transactions
	}

	pub fn health_monitor(&self) -> &HealthMonitor {
		&self.health
	}

	/// Performance metrics of settled transactions.
	pub fn metrics(&self) -> &TransactionMetrics {
		&self.metrics
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Main execution loop, runs until Ctrl+C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
			}
		})
		.await
	}

	/// Main execution loop, runs until `shutdown` completes.
	///
	/// The queue is flushed every batch interval, the first flush one
	/// interval after start. All loops are stopped before returning.
	pub async fn run_until<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		let interval = self.config.batch.interval();
		let mut ticker = interval_at(Instant::now() + interval, interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		tokio::pin!(shutdown);

		tracing::info!(
			orchestrator = %self.config.orchestrator.id,
			batch_interval_secs = interval.as_secs(),
			"Orchestrator running"
		);

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					if !self.queue.is_empty() {
						let results = self.flush().await;
						let failed = results.iter().filter(|r| !r.is_success()).count();
						tracing::info!(calls = results.len(), failed, "Batch cycle finished");
					}
				}

				_ = &mut shutdown => {
					tracing::info!("Shutdown signal received");
					break;
				}
			}
		}

		self.shutdown().await
	}
}
