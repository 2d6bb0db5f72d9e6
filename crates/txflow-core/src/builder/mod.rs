//! Builder for constructing orchestrators.
//!
//! Composes an [`Orchestrator`] from configuration. The chain client is
//! either created by the factory registered under the configured primary
//! implementation name or injected directly, which is how tests drive a
//! scripted in-memory chain.

use crate::batch::BatchExecutor;
use crate::engine::{lifecycle_bus::LifecycleBus, Orchestrator};
use crate::event_bus::EventBus;
use crate::gas::GasEstimator;
use crate::metrics::TransactionMetrics;
use crate::monitoring::{HealthMonitor, HealthSettings, PollSettings, TransactionMonitor};
use crate::queue::TransactionQueue;
use crate::retry::RetryPolicy;
use crate::state::{ContractRegistry, StateManager};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use txflow_chain::{ChainClient, ChainFactory, ChainService};
use txflow_config::Config;
use txflow_storage::implementations::memory::{create_storage, MemoryStorage};
use txflow_storage::{Cache, StorageService};

/// Errors that can occur during orchestrator construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Builder for constructing an [`Orchestrator`] with a pluggable chain client.
pub struct OrchestratorBuilder {
	config: Config,
	client: Option<Arc<dyn ChainClient>>,
	chain_factories: HashMap<String, ChainFactory>,
}

impl OrchestratorBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			client: None,
			chain_factories: HashMap::new(),
		}
	}

	/// Uses `client` instead of creating one from the chain configuration.
	pub fn with_chain_client(mut self, client: Arc<dyn ChainClient>) -> Self {
		self.client = Some(client);
		self
	}

	/// Factories available for the configured chain implementations.
	pub fn with_chain_factories(mut self, factories: HashMap<String, ChainFactory>) -> Self {
		self.chain_factories = factories;
		self
	}

	pub fn build(self) -> Result<Orchestrator, BuilderError> {
		let client = match self.client.clone() {
			Some(client) => {
				tracing::info!(component = "chain", implementation = "injected", "Loaded");
				client
			},
			None => self.create_chain_client()?,
		};

		let cache = Cache::new(
			Arc::new(MemoryStorage::new()),
			self.config.cache.default_ttl(),
		);
		let chain = Arc::new(ChainService::new(client, cache.clone(), None));

		let lifecycle = LifecycleBus::default();
		let events = Arc::new(EventBus::new());

		let executor = BatchExecutor::new(
			chain.clone(),
			RetryPolicy::from(&self.config.retry),
			lifecycle.clone(),
		)
		.with_gas(
			GasEstimator::from(&self.config.gas),
			self.config.batch.optimize_order,
		);

		let transactions = TransactionMonitor::new(
			chain.clone(),
			lifecycle.clone(),
			PollSettings::from(&self.config.monitor),
		);
		let metrics = TransactionMetrics::from(&self.config.metrics);
		let health = HealthMonitor::new(
			chain.clone(),
			events.clone(),
			lifecycle.clone(),
			HealthSettings::from(&self.config.health),
		);

		tracing::info!(
			component = "engine",
			orchestrator = %self.config.orchestrator.id,
			metrics_capacity = metrics.capacity(),
			"Components wired"
		);

		Ok(Orchestrator {
			config: self.config,
			chain,
			cache,
			queue: Arc::new(TransactionQueue::new()),
			executor: Arc::new(executor),
			transactions: Arc::new(transactions),
			health: Arc::new(health),
			events,
			lifecycle,
			state: Arc::new(StateManager::new(StorageService::new(create_storage()))),
			contracts: Arc::new(ContractRegistry::new(StorageService::new(create_storage()))),
			metrics: Arc::new(metrics),
		})
	}

	fn create_chain_client(&self) -> Result<Arc<dyn ChainClient>, BuilderError> {
		let mut chain_impls = HashMap::new();
		for (name, config) in &self.config.chain.implementations {
			if let Some(factory) = self.chain_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						chain_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.chain.primary == name;
						tracing::info!(component = "chain", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "chain",
							implementation = %name,
							error = %e,
							"Failed to create chain implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create chain implementation '{}': {}",
							name, e
						)));
					},
				}
			} else {
				tracing::warn!(component = "chain", implementation = %name, "No factory registered, skipping");
			}
		}

		if chain_impls.is_empty() {
			return Err(BuilderError::MissingComponent(
				"No chain implementations available".into(),
			));
		}

		let primary = &self.config.chain.primary;
		let client = chain_impls.remove(primary).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary chain '{}' failed to load or has invalid configuration",
				primary
			))
		})?;
		Ok(Arc::from(client))
	}
}
