//! Configuration builder for tests and embedded use.
//!
//! Produces a [`Config`] backed by the in-memory chain client with every
//! tunable at its default, so callers only override what they care about.

use crate::{
	BatchConfig, CacheConfig, ChainConfig, Config, ContractConfig, GasConfig, HealthConfig,
	MetricsConfig, MonitorConfig, OrchestratorConfig, QuietContractPolicy, RetryConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	orchestrator_id: String,
	retry: RetryConfig,
	monitor: MonitorConfig,
	health: HealthConfig,
	cache: CacheConfig,
	batch: BatchConfig,
	gas: GasConfig,
	metrics: MetricsConfig,
	chain_primary: String,
	contracts: Vec<ContractConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			orchestrator_id: "test-orchestrator".to_string(),
			retry: RetryConfig::default(),
			monitor: MonitorConfig::default(),
			health: HealthConfig::default(),
			cache: CacheConfig::default(),
			batch: BatchConfig::default(),
			gas: GasConfig::default(),
			metrics: MetricsConfig::default(),
			chain_primary: "memory".to_string(),
			contracts: Vec::new(),
		}
	}

	pub fn orchestrator_id(mut self, id: impl Into<String>) -> Self {
		self.orchestrator_id = id.into();
		self
	}

	/// Sets attempt count and base delay of the retry policy.
	pub fn retry(mut self, max_attempts: u32, base_delay_ms: u64) -> Self {
		self.retry = RetryConfig {
			max_attempts,
			base_delay_ms,
		};
		self
	}

	/// Sets the transaction polling interval and attempt cap.
	pub fn monitor(mut self, poll_interval_ms: u64, max_poll_attempts: u32) -> Self {
		self.monitor.poll_interval_ms = poll_interval_ms;
		self.monitor.max_poll_attempts = max_poll_attempts;
		self
	}

	pub fn wait_timeout_seconds(mut self, seconds: u64) -> Self {
		self.monitor.wait_timeout_seconds = seconds;
		self
	}

	pub fn health_interval_seconds(mut self, seconds: u64) -> Self {
		self.health.interval_seconds = seconds;
		self
	}

	pub fn quiet_contract_policy(mut self, policy: QuietContractPolicy) -> Self {
		self.health.quiet_contract_policy = policy;
		self
	}

	pub fn cache_ttl_seconds(mut self, seconds: u64) -> Self {
		self.cache.default_ttl_seconds = seconds;
		self
	}

	pub fn optimize_order(mut self, enabled: bool) -> Self {
		self.batch.optimize_order = enabled;
		self
	}

	pub fn per_call_cost(mut self, cost: u64) -> Self {
		self.gas.per_call_cost = cost;
		self
	}

	pub fn metrics_capacity(mut self, capacity: usize) -> Self {
		self.metrics.capacity = capacity;
		self
	}

	/// Binds a contract name to an id at startup.
	pub fn contract(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
		self.contracts.push(ContractConfig {
			name: name.into(),
			id: id.into(),
			monitor_health: true,
		});
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(
			self.chain_primary.clone(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Config {
			orchestrator: OrchestratorConfig {
				id: self.orchestrator_id,
			},
			retry: self.retry,
			monitor: self.monitor,
			health: self.health,
			cache: self.cache,
			batch: self.batch,
			gas: self.gas,
			metrics: self.metrics,
			chain: ChainConfig {
				primary: self.chain_primary,
				implementations,
			},
			contracts: self.contracts,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_defaults_are_valid() {
		let config = ConfigBuilder::new().build();
		assert!(config.validate().is_ok());
		assert_eq!(config.chain.primary, "memory");
		assert_eq!(config.retry.max_attempts, 3);
	}

	#[test]
	fn test_builder_overrides() {
		let config = ConfigBuilder::new()
			.orchestrator_id("node-a")
			.retry(5, 10)
			.monitor(100, 4)
			.optimize_order(true)
			.contract(
				"vault",
				"SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7.token-vault",
			)
			.build();
		assert_eq!(config.orchestrator.id, "node-a");
		assert_eq!(config.retry.base_delay_ms, 10);
		assert_eq!(config.monitor.max_poll_attempts, 4);
		assert!(config.batch.optimize_order);
		assert!(config.validate().is_ok());
	}
}
