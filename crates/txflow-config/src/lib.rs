//! Configuration module for the txflow orchestrator.
//!
//! This module provides structures and utilities for managing orchestrator
//! configuration. It supports loading configuration from TOML files and
//! validates that every tunable is inside a sensible range.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

pub mod builders;
mod loader;

pub use builders::ConfigBuilder;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this orchestrator instance.
	pub orchestrator: OrchestratorConfig,
	/// Backoff settings for remote calls.
	#[serde(default)]
	pub retry: RetryConfig,
	/// Transaction confirmation polling.
	#[serde(default)]
	pub monitor: MonitorConfig,
	/// Contract health polling.
	#[serde(default)]
	pub health: HealthConfig,
	/// Read cache settings.
	#[serde(default)]
	pub cache: CacheConfig,
	/// Queue draining settings.
	#[serde(default)]
	pub batch: BatchConfig,
	/// Cost estimation settings.
	#[serde(default)]
	pub gas: GasConfig,
	/// Transaction performance metrics.
	#[serde(default)]
	pub metrics: MetricsConfig,
	/// Chain client implementations.
	pub chain: ChainConfig,
	/// Contracts bound by name at startup.
	#[serde(default)]
	pub contracts: Vec<ContractConfig>,
}

/// Configuration specific to the orchestrator instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
	/// Unique identifier for this instance.
	pub id: String,
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
	/// Total number of attempts, including the first one.
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	/// Delay before the second attempt; doubled for every further attempt.
	#[serde(default = "default_base_delay_ms")]
	pub base_delay_ms: u64,
}

impl RetryConfig {
	pub fn base_delay(&self) -> Duration {
		Duration::from_millis(self.base_delay_ms)
	}
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: default_max_attempts(),
			base_delay_ms: default_base_delay_ms(),
		}
	}
}

fn default_max_attempts() -> u32 {
	3
}

fn default_base_delay_ms() -> u64 {
	1000
}

/// Transaction monitoring settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
	/// Interval between status polls.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Number of polls after which monitoring gives up.
	#[serde(default = "default_max_poll_attempts")]
	pub max_poll_attempts: u32,
	/// Overall deadline used by `wait_for_transaction`.
	#[serde(default = "default_wait_timeout_seconds")]
	pub wait_timeout_seconds: u64,
}

impl MonitorConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn wait_timeout(&self) -> Duration {
		Duration::from_secs(self.wait_timeout_seconds)
	}
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			max_poll_attempts: default_max_poll_attempts(),
			wait_timeout_seconds: default_wait_timeout_seconds(),
		}
	}
}

fn default_poll_interval_ms() -> u64 {
	10_000
}

fn default_max_poll_attempts() -> u32 {
	30
}

fn default_wait_timeout_seconds() -> u64 {
	300
}

/// How a successful poll that returns no events is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuietContractPolicy {
	/// A quiet contract that answers is considered responding.
	#[default]
	Healthy,
	/// No recent events marks the contract as not responding.
	Unresponsive,
}

/// Contract health monitoring settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
	/// Interval between event polls for each monitored contract.
	#[serde(default = "default_health_interval_seconds")]
	pub interval_seconds: u64,
	/// Number of recent events requested per poll.
	#[serde(default = "default_event_limit")]
	pub event_limit: u32,
	/// Interpretation of an empty event window.
	#[serde(default)]
	pub quiet_contract_policy: QuietContractPolicy,
}

impl HealthConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_secs(self.interval_seconds)
	}
}

impl Default for HealthConfig {
	fn default() -> Self {
		Self {
			interval_seconds: default_health_interval_seconds(),
			event_limit: default_event_limit(),
			quiet_contract_policy: QuietContractPolicy::default(),
		}
	}
}

fn default_health_interval_seconds() -> u64 {
	30
}

fn default_event_limit() -> u32 {
	10
}

/// Read cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
	/// Time-to-live applied when a caller does not pass one.
	#[serde(default = "default_ttl_seconds")]
	pub default_ttl_seconds: u64,
}

impl CacheConfig {
	pub fn default_ttl(&self) -> Duration {
		Duration::from_secs(self.default_ttl_seconds)
	}
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			default_ttl_seconds: default_ttl_seconds(),
		}
	}
}

fn default_ttl_seconds() -> u64 {
	60
}

/// Queue draining settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
	/// Interval at which the engine drains the queue.
	#[serde(default = "default_batch_interval_seconds")]
	pub interval_seconds: u64,
	/// Reorder drained calls by priority before submission.
	#[serde(default)]
	pub optimize_order: bool,
}

impl BatchConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_secs(self.interval_seconds)
	}
}

impl Default for BatchConfig {
	fn default() -> Self {
		Self {
			interval_seconds: default_batch_interval_seconds(),
			optimize_order: false,
		}
	}
}

fn default_batch_interval_seconds() -> u64 {
	5
}

/// Cost estimation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasConfig {
	/// Baseline cost charged per call.
	#[serde(default = "default_per_call_cost")]
	pub per_call_cost: u64,
}

impl Default for GasConfig {
	fn default() -> Self {
		Self {
			per_call_cost: default_per_call_cost(),
		}
	}
}

fn default_per_call_cost() -> u64 {
	5000
}

/// Transaction performance metrics.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
	/// Most recent records kept; older ones are dropped.
	#[serde(default = "default_metrics_capacity")]
	pub capacity: usize,
}

impl Default for MetricsConfig {
	fn default() -> Self {
		Self {
			capacity: default_metrics_capacity(),
		}
	}
}

fn default_metrics_capacity() -> usize {
	1000
}

/// Chain client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of chain client implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// A contract bound under a name at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractConfig {
	/// Registry name, e.g. `vault`.
	pub name: String,
	/// Contract id in `<address>.<name>` form.
	pub id: String,
	/// Start a health monitor for this contract.
	#[serde(default = "default_monitor_health")]
	pub monitor_health: bool,
}

fn default_monitor_health() -> bool {
	true
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all values are usable.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.orchestrator.id.is_empty() {
			return Err(ConfigError::Validation(
				"Orchestrator ID cannot be empty".into(),
			));
		}

		if self.retry.max_attempts == 0 {
			return Err(ConfigError::Validation(
				"retry.max_attempts must be at least 1".into(),
			));
		}
		if self.retry.max_attempts > 10 {
			return Err(ConfigError::Validation(
				"retry.max_attempts cannot exceed 10".into(),
			));
		}
		if self.retry.base_delay_ms > 60_000 {
			return Err(ConfigError::Validation(
				"retry.base_delay_ms cannot exceed 60000".into(),
			));
		}

		if self.monitor.poll_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"monitor.poll_interval_ms must be greater than 0".into(),
			));
		}
		if self.monitor.max_poll_attempts == 0 {
			return Err(ConfigError::Validation(
				"monitor.max_poll_attempts must be at least 1".into(),
			));
		}
		if self.monitor.wait_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"monitor.wait_timeout_seconds must be greater than 0".into(),
			));
		}

		if self.health.interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"health.interval_seconds must be greater than 0".into(),
			));
		}
		if self.health.event_limit == 0 || self.health.event_limit > 200 {
			return Err(ConfigError::Validation(
				"health.event_limit must be between 1 and 200".into(),
			));
		}

		if self.cache.default_ttl_seconds == 0 {
			return Err(ConfigError::Validation(
				"cache.default_ttl_seconds must be greater than 0".into(),
			));
		}
		if self.cache.default_ttl_seconds > 86400 {
			return Err(ConfigError::Validation(
				"cache.default_ttl_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		if self.batch.interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"batch.interval_seconds must be greater than 0".into(),
			));
		}

		if self.gas.per_call_cost == 0 {
			return Err(ConfigError::Validation(
				"gas.per_call_cost must be greater than 0".into(),
			));
		}

		if self.metrics.capacity == 0 || self.metrics.capacity > 100_000 {
			return Err(ConfigError::Validation(
				"metrics.capacity must be between 1 and 100000".into(),
			));
		}

		if self.chain.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one chain implementation must be configured".into(),
			));
		}
		if !self.chain.implementations.contains_key(&self.chain.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary chain implementation '{}' not found in implementations",
				self.chain.primary
			)));
		}

		self.validate_contracts()
	}

	/// Contract names must be unique and ids well formed.
	fn validate_contracts(&self) -> Result<(), ConfigError> {
		let mut names = HashSet::new();
		for contract in &self.contracts {
			if !names.insert(contract.name.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate contract name '{}'",
					contract.name
				)));
			}
			contract
				.id
				.parse::<txflow_types::ContractId>()
				.map_err(|e| {
					ConfigError::Validation(format!("Contract '{}': {}", contract.name, e))
				})?;
		}
		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
