//! Liveness monitoring of contracts.
//!
//! A health loop polls the recent events of one contract at a fixed
//! interval and folds the result into that contract's [`HealthRecord`].
//! Events not present in the previous window are published on the
//! [`EventBus`], oldest first.

use super::registry::LoopRegistry;
use super::MIN_POLL_INTERVAL;
use super::transaction::MonitorError;
use crate::engine::lifecycle_bus::LifecycleBus;
use crate::event_bus::EventBus;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{instrument, Instrument};
use txflow_chain::ChainService;
use txflow_config::{HealthConfig, QuietContractPolicy};
use txflow_types::{ContractEvent, ContractId, HealthRecord, LifecycleEvent, TransactionId};

/// Settings of the health loops.
#[derive(Debug, Clone, Copy)]
pub struct HealthSettings {
	pub interval: Duration,
	pub event_limit: u32,
	pub quiet_contract_policy: QuietContractPolicy,
}

impl HealthSettings {
	fn clamped(self) -> Self {
		Self {
			interval: self.interval.max(MIN_POLL_INTERVAL),
			..self
		}
	}
}

impl From<&HealthConfig> for HealthSettings {
	fn from(config: &HealthConfig) -> Self {
		Self {
			interval: config.interval(),
			event_limit: config.event_limit,
			quiet_contract_policy: config.quiet_contract_policy,
		}
	}
}

struct ContractHealth {
	record: HealthRecord,
	/// Keys of the events returned by the last successful poll.
	window: HashSet<(TransactionId, u32)>,
}

/// Shared by the monitor and every loop it spawns.
struct HealthChecker {
	chain: Arc<ChainService>,
	events: Arc<EventBus>,
	lifecycle: LifecycleBus,
	settings: HealthSettings,
	contracts: DashMap<ContractId, ContractHealth>,
}

impl HealthChecker {
	async fn check(&self, contract: &ContractId) -> HealthRecord {
		let started = Instant::now();
		let result = self
			.chain
			.contract_events(contract, self.settings.event_limit)
			.await;
		let latency = started.elapsed();
		let now = Utc::now();

		let (record, was_responding, fresh) = {
			let mut entry = self
				.contracts
				.entry(contract.clone())
				.or_insert_with(|| ContractHealth {
					record: HealthRecord::new(contract.clone()),
					window: HashSet::new(),
				});
			let health = &mut *entry;
			let was_responding = health.record.is_responding;
			let record = &mut health.record;
			record.last_checked = record.last_checked.max(now);

			let fresh = match result {
				Ok(events) => {
					let quiet = events.is_empty()
						&& self.settings.quiet_contract_policy == QuietContractPolicy::Unresponsive;
					record.response_latency = latency;
					record.event_count = events.len();
					if let Some(newest) = events.iter().filter_map(|e| e.block_time).max() {
						record.last_activity = Some(record.last_activity.map_or(newest, |at| at.max(newest)));
					}
					if quiet {
						record.is_responding = false;
						record.consecutive_error_count += 1;
						record.total_error_count += 1;
					} else {
						record.is_responding = true;
						record.consecutive_error_count = 0;
					}

					let fresh: Vec<ContractEvent> = events
						.iter()
						.rev()
						.filter(|e| !health.window.contains(&e.key()))
						.cloned()
						.collect();
					health.window = events.iter().map(ContractEvent::key).collect();
					fresh
				},
				Err(e) => {
					tracing::warn!(
						contract = %contract,
						consecutive_errors = record.consecutive_error_count + 1,
						error = %e,
						"Health check failed"
					);
					record.is_responding = false;
					record.consecutive_error_count += 1;
					record.total_error_count += 1;
					Vec::new()
				},
			};
			(health.record.clone(), was_responding, fresh)
		};

		for event in &fresh {
			self.events.emit(event);
		}

		if record.is_responding != was_responding {
			tracing::info!(
				contract = %contract,
				responding = record.is_responding,
				"Health changed"
			);
			self.lifecycle
				.publish(LifecycleEvent::HealthChanged {
					contract: contract.clone(),
					record: record.clone(),
				})
				.ok();
		}
		record
	}
}

pub struct HealthMonitor {
	checker: Arc<HealthChecker>,
	loops: Arc<LoopRegistry<ContractId>>,
}

impl HealthMonitor {
	pub fn new(
		chain: Arc<ChainService>,
		events: Arc<EventBus>,
		lifecycle: LifecycleBus,
		settings: HealthSettings,
	) -> Self {
		Self {
			checker: Arc::new(HealthChecker {
				chain,
				events,
				lifecycle,
				settings: settings.clamped(),
				contracts: DashMap::new(),
			}),
			loops: Arc::new(LoopRegistry::new()),
		}
	}

	/// Starts the health loop of `contract`, replacing any running one.
	/// The first check runs immediately.
	#[instrument(skip_all, fields(contract = %contract))]
	pub fn start_monitoring(&self, contract: ContractId) -> Result<(), MonitorError> {
		contract.validate()?;

		let checker = self.checker.clone();
		let interval = checker.settings.interval;
		let span = tracing::info_span!("health_monitor", contract = %contract);
		let key = contract.clone();
		self.loops.spawn(key, move || {
			async move {
				let mut ticker = tokio::time::interval(interval);
				ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
				loop {
					ticker.tick().await;
					checker.check(&contract).await;
				}
			}
			.instrument(span)
		});
		tracing::info!(
			interval_secs = interval.as_secs(),
			"Health monitoring started"
		);
		Ok(())
	}

	/// Stops the loop of `contract`; its record is kept.
	pub fn stop_monitoring(&self, contract: &ContractId) {
		if self.loops.stop(contract) {
			tracing::info!(contract = %contract, "Health monitoring stopped");
		}
	}

	pub fn stop_all(&self) {
		let stopped = self.loops.stop_all();
		if stopped > 0 {
			tracing::info!(stopped, "Stopped all health monitors");
		}
	}

	/// Runs a single check now and returns the updated record.
	pub async fn perform_health_check(
		&self,
		contract: &ContractId,
	) -> Result<HealthRecord, MonitorError> {
		contract.validate()?;
		Ok(self.checker.check(contract).await)
	}

	pub fn health(&self, contract: &ContractId) -> Option<HealthRecord> {
		self.checker
			.contracts
			.get(contract)
			.map(|h| h.record.clone())
	}

	/// Records of every contract checked so far, sorted by contract.
	pub fn all_health(&self) -> Vec<HealthRecord> {
		let mut records: Vec<HealthRecord> = self
			.checker
			.contracts
			.iter()
			.map(|h| h.record.clone())
			.collect();
		records.sort_by(|a, b| a.contract.cmp(&b.contract));
		records
	}

	pub fn is_monitoring(&self, contract: &ContractId) -> bool {
		self.loops.is_active(contract)
	}

	pub fn active_count(&self) -> usize {
		self.loops.len()
	}
}
