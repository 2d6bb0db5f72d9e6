//! Confirmation tracking for submitted transactions.
//!
//! Each watched transaction gets its own polling task. The task polls the
//! chain at a fixed interval until the transaction reaches a terminal
//! status or the poll budget is spent, then resolves the caller's
//! [`PendingTransaction`] exactly once and removes itself from the
//! registry.

use super::registry::LoopRegistry;
use super::MIN_POLL_INTERVAL;
use crate::engine::lifecycle_bus::LifecycleBus;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{instrument, Instrument};
use txflow_chain::ChainService;
use txflow_config::MonitorConfig;
use txflow_types::{truncate_id, LifecycleEvent, TransactionId, TransactionStatus, ValidationError};

/// Errors surfaced to whoever waits on a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
	/// The poll budget ran out without a terminal chain response.
	#[error("Transaction {transaction_id} still pending after {attempts} polls")]
	TimedOut {
		transaction_id: TransactionId,
		attempts: u32,
	},
	/// Monitoring was stopped before a terminal status was seen.
	#[error("Monitoring of {transaction_id} was cancelled")]
	Cancelled { transaction_id: TransactionId },
	/// The caller's overall deadline elapsed first.
	#[error("Gave up waiting for {transaction_id} after {waited:?}")]
	WaitTimeout {
		transaction_id: TransactionId,
		waited: Duration,
	},
	#[error("Validation error: {0}")]
	Validation(#[from] ValidationError),
}

/// Handle to a monitored transaction.
pub struct PendingTransaction {
	transaction_id: TransactionId,
	status: watch::Receiver<TransactionStatus>,
	outcome: oneshot::Receiver<Result<TransactionStatus, MonitorError>>,
}

impl PendingTransaction {
	pub fn transaction_id(&self) -> &TransactionId {
		&self.transaction_id
	}

	/// Latest status observed by the polling task.
	pub fn status(&self) -> TransactionStatus {
		self.status.borrow().clone()
	}

	/// Resolves with the terminal status, a timeout, or a cancellation.
	pub async fn outcome(self) -> Result<TransactionStatus, MonitorError> {
		match self.outcome.await {
			Ok(result) => result,
			Err(_) => Err(MonitorError::Cancelled {
				transaction_id: self.transaction_id,
			}),
		}
	}
}

/// Settings of the polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
	pub interval: Duration,
	pub max_attempts: u32,
}

impl PollSettings {
	/// Raises a zero interval or attempt budget to the smallest usable value.
	fn clamped(self) -> Self {
		Self {
			interval: self.interval.max(MIN_POLL_INTERVAL),
			max_attempts: self.max_attempts.max(1),
		}
	}
}

impl From<&MonitorConfig> for PollSettings {
	fn from(config: &MonitorConfig) -> Self {
		Self {
			interval: config.poll_interval(),
			max_attempts: config.max_poll_attempts,
		}
	}
}

pub struct TransactionMonitor {
	chain: Arc<ChainService>,
	lifecycle: LifecycleBus,
	settings: PollSettings,
	loops: Arc<LoopRegistry<TransactionId>>,
}

impl TransactionMonitor {
	pub fn new(chain: Arc<ChainService>, lifecycle: LifecycleBus, settings: PollSettings) -> Self {
		Self {
			chain,
			lifecycle,
			settings: settings.clamped(),
			loops: Arc::new(LoopRegistry::new()),
		}
	}

	/// Starts polling `transaction_id`, replacing any loop already watching
	/// it. The first poll happens one interval after the call.
	#[instrument(skip_all, fields(tx_id = %truncate_id(transaction_id.as_str())))]
	pub fn watch(&self, transaction_id: TransactionId) -> Result<PendingTransaction, MonitorError> {
		transaction_id.validate()?;

		let (status_tx, status_rx) = watch::channel(TransactionStatus::Pending);
		let (outcome_tx, outcome_rx) = oneshot::channel();

		let poller = Poller {
			chain: self.chain.clone(),
			lifecycle: self.lifecycle.clone(),
			settings: self.settings,
			transaction_id: transaction_id.clone(),
		};
		let span = tracing::info_span!("tx_monitor", tx_id = %truncate_id(transaction_id.as_str()));
		self.loops.spawn(transaction_id.clone(), move || {
			async move {
				let outcome = poller.run(&status_tx).await;
				// The waiter may have dropped its handle; nothing to report then.
				let _ = outcome_tx.send(outcome);
			}
			.instrument(span)
		});
		tracing::debug!(
			interval_ms = self.settings.interval.as_millis() as u64,
			max_attempts = self.settings.max_attempts,
			"Monitoring started"
		);

		Ok(PendingTransaction {
			transaction_id,
			status: status_rx,
			outcome: outcome_rx,
		})
	}

	/// Stops monitoring `transaction_id`. Unknown or finished ids are ignored.
	pub fn stop_monitoring(&self, transaction_id: &TransactionId) {
		if self.loops.stop(transaction_id) {
			tracing::info!(tx_id = %truncate_id(transaction_id.as_str()), "Monitoring stopped");
		}
	}

	/// Stops every loop.
	pub fn stop_all(&self) {
		let stopped = self.loops.stop_all();
		if stopped > 0 {
			tracing::info!(stopped, "Stopped all transaction monitors");
		}
	}

	pub fn is_monitoring(&self, transaction_id: &TransactionId) -> bool {
		self.loops.is_active(transaction_id)
	}

	/// Number of transactions currently being polled.
	pub fn active_count(&self) -> usize {
		self.loops.len()
	}

	/// Watches `transaction_id` and waits for its outcome, giving up after
	/// `timeout`. Giving up stops the polling loop.
	pub async fn wait_for_transaction(
		&self,
		transaction_id: TransactionId,
		timeout: Duration,
	) -> Result<TransactionStatus, MonitorError> {
		let pending = self.watch(transaction_id.clone())?;
		match tokio::time::timeout(timeout, pending.outcome()).await {
			Ok(outcome) => outcome,
			Err(_) => {
				self.stop_monitoring(&transaction_id);
				Err(MonitorError::WaitTimeout {
					transaction_id,
					waited: timeout,
				})
			},
		}
	}

	/// Waits for several transactions at once; results keep input order.
	pub async fn wait_for_all(
		&self,
		transaction_ids: Vec<TransactionId>,
		timeout: Duration,
	) -> Vec<Result<TransactionStatus, MonitorError>> {
		join_all(
			transaction_ids
				.into_iter()
				.map(|id| self.wait_for_transaction(id, timeout)),
		)
		.await
	}
}

/// State owned by one polling task.
struct Poller {
	chain: Arc<ChainService>,
	lifecycle: LifecycleBus,
	settings: PollSettings,
	transaction_id: TransactionId,
}

impl Poller {
	async fn run(
		self,
		status_tx: &watch::Sender<TransactionStatus>,
	) -> Result<TransactionStatus, MonitorError> {
		let mut ticker = interval_at(
			Instant::now() + self.settings.interval,
			self.settings.interval,
		);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		for attempt in 1..=self.settings.max_attempts {
			ticker.tick().await;

			match self.chain.transaction_status(&self.transaction_id).await {
				Ok(TransactionStatus::Pending) => {
					tracing::debug!(attempt, "Still pending");
				},
				Ok(status) => {
					status_tx.send_replace(status.clone());
					self.publish_terminal(&status);
					return Ok(status);
				},
				Err(e) => {
					tracing::warn!(attempt, error = %e, "Status query failed");
				},
			}
		}

		tracing::warn!(
			attempts = self.settings.max_attempts,
			"Transaction monitoring timed out"
		);
		self.lifecycle
			.publish(LifecycleEvent::TransactionTimedOut {
				transaction_id: self.transaction_id.clone(),
				attempts: self.settings.max_attempts,
			})
			.ok();
		Err(MonitorError::TimedOut {
			transaction_id: self.transaction_id,
			attempts: self.settings.max_attempts,
		})
	}

	fn publish_terminal(&self, status: &TransactionStatus) {
		let event = match status {
			TransactionStatus::Failed { reason } => {
				tracing::warn!(reason = %reason, "Transaction failed");
				LifecycleEvent::TransactionFailed {
					transaction_id: self.transaction_id.clone(),
					reason: reason.clone(),
				}
			},
			_ => {
				tracing::info!(status = %status, "Confirmed");
				LifecycleEvent::TransactionConfirmed {
					transaction_id: self.transaction_id.clone(),
					status: status.clone(),
				}
			},
		};
		self.lifecycle.publish(event).ok();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use txflow_chain::implementations::memory::InMemoryChain;
	use txflow_storage::{implementations::memory::MemoryStorage, Cache};

	fn tx(byte: &str) -> TransactionId {
		TransactionId::new(format!("0x{}", byte.repeat(32)))
	}

	fn setup(max_attempts: u32) -> (Arc<InMemoryChain>, TransactionMonitor, LifecycleBus) {
		let chain = Arc::new(InMemoryChain::new());
		let cache = Cache::new(Arc::new(MemoryStorage::new()), Duration::from_secs(60));
		let service = Arc::new(ChainService::new(chain.clone(), cache, None));
		let lifecycle = LifecycleBus::default();
		let monitor = TransactionMonitor::new(
			service,
			lifecycle.clone(),
			PollSettings {
				interval: Duration::from_secs(10),
				max_attempts,
			},
		);
		(chain, monitor, lifecycle)
	}

	fn success() -> TransactionStatus {
		TransactionStatus::Success {
			block_height: 100,
			fee: 180,
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_resolves_once_after_fourth_poll() {
		let (chain, monitor, _) = setup(30);
		let id = tx("aa");
		chain.script_transaction(
			&id,
			vec![
				TransactionStatus::Pending,
				TransactionStatus::Pending,
				TransactionStatus::Pending,
				success(),
			],
		);

		let started = Instant::now();
		let pending = monitor.watch(id.clone()).unwrap();
		assert_eq!(pending.status(), TransactionStatus::Pending);

		let outcome = pending.outcome().await.unwrap();
		assert_eq!(outcome, success());
		assert_eq!(started.elapsed(), Duration::from_secs(40));
		assert_eq!(chain.status_query_count(), 4);

		tokio::time::sleep(Duration::from_secs(120)).await;
		assert_eq!(chain.status_query_count(), 4);
		assert!(!monitor.is_monitoring(&id));
		assert_eq!(monitor.active_count(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_zero_settings_are_clamped() {
		let chain = Arc::new(InMemoryChain::new());
		let cache = Cache::new(Arc::new(MemoryStorage::new()), Duration::from_secs(60));
		let service = Arc::new(ChainService::new(chain.clone(), cache, None));
		let monitor = TransactionMonitor::new(
			service,
			LifecycleBus::default(),
			PollSettings {
				interval: Duration::ZERO,
				max_attempts: 0,
			},
		);
		let id = tx("ab");
		chain.script_transaction(&id, vec![success()]);

		let started = Instant::now();
		let outcome = monitor.watch(id).unwrap().outcome().await.unwrap();
		assert_eq!(outcome, success());
		assert_eq!(started.elapsed(), MIN_POLL_INTERVAL);
		assert_eq!(chain.status_query_count(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_failed_is_terminal() {
		let (chain, monitor, lifecycle) = setup(30);
		let mut events = lifecycle.subscribe();
		let id = tx("bb");
		chain.script_transaction(
			&id,
			vec![TransactionStatus::Failed {
				reason: "abort_by_response".into(),
			}],
		);

		let outcome = monitor.watch(id.clone()).unwrap().outcome().await.unwrap();
		assert!(matches!(outcome, TransactionStatus::Failed { .. }));
		assert!(matches!(
			events.recv().await.unwrap(),
			LifecycleEvent::TransactionFailed { .. }
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_times_out_after_max_attempts() {
		let (chain, monitor, lifecycle) = setup(3);
		let mut events = lifecycle.subscribe();
		let id = tx("cc");
		chain.script_transaction(&id, vec![]);

		let err = monitor.watch(id.clone()).unwrap().outcome().await.unwrap_err();
		assert_eq!(
			err,
			MonitorError::TimedOut {
				transaction_id: id,
				attempts: 3
			}
		);
		assert_eq!(chain.status_query_count(), 3);
		assert!(matches!(
			events.recv().await.unwrap(),
			LifecycleEvent::TransactionTimedOut { attempts: 3, .. }
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_query_errors_count_as_attempts() {
		let (chain, monitor, _) = setup(5);
		let id = tx("dd");
		chain.script_transaction(&id, vec![success()]);
		chain.fail_next_status_queries(2);

		let outcome = monitor.watch(id).unwrap().outcome().await.unwrap();
		assert_eq!(outcome, success());
		assert_eq!(chain.status_query_count(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_stop_cancels_only_that_transaction() {
		let (chain, monitor, _) = setup(30);
		let a = tx("a1");
		let b = tx("b1");
		chain.script_transaction(&a, vec![]);
		chain.script_transaction(&b, vec![TransactionStatus::Pending, success()]);

		let pending_a = monitor.watch(a.clone()).unwrap();
		let pending_b = monitor.watch(b.clone()).unwrap();
		monitor.stop_monitoring(&a);
		// Unknown and already stopped ids are ignored.
		monitor.stop_monitoring(&a);
		monitor.stop_monitoring(&tx("ff"));

		assert_eq!(
			pending_a.outcome().await.unwrap_err(),
			MonitorError::Cancelled { transaction_id: a }
		);
		assert_eq!(pending_b.outcome().await.unwrap(), success());
	}

	#[tokio::test(start_paused = true)]
	async fn test_rewatch_replaces_previous_loop() {
		let (chain, monitor, _) = setup(30);
		let id = tx("ee");
		chain.script_transaction(&id, vec![]);

		let first = monitor.watch(id.clone()).unwrap();
		let _second = monitor.watch(id.clone()).unwrap();
		assert_eq!(monitor.active_count(), 1);
		assert!(matches!(
			first.outcome().await,
			Err(MonitorError::Cancelled { .. })
		));

		tokio::time::sleep(Duration::from_secs(35)).await;
		assert_eq!(chain.status_query_count(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_for_transaction_deadline() {
		let (chain, monitor, _) = setup(30);
		let id = tx("12");
		chain.script_transaction(&id, vec![]);

		let err = monitor
			.wait_for_transaction(id.clone(), Duration::from_secs(25))
			.await
			.unwrap_err();
		assert!(matches!(err, MonitorError::WaitTimeout { .. }));
		assert!(!monitor.is_monitoring(&id));
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_for_all_keeps_order() {
		let (chain, monitor, _) = setup(30);
		let ok = tx("34");
		let bad = tx("56");
		chain.script_transaction(&ok, vec![TransactionStatus::Pending, success()]);
		chain.script_transaction(
			&bad,
			vec![TransactionStatus::Failed {
				reason: "abort".into(),
			}],
		);

		let results = monitor
			.wait_for_all(vec![ok, bad], Duration::from_secs(300))
			.await;
		assert!(results[0].as_ref().unwrap().is_success());
		assert!(matches!(
			results[1],
			Ok(TransactionStatus::Failed { .. })
		));
	}

	#[tokio::test]
	async fn test_invalid_id_rejected() {
		let (_, monitor, _) = setup(30);
		assert!(matches!(
			monitor.watch(TransactionId::new("nope")),
			Err(MonitorError::Validation(_))
		));
		assert_eq!(monitor.active_count(), 0);
	}
}
