//! Transaction performance metrics.
//!
//! [`TransactionMetrics`] keeps the most recent settled transactions in a
//! bounded buffer and aggregates them on demand: overall success rate,
//! average fee and confirmation time, and per-function statistics. Records
//! are written by the orchestrator when a submission fails for good or a
//! watched transaction reaches a terminal outcome.

use crate::monitoring::MonitorError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use txflow_config::MetricsConfig;
use txflow_types::{ContractId, SubmissionResult, TransactionId, TransactionStatus};

/// Outcome of one call, from submission to its terminal status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionMetric {
	/// Absent when the call never made it to the chain.
	pub transaction_id: Option<TransactionId>,
	pub contract: ContractId,
	pub function_name: String,
	/// Submission attempts, retries included.
	pub attempts: u32,
	pub success: bool,
	/// Fee paid; zero unless the transaction was included successfully.
	pub fee: u64,
	/// Time from the start of monitoring to the terminal outcome.
	pub confirmation_time: Option<Duration>,
	pub error: Option<String>,
	pub recorded_at: DateTime<Utc>,
}

impl TransactionMetric {
	/// Record for a call whose submission failed after retries.
	pub fn submission_failed(result: &SubmissionResult) -> Self {
		Self {
			transaction_id: None,
			contract: result.call.contract.clone(),
			function_name: result.call.function_name.clone(),
			attempts: result.attempts,
			success: false,
			fee: 0,
			confirmation_time: None,
			error: Some(
				result
					.error
					.clone()
					.unwrap_or_else(|| "submission failed".to_string()),
			),
			recorded_at: Utc::now(),
		}
	}

	/// Record for a submitted call whose monitoring finished.
	///
	/// Returns `None` when monitoring was cancelled: the transaction was
	/// either handed to another watcher or the engine is shutting down.
	pub fn settled(
		result: &SubmissionResult,
		outcome: &Result<TransactionStatus, MonitorError>,
		elapsed: Duration,
	) -> Option<Self> {
		let (success, fee, error) = match outcome {
			Ok(TransactionStatus::Success { fee, .. }) => (true, *fee, None),
			Ok(TransactionStatus::Failed { reason }) => (false, 0, Some(reason.clone())),
			Ok(TransactionStatus::Pending) | Err(MonitorError::Cancelled { .. }) => return None,
			Err(e) => (false, 0, Some(e.to_string())),
		};

		Some(Self {
			transaction_id: result.transaction_id.clone(),
			contract: result.call.contract.clone(),
			function_name: result.call.function_name.clone(),
			attempts: result.attempts,
			success,
			fee,
			confirmation_time: Some(elapsed),
			error,
			recorded_at: Utc::now(),
		})
	}
}

/// Aggregate over a set of records. Every figure is zero for an empty set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
	pub total_transactions: usize,
	pub successful: usize,
	/// Percentage of successful records, 0 to 100.
	pub success_rate: f64,
	pub average_fee: f64,
	pub average_attempts: f64,
	/// Mean over successful records only.
	pub average_confirmation_time: Duration,
}

/// Per-function aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionStats {
	pub function_name: String,
	pub call_count: usize,
	/// Percentage of successful calls, 0 to 100.
	pub success_rate: f64,
	pub average_fee: f64,
}

/// Bounded store of the most recent [`TransactionMetric`]s.
pub struct TransactionMetrics {
	capacity: usize,
	records: Mutex<VecDeque<TransactionMetric>>,
}

impl Default for TransactionMetrics {
	fn default() -> Self {
		Self::new(1000)
	}
}

impl From<&MetricsConfig> for TransactionMetrics {
	fn from(config: &MetricsConfig) -> Self {
		Self::new(config.capacity)
	}
}

impl TransactionMetrics {
	/// Store keeping at most `capacity` records, at least one.
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			capacity,
			records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
		}
	}

	fn records(&self) -> MutexGuard<'_, VecDeque<TransactionMetric>> {
		self.records.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Appends `metric`, dropping the oldest record when full.
	pub fn record(&self, metric: TransactionMetric) {
		tracing::debug!(
			function = %metric.function_name,
			success = metric.success,
			attempts = metric.attempts,
			"Transaction metric recorded"
		);
		let mut records = self.records();
		if records.len() == self.capacity {
			records.pop_front();
		}
		records.push_back(metric);
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn len(&self) -> usize {
		self.records().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records().is_empty()
	}

	/// Copy of every record, oldest first.
	pub fn snapshot(&self) -> Vec<TransactionMetric> {
		self.records().iter().cloned().collect()
	}

	/// Aggregate over every record held.
	pub fn summary(&self) -> PerformanceSummary {
		summarize(self.records().iter())
	}

	/// Aggregate over records written at or after `since`.
	pub fn summary_since(&self, since: DateTime<Utc>) -> PerformanceSummary {
		summarize(self.records().iter().filter(|m| m.recorded_at >= since))
	}

	/// Statistics per function name, most called first. Ties are ordered
	/// by name.
	pub fn function_stats(&self) -> Vec<FunctionStats> {
		let mut grouped: HashMap<String, (usize, usize, u128)> = HashMap::new();
		for metric in self.records().iter() {
			let entry = grouped.entry(metric.function_name.clone()).or_default();
			entry.0 += 1;
			if metric.success {
				entry.1 += 1;
			}
			entry.2 += u128::from(metric.fee);
		}

		let mut stats: Vec<FunctionStats> = grouped
			.into_iter()
			.map(|(function_name, (calls, successes, fees))| FunctionStats {
				function_name,
				call_count: calls,
				success_rate: percentage(successes, calls),
				average_fee: fees as f64 / calls as f64,
			})
			.collect();
		stats.sort_by(|a, b| {
			b.call_count
				.cmp(&a.call_count)
				.then_with(|| a.function_name.cmp(&b.function_name))
		});
		stats
	}

	/// Every record as a JSON array, oldest first.
	pub fn export_json(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string_pretty(&self.snapshot())
	}

	pub fn clear(&self) {
		self.records().clear();
	}
}

fn percentage(part: usize, total: usize) -> f64 {
	if total == 0 {
		return 0.0;
	}
	part as f64 * 100.0 / total as f64
}

fn summarize<'a>(records: impl Iterator<Item = &'a TransactionMetric>) -> PerformanceSummary {
	let mut summary = PerformanceSummary::default();
	let mut fees = 0u128;
	let mut attempts = 0u64;
	let mut confirmed = 0u32;
	let mut confirmation_total = Duration::ZERO;

	for metric in records {
		summary.total_transactions += 1;
		fees += u128::from(metric.fee);
		attempts += u64::from(metric.attempts);
		if metric.success {
			summary.successful += 1;
			if let Some(elapsed) = metric.confirmation_time {
				confirmed += 1;
				confirmation_total = confirmation_total.saturating_add(elapsed);
			}
		}
	}

	if summary.total_transactions > 0 {
		let total = summary.total_transactions as f64;
		summary.success_rate = percentage(summary.successful, summary.total_transactions);
		summary.average_fee = fees as f64 / total;
		summary.average_attempts = attempts as f64 / total;
	}
	if confirmed > 0 {
		summary.average_confirmation_time = confirmation_total / confirmed;
	}
	summary
}

#[cfg(test)]
mod tests {
	use super::*;
	use txflow_types::{ChainValue, PendingCall};

	const ADDR: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";

	fn call(function_name: &str) -> PendingCall {
		PendingCall::new(
			ContractId::new(ADDR, "token-vault"),
			function_name,
			vec![ChainValue::UInt(1)],
			ADDR,
		)
	}

	fn submitted(function_name: &str, n: u32) -> SubmissionResult {
		SubmissionResult::submitted(call(function_name), TransactionId::new(format!("0x{:064x}", n)), 1)
	}

	fn confirmed(function_name: &str, n: u32, fee: u64, secs: u64) -> TransactionMetric {
		TransactionMetric::settled(
			&submitted(function_name, n),
			&Ok(TransactionStatus::Success {
				block_height: 10,
				fee,
			}),
			Duration::from_secs(secs),
		)
		.unwrap()
	}

	fn rejected(function_name: &str, n: u32) -> TransactionMetric {
		TransactionMetric::settled(
			&submitted(function_name, n),
			&Ok(TransactionStatus::Failed {
				reason: "abort_by_response".into(),
			}),
			Duration::from_secs(20),
		)
		.unwrap()
	}

	#[test]
	fn test_oldest_records_dropped_at_capacity() {
		let metrics = TransactionMetrics::new(3);
		for n in 0..5 {
			metrics.record(confirmed("deposit", n, 100, 10));
		}

		assert_eq!(metrics.len(), 3);
		let kept: Vec<TransactionId> = metrics
			.snapshot()
			.into_iter()
			.filter_map(|m| m.transaction_id)
			.collect();
		assert_eq!(
			kept,
			(2..5)
				.map(|n| TransactionId::new(format!("0x{:064x}", n)))
				.collect::<Vec<_>>()
		);
	}

	#[test]
	fn test_zero_capacity_keeps_one() {
		let metrics = TransactionMetrics::new(0);
		metrics.record(confirmed("deposit", 1, 100, 10));
		metrics.record(confirmed("deposit", 2, 100, 10));
		assert_eq!(metrics.capacity(), 1);
		assert_eq!(metrics.len(), 1);
	}

	#[test]
	fn test_empty_summary_is_zero() {
		let metrics = TransactionMetrics::default();
		assert_eq!(metrics.summary(), PerformanceSummary::default());
		assert!(metrics.function_stats().is_empty());
	}

	#[test]
	fn test_summary_aggregates() {
		let metrics = TransactionMetrics::default();
		metrics.record(confirmed("deposit", 1, 100, 10));
		metrics.record(confirmed("deposit", 2, 300, 30));
		metrics.record(rejected("withdraw", 3));
		metrics.record(TransactionMetric::submission_failed(&SubmissionResult::failed(
			call("withdraw"),
			"rejected: abort_by_post_condition",
			1,
		)));

		let summary = metrics.summary();
		assert_eq!(summary.total_transactions, 4);
		assert_eq!(summary.successful, 2);
		assert_eq!(summary.success_rate, 50.0);
		assert_eq!(summary.average_fee, 100.0);
		assert_eq!(summary.average_attempts, 1.0);
		// Failures do not count towards confirmation time.
		assert_eq!(summary.average_confirmation_time, Duration::from_secs(20));
	}

	#[test]
	fn test_summary_since_filters_old_records() {
		let metrics = TransactionMetrics::default();
		let mut old = confirmed("deposit", 1, 100, 10);
		old.recorded_at = Utc::now() - chrono::Duration::hours(2);
		metrics.record(old);
		metrics.record(rejected("deposit", 2));

		let recent = metrics.summary_since(Utc::now() - chrono::Duration::hours(1));
		assert_eq!(recent.total_transactions, 1);
		assert_eq!(recent.success_rate, 0.0);
		assert_eq!(metrics.summary().total_transactions, 2);
	}

	#[test]
	fn test_function_stats_sorted_by_call_count() {
		let metrics = TransactionMetrics::default();
		metrics.record(rejected("withdraw", 1));
		metrics.record(confirmed("deposit", 2, 100, 10));
		metrics.record(confirmed("deposit", 3, 200, 10));
		metrics.record(rejected("deposit", 4));
		metrics.record(confirmed("claim", 5, 50, 10));

		let stats = metrics.function_stats();
		let order: Vec<&str> = stats.iter().map(|s| s.function_name.as_str()).collect();
		assert_eq!(order, vec!["deposit", "claim", "withdraw"]);
		assert_eq!(stats[0].call_count, 3);
		assert_eq!(stats[0].average_fee, 100.0);
		assert!((stats[0].success_rate - 200.0 / 3.0).abs() < 1e-9);
		assert_eq!(stats[2].success_rate, 0.0);
	}

	#[test]
	fn test_cancelled_monitoring_not_recorded() {
		let result = submitted("deposit", 1);
		let outcome = Err(MonitorError::Cancelled {
			transaction_id: result.transaction_id.clone().unwrap(),
		});
		assert!(TransactionMetric::settled(&result, &outcome, Duration::from_secs(1)).is_none());

		let timed_out = Err(MonitorError::TimedOut {
			transaction_id: result.transaction_id.clone().unwrap(),
			attempts: 30,
		});
		let metric = TransactionMetric::settled(&result, &timed_out, Duration::from_secs(300)).unwrap();
		assert!(!metric.success);
		assert!(metric.error.unwrap().contains("30 polls"));
	}

	#[test]
	fn test_export_and_clear() {
		let metrics = TransactionMetrics::default();
		metrics.record(confirmed("deposit", 1, 100, 10));

		let exported: serde_json::Value = serde_json::from_str(&metrics.export_json().unwrap()).unwrap();
		assert_eq!(exported.as_array().unwrap().len(), 1);
		assert_eq!(exported[0]["function_name"], "deposit");
		assert_eq!(exported[0]["fee"], 100);

		metrics.clear();
		assert!(metrics.is_empty());
	}
}
