//! Sequential submission of batched calls.
//!
//! A batch is submitted call by call, in order, with every submission
//! wrapped in the retry policy. A call that still fails becomes an errored
//! [`SubmissionResult`]; the rest of the batch is submitted regardless.

use crate::engine::lifecycle_bus::LifecycleBus;
use crate::gas::GasEstimator;
use crate::queue::TransactionQueue;
use crate::retry::{retry, RetryPolicy};
use std::sync::Arc;
use tracing::instrument;
use txflow_chain::ChainService;
use txflow_types::{truncate_id, Batch, LifecycleEvent, PendingCall, SubmissionResult};

pub struct BatchExecutor {
	chain: Arc<ChainService>,
	policy: RetryPolicy,
	lifecycle: LifecycleBus,
	gas: GasEstimator,
	optimize_order: bool,
}

impl BatchExecutor {
	pub fn new(chain: Arc<ChainService>, policy: RetryPolicy, lifecycle: LifecycleBus) -> Self {
		Self {
			chain,
			policy,
			lifecycle,
			gas: GasEstimator::default(),
			optimize_order: false,
		}
	}

	/// Uses `gas` for cost estimates; with `optimize_order` drained calls
	/// are also reordered by priority before grouping.
	pub fn with_gas(mut self, gas: GasEstimator, optimize_order: bool) -> Self {
		self.gas = gas;
		self.optimize_order = optimize_order;
		self
	}

	/// Submits every call of `batch` in order. Returns one result per call,
	/// in call order.
	#[instrument(skip_all, fields(sender = %truncate_id(&batch.sender), calls = batch.len()))]
	pub async fn execute_batch(&self, batch: &Batch) -> Vec<SubmissionResult> {
		tracing::info!(estimated_cost = self.gas.estimate(&batch.calls), "Executing batch");

		let mut results = Vec::with_capacity(batch.len());
		for call in &batch.calls {
			results.push(self.submit(call).await);
		}

		let submitted = results.iter().filter(|r| r.is_success()).count();
		let failed = results.len() - submitted;
		if failed > 0 {
			tracing::warn!(submitted, failed, "Batch finished with failures");
		} else {
			tracing::info!(submitted, "Batch finished");
		}
		self.lifecycle
			.publish(LifecycleEvent::BatchExecuted {
				sender: batch.sender.clone(),
				submitted,
				failed,
			})
			.ok();
		results
	}

	/// Drains `queue` and executes one batch per sender. Results follow the
	/// order the batches were executed in.
	pub async fn execute_queue(&self, queue: &TransactionQueue) -> Vec<SubmissionResult> {
		let mut calls = queue.drain();
		if calls.is_empty() {
			return Vec::new();
		}
		if self.optimize_order {
			calls = self.gas.optimize(calls);
		}

		let mut results = Vec::with_capacity(calls.len());
		for batch in Batch::group_by_sender(calls) {
			results.extend(self.execute_batch(&batch).await);
		}
		results
	}

	async fn submit(&self, call: &PendingCall) -> SubmissionResult {
		let operation = call.describe();
		let mut attempts = 0;
		let outcome = retry(&self.policy, &operation, || {
			attempts += 1;
			self.chain.submit_call(call)
		})
		.await;

		match outcome {
			Ok(transaction_id) => {
				self.lifecycle
					.publish(LifecycleEvent::TransactionSubmitted {
						call: call.clone(),
						transaction_id: transaction_id.clone(),
					})
					.ok();
				SubmissionResult::submitted(call.clone(), transaction_id, attempts)
			},
			Err(e) => {
				tracing::error!(call = %operation, attempts = e.attempts(), error = %e.last_error(), "Submission failed");
				SubmissionResult::failed(call.clone(), e.to_string(), e.attempts())
			},
		}
	}
}
