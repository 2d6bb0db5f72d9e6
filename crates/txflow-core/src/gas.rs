//! Cost estimation and priority ordering of pending calls.

use txflow_config::GasConfig;
use txflow_types::PendingCall;

/// Stateless estimator charging a flat cost per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEstimator {
	per_call_cost: u64,
}

impl Default for GasEstimator {
	fn default() -> Self {
		Self::new(5000)
	}
}

impl From<&GasConfig> for GasEstimator {
	fn from(config: &GasConfig) -> Self {
		Self::new(config.per_call_cost)
	}
}

impl GasEstimator {
	/// A zero cost is raised to one so estimates keep growing with the
	/// number of calls.
	pub fn new(per_call_cost: u64) -> Self {
		Self {
			per_call_cost: per_call_cost.max(1),
		}
	}

	/// Estimated cost of submitting `calls`; zero for no calls.
	pub fn estimate(&self, calls: &[PendingCall]) -> u64 {
		(calls.len() as u64).saturating_mul(self.per_call_cost)
	}

	/// Orders calls by ascending priority. Calls of equal priority keep
	/// their relative order.
	pub fn optimize(&self, mut calls: Vec<PendingCall>) -> Vec<PendingCall> {
		calls.sort_by_key(|call| call.priority);
		calls
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use txflow_types::ContractId;

	const ADDR: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";

	fn call(function_name: &str, priority: u32) -> PendingCall {
		PendingCall::new(
			ContractId::new(ADDR, "token-vault"),
			function_name,
			vec![],
			ADDR,
		)
		.with_priority(priority)
	}

	#[test]
	fn test_estimate_grows_with_call_count() {
		let estimator = GasEstimator::default();
		assert_eq!(estimator.estimate(&[]), 0);

		let mut calls = Vec::new();
		let mut previous = 0;
		for i in 0..10 {
			calls.push(call("deposit", i));
			let cost = estimator.estimate(&calls);
			assert!(cost > previous);
			previous = cost;
		}
		assert_eq!(previous, 50_000);
	}

	#[test]
	fn test_optimize_is_stable() {
		let estimator = GasEstimator::default();
		let calls = vec![call("x", 2), call("y", 1), call("b", 1), call("a", 1)];

		let ordered: Vec<(String, u32)> = estimator
			.optimize(calls)
			.into_iter()
			.map(|c| (c.function_name, c.priority))
			.collect();

		assert_eq!(
			ordered,
			vec![
				("y".to_string(), 1),
				("b".to_string(), 1),
				("a".to_string(), 1),
				("x".to_string(), 2)
			]
		);
	}

	#[test]
	fn test_zero_cost_still_grows() {
		let estimator = GasEstimator::new(0);
		let one = estimator.estimate(&[call("a", 0)]);
		let two = estimator.estimate(&[call("a", 0), call("b", 0)]);
		assert!(one > 0);
		assert!(two > one);
	}

	#[test]
	fn test_estimate_saturates() {
		let estimator = GasEstimator::new(u64::MAX);
		assert_eq!(estimator.estimate(&[call("a", 0), call("b", 0)]), u64::MAX);
	}
}
