//! Lifecycle management for the orchestrator.
//!
//! Handles initialization and shutdown procedures, binding configured
//! contracts at startup and stopping every polling loop on the way out.

use super::{EngineError, Orchestrator};
use txflow_types::ContractId;

impl Orchestrator {
	/// Registers the configured contracts and starts their health loops.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(orchestrator = %self.config.orchestrator.id, "Initializing orchestrator");

		for binding in &self.config.contracts {
			let contract: ContractId = binding.id.parse()?;
			self.contracts.register(&binding.name, &contract).await?;
			if binding.monitor_health {
				self.health.start_monitoring(contract)?;
			}
		}

		tracing::info!(
			contracts = self.config.contracts.len(),
			health_monitors = self.health.active_count(),
			"Orchestrator initialized"
		);
		Ok(())
	}

	/// Stops every transaction and health loop. Queued calls are kept.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down orchestrator");

		self.transactions.stop_all();
		self.health.stop_all();

		let pending = self.queue.len();
		if pending > 0 {
			tracing::warn!(pending, "Calls left in queue at shutdown");
		}
		Ok(())
	}
}
