//! Core orchestration for the txflow workspace.
//!
//! This crate turns queued contract calls into confirmed transactions. It
//! provides the retry handler, transaction queue and batch executor, the
//! transaction and contract health monitors, the contract event bus, the
//! shared state store, transaction performance metrics, and the [`Orchestrator`] engine that wires them
//! together from configuration.

pub mod batch;
pub mod builder;
pub mod engine;
pub mod event_bus;
pub mod gas;
pub mod metrics;
pub mod monitoring;
pub mod queue;
pub mod retry;
pub mod state;

pub use batch::BatchExecutor;
pub use builder::{BuilderError, OrchestratorBuilder};
pub use engine::{lifecycle_bus::LifecycleBus, EngineError, Orchestrator};
pub use event_bus::{EmitReport, EventBus, SubscriberError, SubscriptionId};
pub use gas::GasEstimator;
pub use metrics::{FunctionStats, PerformanceSummary, TransactionMetric, TransactionMetrics};
pub use monitoring::{
	HealthMonitor, HealthSettings, MonitorError, PendingTransaction, PollSettings,
	TransactionMonitor,
};
pub use queue::TransactionQueue;
pub use retry::{retry, RetryError, RetryPolicy, Retryable};
pub use state::{ContractRegistry, StateError, StateManager};
