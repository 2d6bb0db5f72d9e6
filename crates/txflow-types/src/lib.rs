//! Common types for the txflow orchestration workspace.
//!
//! This crate defines the data model shared by every component: typed call
//! arguments, contract identities, pending calls and batches, transaction
//! statuses, health records and lifecycle events. It also hosts the input
//! validation applied before any call reaches the chain client.

/// Contract calls, batches and submission results.
pub mod call;
/// Contract identities and decoded contract events.
pub mod contract;
/// Transaction ids, statuses and balances.
pub mod delivery;
/// Lifecycle events published by the orchestrator.
pub mod events;
/// Contract health records.
pub mod health;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Utility functions for formatting.
pub mod utils;
/// Input validation for addresses, names and call arguments.
pub mod validation;
/// Typed values for arguments and payloads.
pub mod value;

// Re-export all types for convenient access
pub use call::*;
pub use contract::*;
pub use delivery::*;
pub use events::*;
pub use health::*;
pub use registry::*;
pub use utils::truncate_id;
pub use validation::ValidationError;
pub use value::*;
