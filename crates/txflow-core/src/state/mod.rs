//! Shared in-process state.
//!
//! [`StateManager`] holds ephemeral workflow state under string keys and
//! [`ContractRegistry`] binds short names to contract ids. Both live only
//! as long as the orchestrator that owns them.

pub mod manager;
pub mod registry;

pub use manager::StateManager;
pub use registry::ContractRegistry;

use thiserror::Error;
use txflow_storage::StorageError;
use txflow_types::ValidationError;

#[derive(Debug, Error)]
pub enum StateError {
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Validation error: {0}")]
	Validation(#[from] ValidationError),
}
