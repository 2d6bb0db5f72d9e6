//! Typed key/value state shared between components.

use super::StateError;
use serde::{de::DeserializeOwned, Serialize};
use txflow_storage::StorageService;

const NAMESPACE: &str = "state";

/// Typed, non-persistent key/value store.
///
/// Writes to different keys never block each other; a read returns the
/// last value written for its key.
pub struct StateManager {
	storage: StorageService,
}

impl StateManager {
	pub fn new(storage: StorageService) -> Self {
		Self { storage }
	}

	pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StateError> {
		self.storage.store(NAMESPACE, key, value).await?;
		Ok(())
	}

	/// Returns the value under `key`, or `None` if nothing was stored.
	pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
		Ok(self.storage.retrieve_optional(NAMESPACE, key).await?)
	}

	pub async fn delete(&self, key: &str) -> Result<(), StateError> {
		self.storage.remove(NAMESPACE, key).await?;
		Ok(())
	}

	pub async fn contains(&self, key: &str) -> Result<bool, StateError> {
		Ok(self.storage.exists(NAMESPACE, key).await?)
	}

	/// Stored keys, sorted.
	pub async fn keys(&self) -> Result<Vec<String>, StateError> {
		Ok(self.storage.list_ids(NAMESPACE).await?)
	}

	pub async fn clear(&self) -> Result<(), StateError> {
		self.storage.clear().await?;
		Ok(())
	}
}
