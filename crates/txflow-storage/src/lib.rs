//! Storage module for the txflow orchestrator.
//!
//! This module provides the key/value abstraction shared by the read cache
//! and the state manager. Backends store raw bytes with an optional
//! time-to-live; [`StorageService`] adds typed, namespaced access on top and
//! [`Cache`] adds default expiry and cache-aside reads.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod cache;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

pub use cache::Cache;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found or has expired.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Expired entries must behave exactly like missing ones. Backends evict an
/// expired entry when a read finds it; nothing sweeps in the background.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live, replacing any previous
	/// value and expiry.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a live value exists for the key.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists live keys starting with `prefix`.
	async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Removes every entry.
	async fn clear(&self) -> Result<(), StorageError>;

	/// Number of entries physically held, expired ones not yet evicted included.
	async fn len(&self) -> Result<usize, StorageError>;
}

/// High-level storage service that provides typed operations.
///
/// Values are serialized to JSON and stored under `namespace:id`.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value with optional time-to-live.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a serializable value without time-to-live.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves and deserializes a value.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`retrieve`](Self::retrieve), with a missing value mapped to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	/// Ids stored under a namespace, sorted.
	pub async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let prefix = format!("{}:", namespace);
		let mut ids: Vec<String> = self
			.backend
			.keys(&prefix)
			.await?
			.into_iter()
			.map(|key| key[prefix.len()..].to_string())
			.collect();
		ids.sort();
		Ok(ids)
	}

	/// Removes every value of every namespace.
	pub async fn clear(&self) -> Result<(), StorageError> {
		self.backend.clear().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Binding {
		address: String,
		version: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_typed_round_trip() {
		let service = service();
		let binding = Binding {
			address: "SP000".into(),
			version: 2,
		};
		service.store("bindings", "vault", &binding).await.unwrap();

		let loaded: Binding = service.retrieve("bindings", "vault").await.unwrap();
		assert_eq!(loaded, binding);
		assert!(service.exists("bindings", "vault").await.unwrap());
		assert!(!service.exists("other", "vault").await.unwrap());
	}

	#[tokio::test]
	async fn test_retrieve_optional_missing() {
		let service = service();
		let loaded: Option<Binding> = service.retrieve_optional("bindings", "none").await.unwrap();
		assert!(loaded.is_none());
	}

	#[tokio::test]
	async fn test_wrong_type_is_serialization_error() {
		let service = service();
		service.store("bindings", "flag", &true).await.unwrap();
		let result: Result<Binding, _> = service.retrieve("bindings", "flag").await;
		assert!(matches!(result, Err(StorageError::Serialization(_))));
	}

	#[tokio::test]
	async fn test_list_ids_is_namespaced_and_sorted() {
		let service = service();
		service.store("contracts", "oracle", &1u8).await.unwrap();
		service.store("contracts", "amm", &2u8).await.unwrap();
		service.store("state", "cursor", &3u8).await.unwrap();

		let ids = service.list_ids("contracts").await.unwrap();
		assert_eq!(ids, vec!["amm".to_string(), "oracle".to_string()]);

		service.clear().await.unwrap();
		assert!(service.list_ids("contracts").await.unwrap().is_empty());
	}
}
