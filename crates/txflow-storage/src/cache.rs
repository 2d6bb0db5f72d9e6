//! Read cache with per-entry expiry.
//!
//! Values are serialized into a [`StorageInterface`] backend with an
//! absolute expiry of `now + ttl`. A read at or after the expiry returns
//! nothing and evicts the entry.

use crate::{StorageError, StorageInterface};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Typed TTL cache shared by the orchestration components.
#[derive(Clone)]
pub struct Cache {
	backend: Arc<dyn StorageInterface>,
	default_ttl: Duration,
}

impl Cache {
	pub fn new(backend: Arc<dyn StorageInterface>, default_ttl: Duration) -> Self {
		Self {
			backend,
			default_ttl,
		}
	}

	pub fn default_ttl(&self) -> Duration {
		self.default_ttl
	}

	/// Stores `value` until `now + ttl`, or the default TTL when `None`.
	pub async fn set<T: Serialize>(
		&self,
		key: &str,
		value: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(key, bytes, Some(ttl.unwrap_or(self.default_ttl)))
			.await
	}

	/// Returns the cached value if it has not expired.
	pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
		match self.backend.get_bytes(key).await {
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map(Some)
				.map_err(|e| StorageError::Serialization(e.to_string())),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.backend.delete(key).await
	}

	/// Drops every entry.
	pub async fn clear(&self) -> Result<(), StorageError> {
		self.backend.clear().await
	}

	/// Entries physically held, including expired ones nobody has read yet.
	pub async fn raw_len(&self) -> Result<usize, StorageError> {
		self.backend.len().await
	}

	/// Cache-aside read: returns the cached value or runs `fetch` and caches
	/// its result.
	///
	/// Cache failures are logged and never fail the read; errors from
	/// `fetch` are returned unchanged and nothing is cached.
	pub async fn get_or_fetch<T, E, F, Fut>(
		&self,
		key: &str,
		ttl: Option<Duration>,
		fetch: F,
	) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		match self.get::<T>(key).await {
			Ok(Some(value)) => {
				tracing::debug!(key = %key, "Cache hit");
				return Ok(value);
			},
			Ok(None) => {},
			Err(e) => tracing::warn!(key = %key, error = %e, "Cache read failed"),
		}

		let value = fetch().await?;
		if let Err(e) = self.set(key, &value, ttl).await {
			tracing::warn!(key = %key, error = %e, "Cache write failed");
		}
		Ok(value)
	}
}
