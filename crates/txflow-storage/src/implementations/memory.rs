//! In-memory storage backend.
//!
//! Entries live in a sharded concurrent map, so operations on different keys
//! never contend on a single lock. Expiry is checked against the tokio clock
//! on every read.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_live(&self, now: Instant) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

/// In-memory storage implementation with lazy expiry.
#[derive(Default)]
pub struct MemoryStorage {
	store: DashMap<String, Entry>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Evicts `key` if its entry expired. The check and the removal happen
	/// under the shard lock, so a concurrent fresh `set` is never dropped.
	fn evict_if_expired(&self, key: &str, now: Instant) {
		if self
			.store
			.remove_if(key, |_, entry| !entry.is_live(now))
			.is_some()
		{
			tracing::trace!(key = %key, "Evicted expired entry");
		}
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let now = Instant::now();
		let live = self
			.store
			.get(key)
			.and_then(|entry| entry.is_live(now).then(|| entry.value.clone()));

		match live {
			Some(value) => Ok(value),
			None => {
				self.evict_if_expired(key, now);
				Err(StorageError::NotFound)
			},
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let expires_at = ttl.map(|ttl| Instant::now() + ttl);
		self.store
			.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let now = Instant::now();
		let live = self.store.get(key).is_some_and(|entry| entry.is_live(now));
		if !live {
			self.evict_if_expired(key, now);
		}
		Ok(live)
	}

	async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let now = Instant::now();
		Ok(self
			.store
			.iter()
			.filter(|entry| entry.key().starts_with(prefix) && entry.value().is_live(now))
			.map(|entry| entry.key().clone())
			.collect())
	}

	async fn clear(&self) -> Result<(), StorageError> {
		self.store.clear();
		Ok(())
	}

	async fn len(&self) -> Result<usize, StorageError> {
		Ok(self.store.len())
	}
}

/// Factory function to create a memory storage backend.
pub fn create_storage() -> Box<dyn StorageInterface> {
	Box::new(MemoryStorage::new())
}
