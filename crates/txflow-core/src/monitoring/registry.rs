//! Registry of running polling loops, at most one per key.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Tracks one polling task per key.
///
/// Each spawned task carries a generation number. A task that ends on its
/// own removes its entry only if the generation still matches, so it never
/// removes a loop that replaced it.
pub(crate) struct LoopRegistry<K> {
	loops: DashMap<K, (u64, JoinHandle<()>)>,
	generation: AtomicU64,
}

impl<K> LoopRegistry<K>
where
	K: Eq + Hash + Clone + Send + Sync + 'static,
{
	pub(crate) fn new() -> Self {
		Self {
			loops: DashMap::new(),
			generation: AtomicU64::new(0),
		}
	}

	/// Spawns the loop built by `make` for `key`, aborting any loop already
	/// registered under it.
	///
	/// The task starts only once it is registered, so even a loop that
	/// finishes immediately finds its own entry to remove.
	pub(crate) fn spawn<F, Fut>(self: &Arc<Self>, key: K, make: F)
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let generation = self.generation.fetch_add(1, Ordering::Relaxed);
		let (start_tx, start_rx) = oneshot::channel::<()>();
		let registry = Arc::clone(self);
		let task_key = key.clone();
		let body = make();

		let handle = tokio::spawn(async move {
			if start_rx.await.is_err() {
				return;
			}
			body.await;
			registry.finish(&task_key, generation);
		});

		if let Some((_, previous)) = self.loops.insert(key, (generation, handle)) {
			previous.abort();
		}
		let _ = start_tx.send(());
	}

	fn finish(&self, key: &K, generation: u64) {
		self.loops
			.remove_if(key, |_, (current, _)| *current == generation);
	}

	/// Aborts the loop for `key`. Returns whether one was running.
	pub(crate) fn stop(&self, key: &K) -> bool {
		match self.loops.remove(key) {
			Some((_, (_, handle))) => {
				handle.abort();
				true
			},
			None => false,
		}
	}

	/// Aborts every loop and returns how many were running.
	pub(crate) fn stop_all(&self) -> usize {
		let mut stopped = 0;
		self.loops.retain(|_, (_, handle)| {
			handle.abort();
			stopped += 1;
			false
		});
		stopped
	}

	pub(crate) fn is_active(&self, key: &K) -> bool {
		self.loops.contains_key(key)
	}

	pub(crate) fn len(&self) -> usize {
		self.loops.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::AtomicU32;
	use std::time::Duration;

	#[tokio::test(start_paused = true)]
	async fn test_finished_loop_removes_itself() {
		let registry = Arc::new(LoopRegistry::new());
		registry.spawn("a", || async {});
		assert!(registry.is_active(&"a"));

		tokio::time::sleep(Duration::from_millis(1)).await;
		assert!(!registry.is_active(&"a"));
		assert_eq!(registry.len(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_respawn_replaces_previous_loop() {
		let registry = Arc::new(LoopRegistry::new());
		let ticks = Arc::new(AtomicU32::new(0));

		for _ in 0..3 {
			let ticks = ticks.clone();
			registry.spawn("a", move || async move {
				loop {
					ticks.fetch_add(1, Ordering::SeqCst);
					tokio::time::sleep(Duration::from_secs(1)).await;
				}
			});
		}
		assert_eq!(registry.len(), 1);

		tokio::time::sleep(Duration::from_millis(2500)).await;
		// Only the last loop ran: ticks at 0s, 1s and 2s.
		assert_eq!(ticks.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_stop_unknown_is_noop() {
		let registry: Arc<LoopRegistry<&str>> = Arc::new(LoopRegistry::new());
		assert!(!registry.stop(&"missing"));

		registry.spawn("a", || std::future::pending::<()>());
		registry.spawn("b", || std::future::pending::<()>());
		assert!(registry.stop(&"a"));
		assert!(!registry.stop(&"a"));
		assert_eq!(registry.stop_all(), 1);
		assert_eq!(registry.len(), 0);
	}
}
