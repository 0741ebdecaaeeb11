use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::TaskClass;

/// Snapshot for one live worker thread.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
	pub name: String,
	pub class: TaskClass,
	pub generation: u64,
	pub started_at: Instant,
}

/// In-memory registry of live workers.
#[derive(Debug, Default, Clone)]
pub struct WorkerRegistry {
	inner: Arc<RwLock<HashMap<String, WorkerRecord>>>,
}

impl WorkerRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a worker and returns a guard that deregisters it on drop.
	pub fn enter(&self, name: impl Into<String>, class: TaskClass, generation: u64) -> WorkerGuard {
		let name = name.into();
		self.inner.write().insert(
			name.clone(),
			WorkerRecord {
				name: name.clone(),
				class,
				generation,
				started_at: Instant::now(),
			},
		);
		WorkerGuard {
			registry: self.clone(),
			name,
		}
	}

	/// Number of live workers.
	pub fn live_count(&self) -> usize {
		self.inner.read().len()
	}

	/// Returns snapshots sorted by name.
	pub fn snapshots(&self) -> Vec<WorkerRecord> {
		let mut records: Vec<_> = self.inner.read().values().cloned().collect();
		records.sort_by(|a, b| a.name.cmp(&b.name));
		records
	}

	fn remove(&self, name: &str) {
		self.inner.write().remove(name);
	}
}

/// Registration held by a running worker; deregisters on drop, including
/// during unwinding.
#[derive(Debug)]
pub struct WorkerGuard {
	registry: WorkerRegistry,
	name: String,
}

impl Drop for WorkerGuard {
	fn drop(&mut self) {
		self.registry.remove(&self.name);
	}
}
