use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

struct LatchInner {
	released: Mutex<bool>,
	cond: Condvar,
	notify: Notify,
}

/// One-shot latch released at most once.
///
/// Threads block on it with [`Self::wait_timeout`]; async code awaits
/// [`Self::released`]. Releasing an already released latch is a no-op and
/// reports `false`.
#[derive(Clone)]
pub struct Latch {
	inner: Arc<LatchInner>,
}

impl Default for Latch {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for Latch {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Latch").field("released", &self.is_released()).finish()
	}
}

impl Latch {
	/// Creates an unreleased latch.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(LatchInner {
				released: Mutex::new(false),
				cond: Condvar::new(),
				notify: Notify::new(),
			}),
		}
	}

	/// Releases the latch. Returns true only for the call that released it.
	pub fn release(&self) -> bool {
		let mut released = self.inner.released.lock();
		if *released {
			return false;
		}
		*released = true;
		drop(released);
		self.inner.cond.notify_all();
		self.inner.notify.notify_waiters();
		true
	}

	/// Returns true once released.
	pub fn is_released(&self) -> bool {
		*self.inner.released.lock()
	}

	/// Blocks for at most `timeout`. Returns true if the latch was released.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let mut released = self.inner.released.lock();
		while !*released {
			if self.inner.cond.wait_until(&mut released, deadline).timed_out() {
				return *released;
			}
		}
		true
	}

	/// Resolves once the latch is released.
	pub async fn released(&self) {
		loop {
			let notified = self.inner.notify.notified();
			if self.is_released() {
				return;
			}
			notified.await;
		}
	}
}
