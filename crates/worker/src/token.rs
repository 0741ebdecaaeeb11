use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Monotonic generation clock handing out session ids.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Reason a cooperative checkpoint refused to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
	/// The owning token was cancelled.
	Cancelled,
}

impl fmt::Display for Interrupted {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Cancelled => f.write_str("cancelled"),
		}
	}
}

impl std::error::Error for Interrupted {}

/// Generation-scoped cancellation token.
///
/// Cancellation is monotonic: once [`Self::cancel`] has been observed it can
/// never be undone. Clones share the same flag, so one half can live on a
/// worker thread while the interactive thread holds the other.
#[derive(Debug, Clone)]
pub struct CancelToken {
	generation: u64,
	cancel: CancellationToken,
}

impl CancelToken {
	/// Creates a new token for `generation`.
	pub fn new(generation: u64) -> Self {
		Self {
			generation,
			cancel: CancellationToken::new(),
		}
	}

	/// Returns generation ID.
	pub const fn generation(&self) -> u64 {
		self.generation
	}

	/// Returns true when cancellation is requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests cancellation. Calling this more than once is a no-op.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Cooperative checkpoint for long-running work.
	pub fn checkpoint(&self) -> Result<(), Interrupted> {
		if self.is_cancelled() { Err(Interrupted::Cancelled) } else { Ok(()) }
	}
}
