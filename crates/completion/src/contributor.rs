//! Contributor contract: the pluggable producers of candidates.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use quill_worker::{CancelToken, panic_message};
use regex::Regex;

use crate::buffer::{BufferSnapshot, ReadAccess};
use crate::candidate::Candidate;
use crate::error::{ContributorError, Interrupted};

/// Immutable description of one completion attempt.
#[derive(Debug, Clone)]
pub struct CompletionParameters {
	snapshot: BufferSnapshot,
	prefix: String,
	invocation_count: u32,
	auto: bool,
	token: CancelToken,
	reads: ReadAccess,
}

impl CompletionParameters {
	pub(crate) fn new(snapshot: BufferSnapshot, invocation_count: u32, token: CancelToken, reads: ReadAccess) -> Self {
		let prefix = snapshot.prefix();
		Self {
			snapshot,
			prefix,
			invocation_count,
			auto: invocation_count == 0,
			token,
			reads,
		}
	}

	pub fn snapshot(&self) -> &BufferSnapshot {
		&self.snapshot
	}

	pub fn caret(&self) -> usize {
		self.snapshot.caret()
	}

	pub fn prefix(&self) -> &str {
		&self.prefix
	}

	/// 0 for auto-popup, 1 for the first explicit invocation, 2+ for repeats.
	pub fn invocation_count(&self) -> u32 {
		self.invocation_count
	}

	pub fn is_auto(&self) -> bool {
		self.auto
	}

	pub fn token(&self) -> &CancelToken {
		&self.token
	}

	/// Cooperative checkpoint.
	///
	/// Fails with [`Interrupted::Cancelled`] once the session is cancelled
	/// and with [`Interrupted::Stale`] once a buffer edit invalidated read
	/// access. Contributors must stop reading the snapshot on either.
	pub fn checkpoint(&self) -> Result<(), Interrupted> {
		self.token.checkpoint()?;
		if self.reads.is_valid() { Ok(()) } else { Err(Interrupted::Stale) }
	}
}

/// Where contributors deliver candidates.
///
/// Callable from any thread. Adds after cancellation are silently dropped.
pub trait ResultSink: Send + Sync {
	fn add(&self, candidate: Candidate);
	fn begin_batch(&self);
	fn end_batch(&self);
	/// Restart the session once the prefix matches `pattern`.
	fn restart_on_prefix(&self, pattern: Regex);
}

/// Pluggable candidate producer.
pub trait Contributor: Send + Sync {
	fn name(&self) -> &str;

	/// Produces candidates into `sink`. May run for an unbounded time as long
	/// as it honors [`CompletionParameters::checkpoint`].
	fn fill(&self, params: &CompletionParameters, sink: &dyn ResultSink) -> Result<(), ContributorError>;
}

/// How a contributor run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
	/// Every contributor ran; some may have failed on their own.
	Completed { failed: usize },
	/// A checkpoint stopped the run early.
	Interrupted(Interrupted),
}

/// Runs contributors in order.
///
/// A contributor that fails or panics is logged and treated as having
/// produced nothing more; the rest still run. A cancellation or read-access
/// invalidation stops the whole run.
pub(crate) fn run_contributors(
	contributors: &[Arc<dyn Contributor>],
	params: &CompletionParameters,
	sink: &dyn ResultSink,
) -> RunOutcome {
	let session = params.token().generation();
	let mut failed = 0;
	for contributor in contributors {
		if let Err(reason) = params.checkpoint() {
			return RunOutcome::Interrupted(reason);
		}
		let name = contributor.name();
		tracing::trace!(session, contributor = name, "completion.contributor.fill");
		match catch_unwind(AssertUnwindSafe(|| contributor.fill(params, sink))) {
			Ok(Ok(())) => {}
			Ok(Err(ContributorError::Interrupted(reason))) => {
				tracing::debug!(session, contributor = name, %reason, "completion.contributor.interrupted");
				return RunOutcome::Interrupted(reason);
			}
			Ok(Err(ContributorError::Failed(error))) => {
				failed += 1;
				tracing::warn!(session, contributor = name, error = %error, "completion.contributor.failed");
			}
			Err(payload) => {
				failed += 1;
				let message = panic_message(payload.as_ref()).unwrap_or_else(|| "non-string panic payload".to_string());
				tracing::warn!(session, contributor = name, panic = %message, "completion.contributor.panicked");
			}
		}
	}
	RunOutcome::Completed { failed }
}
