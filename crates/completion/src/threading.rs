//! Threading strategies and the weighing delegates behind them.
//!
//! [`ThreadingStrategy::Synchronous`] runs contributors on the calling thread
//! and applies candidates straight into the session results. Candidates a
//! [`crate::SessionHandle`] adds from any other thread still go through the
//! mailbox, so the aggregator only changes on the interactive thread.
//! [`ThreadingStrategy::Asynchronous`] runs them on one dedicated worker per
//! session and marshals every candidate back through a bounded mailbox; the
//! interactive thread applies them when it pumps the session.
//!
//! Either way, [`WeighingDelegate::wait_for`] returns only once every
//! candidate consumed before it has reached the aggregator. The asynchronous
//! delegate implements it with a [`Message::Drain`] sentinel: the worker
//! queues a latch behind its candidates and blocks until the interactive
//! thread releases it.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Mutex;
use quill_worker::{Latch, MailboxSender};
use regex::Regex;

use crate::candidate::Candidate;
use crate::contributor::ResultSink;
use crate::session::{SessionResults, SessionShared};

/// Where contributors run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadingStrategy {
	/// In-line on the calling thread, which already holds write access.
	Synchronous,
	/// On a dedicated worker thread.
	Asynchronous,
}

impl ThreadingStrategy {
	pub fn for_write_access(has_write_access: bool) -> Self {
		if has_write_access { Self::Synchronous } else { Self::Asynchronous }
	}
}

/// Producer to interactive thread traffic.
#[derive(Debug)]
pub(crate) enum Message {
	Candidate(Candidate),
	BeginBatch,
	EndBatch,
	/// Released by the consumer once everything queued before it is applied.
	Drain(Latch),
}

/// Routes consumed messages into the aggregator for one strategy.
pub(crate) enum WeighingDelegate {
	Sync {
		results: Arc<Mutex<SessionResults>>,
		/// Thread that created the session; the only one allowed to apply.
		owner: ThreadId,
		sender: MailboxSender<Message>,
	},
	Async {
		sender: MailboxSender<Message>,
		poll: Duration,
	},
}

impl WeighingDelegate {
	/// Returns true if `message` was applied or queued.
	pub(crate) fn consume(&self, shared: &SessionShared, message: Message) -> bool {
		match self {
			Self::Sync { results, owner, sender } => {
				if std::thread::current().id() != *owner {
					return Self::enqueue(shared, sender, message);
				}
				let mut results = results.lock();
				// Re-checked under the lock so a cancel that raced the caller's
				// check still wins.
				if shared.token.is_cancelled() && matches!(message, Message::Candidate(_)) {
					return false;
				}
				results.apply_message(message);
				true
			}
			Self::Async { sender, .. } => Self::enqueue(shared, sender, message),
		}
	}

	fn enqueue(shared: &SessionShared, sender: &MailboxSender<Message>, message: Message) -> bool {
		match sender.send(message) {
			Ok(()) => true,
			Err(err) => {
				tracing::trace!(session = shared.token.generation(), ?err, "completion.delegate.send_failed");
				false
			}
		}
	}

	/// Blocks until every previously consumed candidate has been applied, or
	/// the session is cancelled.
	pub(crate) fn wait_for(&self, shared: &SessionShared) {
		let Self::Async { sender, poll } = self else {
			return;
		};
		let drained = Latch::new();
		if sender.send(Message::Drain(drained.clone())).is_err() {
			return;
		}
		while !drained.wait_timeout(*poll) {
			if shared.token.is_cancelled() || sender.is_closed() {
				tracing::trace!(session = shared.token.generation(), "completion.delegate.drain_abandoned");
				return;
			}
		}
	}
}

/// The [`ResultSink`] handed to contributors.
pub(crate) struct SessionSink {
	shared: Arc<SessionShared>,
	delegate: WeighingDelegate,
}

impl SessionSink {
	pub(crate) fn new(shared: Arc<SessionShared>, delegate: WeighingDelegate) -> Self {
		Self { shared, delegate }
	}

	pub(crate) fn wait_for(&self) {
		self.delegate.wait_for(&self.shared);
	}
}

impl ResultSink for SessionSink {
	fn add(&self, candidate: Candidate) {
		if self.shared.token.is_cancelled() {
			tracing::trace!(session = self.shared.token.generation(), "completion.sink.add_after_cancel");
			return;
		}
		if self.delegate.consume(&self.shared, Message::Candidate(candidate)) {
			self.shared.added.fetch_add(1, Ordering::AcqRel);
		}
	}

	fn begin_batch(&self) {
		self.delegate.consume(&self.shared, Message::BeginBatch);
	}

	fn end_batch(&self) {
		self.delegate.consume(&self.shared, Message::EndBatch);
	}

	fn restart_on_prefix(&self, pattern: Regex) {
		tracing::trace!(session = self.shared.token.generation(), pattern = pattern.as_str(), "completion.sink.restart_on_prefix");
		self.shared.restart_patterns.lock().push(pattern);
	}
}

/// Scoped batch on a [`ResultSink`]: the aggregator re-sorts once when the
/// guard drops instead of once per candidate.
pub struct BatchGuard<'a> {
	sink: &'a dyn ResultSink,
}

impl<'a> BatchGuard<'a> {
	pub fn new(sink: &'a dyn ResultSink) -> Self {
		sink.begin_batch();
		Self { sink }
	}
}

impl Drop for BatchGuard<'_> {
	fn drop(&mut self) {
		self.sink.end_batch();
	}
}
