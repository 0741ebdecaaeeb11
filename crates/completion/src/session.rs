//! One completion attempt: the progress indicator.
//!
//! A [`Session`] owns the aggregator, the cancellation token and the threading
//! strategy for a single attempt. The interactive thread owns the `Session`
//! itself; the thread-safe half ([`SessionShared`]) is what contributors and
//! [`SessionHandle`]s touch from other threads.
//!
//! Under the asynchronous strategy candidates queue up in the session mailbox
//! until the interactive thread calls [`Session::pump`], so the aggregator is
//! only ever mutated from that thread. Middle matches are held back until
//! more start matches arrived than the backlog threshold or the session
//! finalizes, which keeps the
//! visible ranking stable while the best matches are still coming in.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use quill_worker::{CancelToken, Latch, Mailbox, MailboxReceiver, TaskClass, WorkerRegistry, spawn_named_thread};
use regex::Regex;

use crate::aggregator::{AddOutcome, ResultAggregator};
use crate::buffer::{BufferSnapshot, ReadAccess, TrackedRange};
use crate::candidate::{Candidate, CandidateId};
use crate::config::CompletionConfig;
use crate::contributor::{CompletionParameters, Contributor, ResultSink, RunOutcome, run_contributors};
use crate::error::{CompletionError, Result};
use crate::matcher::MatchKind;
use crate::presentation::LookupView;
use crate::ranking::RankingPolicy;
use crate::threading::{Message, SessionSink, ThreadingStrategy, WeighingDelegate};

/// Session state shared with contributors and other threads.
pub(crate) struct SessionShared {
	pub(crate) token: CancelToken,
	pub(crate) reads: ReadAccess,
	pub(crate) added: AtomicU64,
	pub(crate) restart_patterns: Mutex<Vec<Regex>>,
	/// Contributors returned; their candidates may still be queued.
	pub(crate) produced: Latch,
	/// Contributors returned and everything they queued was applied.
	pub(crate) finished: Latch,
}

impl SessionShared {
	pub(crate) fn new(id: u64) -> Self {
		Self {
			token: CancelToken::new(id),
			reads: ReadAccess::new(),
			added: AtomicU64::new(0),
			restart_patterns: Mutex::new(Vec::new()),
			produced: Latch::new(),
			finished: Latch::new(),
		}
	}
}

/// Aggregator plus the delayed middle matches.
pub(crate) struct SessionResults {
	aggregator: ResultAggregator,
	delayed: Vec<Candidate>,
	start_matches: usize,
	backlog_threshold: usize,
	finalizing: bool,
}

impl SessionResults {
	pub(crate) fn new(aggregator: ResultAggregator, backlog_threshold: usize) -> Self {
		Self {
			aggregator,
			delayed: Vec::new(),
			start_matches: 0,
			backlog_threshold,
			finalizing: false,
		}
	}

	pub(crate) fn apply_message(&mut self, message: Message) {
		match message {
			Message::Candidate(candidate) => self.apply(candidate),
			Message::BeginBatch => self.aggregator.begin_batch(),
			Message::EndBatch => self.aggregator.end_batch(),
			Message::Drain(latch) => {
				latch.release();
			}
		}
	}

	fn apply(&mut self, candidate: Candidate) {
		match self.aggregator.match_kind(&candidate) {
			None => {
				tracing::trace!(lookup = candidate.lookup(), "completion.results.no_match");
			}
			Some(MatchKind::Start) => {
				if let AddOutcome::Added(_) = self.aggregator.add_element(candidate) {
					self.start_matches += 1;
				}
				if self.backlog_exceeded() {
					self.flush_delayed();
				}
			}
			Some(MatchKind::Middle) => {
				if self.finalizing || self.backlog_exceeded() {
					self.aggregator.add_element(candidate);
				} else {
					self.delayed.push(candidate);
				}
			}
		}
	}

	fn backlog_exceeded(&self) -> bool {
		self.start_matches > self.backlog_threshold
	}

	fn flush_delayed(&mut self) {
		if self.delayed.is_empty() {
			return;
		}
		tracing::trace!(count = self.delayed.len(), "completion.results.flush_delayed");
		for candidate in std::mem::take(&mut self.delayed) {
			self.aggregator.add_element(candidate);
		}
	}

	/// Cancelled sessions drop their delayed middle matches instead of
	/// releasing them.
	fn finalize(&mut self, cancelled: bool) {
		self.finalizing = true;
		if cancelled {
			if !self.delayed.is_empty() {
				tracing::trace!(count = self.delayed.len(), "completion.results.discard_delayed");
			}
			self.delayed.clear();
		} else {
			self.flush_delayed();
		}
		self.aggregator.reset_batches();
		self.aggregator.refresh();
	}
}

/// Count of sessions that are not yet disposed.
#[derive(Debug, Clone, Default)]
pub struct LiveSessions {
	count: Arc<AtomicUsize>,
}

impl LiveSessions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn count(&self) -> usize {
		self.count.load(Ordering::Acquire)
	}

	fn acquire(&self) -> LiveTicket {
		self.count.fetch_add(1, Ordering::AcqRel);
		LiveTicket {
			count: Arc::clone(&self.count),
		}
	}
}

struct LiveTicket {
	count: Arc<AtomicUsize>,
}

impl Drop for LiveTicket {
	fn drop(&mut self) {
		self.count.fetch_sub(1, Ordering::AcqRel);
	}
}

/// Everything fixed at session construction.
#[derive(Debug, Clone)]
pub struct SessionOptions {
	pub invocation_count: u32,
	pub strategy: ThreadingStrategy,
	pub config: CompletionConfig,
	pub ranking: RankingPolicy,
}

/// Resolves once every contributor has returned and its candidates are queued
/// for the interactive thread. Applying them still takes [`Session::pump`]
/// or [`Session::finish_computation`].
#[derive(Debug, Clone)]
pub struct FinishHandle {
	latch: Latch,
}

impl FinishHandle {
	pub fn is_finished(&self) -> bool {
		self.latch.is_released()
	}

	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		self.latch.wait_timeout(timeout)
	}

	pub async fn finished(&self) {
		self.latch.released().await;
	}
}

/// Thread-safe handle for adding candidates and cancelling.
#[derive(Clone)]
pub struct SessionHandle {
	shared: Arc<SessionShared>,
	sink: Arc<SessionSink>,
}

impl SessionHandle {
	pub fn id(&self) -> u64 {
		self.shared.token.generation()
	}

	/// Silently ignored once the session is cancelled.
	pub fn add_candidate(&self, candidate: Candidate) {
		self.sink.add(candidate);
	}

	pub fn cancel(&self) {
		self.shared.token.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.shared.token.is_cancelled()
	}

	pub fn added_count(&self) -> u64 {
		self.shared.added.load(Ordering::Acquire)
	}
}

impl fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionHandle").field("id", &self.id()).finish_non_exhaustive()
	}
}

/// One completion attempt.
pub struct Session {
	id: u64,
	shared: Arc<SessionShared>,
	results: Arc<Mutex<SessionResults>>,
	sink: Arc<SessionSink>,
	receiver: Option<MailboxReceiver<Message>>,
	strategy: ThreadingStrategy,
	invocation_count: u32,
	config: CompletionConfig,
	ranking: RankingPolicy,
	registry: WorkerRegistry,
	prefix_range: TrackedRange,
	initial_prefix: String,
	lookup_shown: bool,
	started: bool,
	live: Option<LiveTicket>,
}

impl Session {
	pub fn new(id: u64, options: SessionOptions, registry: WorkerRegistry, live: &LiveSessions) -> Self {
		let SessionOptions {
			invocation_count,
			strategy,
			config,
			ranking,
		} = options;
		let shared = Arc::new(SessionShared::new(id));
		let results = Arc::new(Mutex::new(SessionResults::new(
			ResultAggregator::new("", ranking.clone()),
			config.middle_match_backlog_threshold,
		)));
		let (sender, receiver) = Mailbox::new(config.queue_capacity.max(1)).split();
		let delegate = match strategy {
			ThreadingStrategy::Synchronous => WeighingDelegate::Sync {
				results: Arc::clone(&results),
				owner: thread::current().id(),
				sender,
			},
			ThreadingStrategy::Asynchronous => WeighingDelegate::Async {
				sender,
				poll: config.checkpoint_poll(),
			},
		};
		let sink = Arc::new(SessionSink::new(Arc::clone(&shared), delegate));
		tracing::debug!(session = id, invocation_count, ?strategy, "completion.session.created");
		Self {
			id,
			shared,
			results,
			sink,
			receiver: Some(receiver),
			strategy,
			invocation_count,
			config,
			ranking,
			registry,
			prefix_range: TrackedRange::new(0..0, 0),
			initial_prefix: String::new(),
			lookup_shown: false,
			started: false,
			live: Some(live.acquire()),
		}
	}

	/// Runs `contributors` against `snapshot` with this session's strategy.
	///
	/// Synchronous sessions return only after every contributor ran.
	/// Asynchronous sessions return once the worker is spawned.
	pub fn start(&mut self, contributors: Vec<Arc<dyn Contributor>>, snapshot: BufferSnapshot) -> Result<FinishHandle> {
		if self.started {
			return Err(CompletionError::AlreadyStarted(self.id));
		}
		self.started = true;

		let prefix = snapshot.prefix();
		self.prefix_range = TrackedRange::new(snapshot.prefix_start()..snapshot.caret(), snapshot.version());
		*self.results.lock() = SessionResults::new(
			ResultAggregator::new(prefix.as_str(), self.ranking.clone()),
			self.config.middle_match_backlog_threshold,
		);
		self.initial_prefix = prefix;
		let params = CompletionParameters::new(snapshot, self.invocation_count, self.shared.token.clone(), self.shared.reads.clone());
		tracing::debug!(
			session = self.id,
			strategy = ?self.strategy,
			prefix = %self.initial_prefix,
			contributors = contributors.len(),
			"completion.session.start"
		);

		match self.strategy {
			ThreadingStrategy::Synchronous => {
				let outcome = run_contributors(&contributors, &params, &*self.sink);
				self.shared.produced.release();
				self.sink.wait_for();
				self.shared.finished.release();
				tracing::debug!(session = self.id, ?outcome, "completion.session.ran_inline");
			}
			ThreadingStrategy::Asynchronous => {
				let id = self.id;
				let name = format!("quill-completion-{id}");
				let worker_name = name.clone();
				let sink = Arc::clone(&self.sink);
				let shared = Arc::clone(&self.shared);
				let registry = self.registry.clone();
				spawn_named_thread(TaskClass::Background, name, move || {
					let registration = registry.enter(worker_name, TaskClass::Background, id);
					let outcome = run_contributors(&contributors, &params, &*sink);
					shared.produced.release();
					if !matches!(outcome, RunOutcome::Interrupted(_)) {
						sink.wait_for();
					}
					drop(registration);
					shared.finished.release();
					tracing::debug!(
						session = id,
						?outcome,
						added = shared.added.load(Ordering::Acquire),
						"completion.session.worker_exit"
					);
				})?;
			}
		}
		Ok(self.finish_handle())
	}

	/// Applies up to `budget` queued messages. Returns how many were taken.
	pub fn pump(&mut self, budget: usize) -> usize {
		let Some(receiver) = &self.receiver else {
			return 0;
		};
		let mut results = self.results.lock();
		let mut taken = 0;
		while taken < budget {
			match receiver.try_recv() {
				Ok(Message::Candidate(candidate)) if self.shared.token.is_cancelled() => {
					tracing::trace!(session = self.id, lookup = candidate.lookup(), "completion.session.discard_cancelled");
				}
				Ok(message) => results.apply_message(message),
				Err(_) => break,
			}
			taken += 1;
		}
		taken
	}

	/// Waits up to `timeout` for contributors to finish, applying their
	/// candidates meanwhile. Returns true if they finished.
	pub fn blocking_wait_for_finish(&mut self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let poll = self.config.checkpoint_poll();
		let budget = self.config.apply_budget;
		loop {
			self.pump(budget);
			if self.shared.finished.is_released() {
				return true;
			}
			let now = Instant::now();
			if now >= deadline {
				tracing::debug!(session = self.id, ?timeout, "completion.session.wait_timed_out");
				return false;
			}
			self.shared.finished.wait_timeout(poll.min(deadline - now));
		}
	}

	/// Applies everything still queued and releases delayed middle matches,
	/// or drops them if the session was cancelled.
	pub fn finish_computation(&mut self) {
		let budget = self.config.apply_budget;
		while self.pump(budget) > 0 {}
		let cancelled = self.shared.token.is_cancelled();
		self.results.lock().finalize(cancelled);
	}

	/// Rebuilds the view if candidates arrived since the last refresh.
	pub fn refresh(&mut self) -> bool {
		self.results.lock().aggregator.refresh()
	}

	pub fn view(&self) -> LookupView {
		self.results.lock().aggregator.view().clone()
	}

	pub fn item_count(&self) -> usize {
		self.results.lock().aggregator.view().item_count()
	}

	pub fn candidate(&self, id: CandidateId) -> Option<Arc<Candidate>> {
		self.results.lock().aggregator.get(id).cloned()
	}

	/// Read access to the aggregator.
	pub fn with_aggregator<R>(&self, f: impl FnOnce(&ResultAggregator) -> R) -> R {
		f(&self.results.lock().aggregator)
	}

	/// Middle matches still held back.
	pub fn delayed_count(&self) -> usize {
		self.results.lock().delayed.len()
	}

	/// Narrows or widens the live prefix.
	pub fn update_prefix(&mut self, prefix: &str, range: TrackedRange) {
		self.results.lock().aggregator.set_prefix(prefix);
		self.prefix_range = range;
	}

	pub fn prefix(&self) -> String {
		self.results.lock().aggregator.prefix().to_string()
	}

	/// Prefix at session start.
	pub fn initial_prefix(&self) -> &str {
		&self.initial_prefix
	}

	/// Span of the prefix in the buffer, pinned to the version it was read at.
	pub fn prefix_range(&self) -> TrackedRange {
		self.prefix_range
	}

	/// Whether a contributor asked for a restart on `prefix`.
	pub fn restart_requested(&self, prefix: &str) -> bool {
		self.shared.restart_patterns.lock().iter().any(|pattern| pattern.is_match(prefix))
	}

	/// Revokes contributor read access after a buffer edit.
	pub fn invalidate_reads(&self) {
		self.shared.reads.invalidate();
	}

	pub fn add_candidate(&self, candidate: Candidate) {
		self.sink.add(candidate);
	}

	pub fn handle(&self) -> SessionHandle {
		SessionHandle {
			shared: Arc::clone(&self.shared),
			sink: Arc::clone(&self.sink),
		}
	}

	pub fn finish_handle(&self) -> FinishHandle {
		FinishHandle {
			latch: self.shared.produced.clone(),
		}
	}

	/// Idempotent; callable any number of times.
	pub fn cancel(&self) {
		if !self.shared.token.is_cancelled() {
			tracing::debug!(session = self.id, "completion.session.cancel");
		}
		self.shared.token.cancel();
	}

	/// Cancels, closes the mailbox, and stops counting as live. Idempotent.
	pub fn dispose(&mut self) {
		let Some(ticket) = self.live.take() else {
			return;
		};
		self.shared.token.cancel();
		if let Some(receiver) = self.receiver.take() {
			receiver.close();
		}
		drop(ticket);
		tracing::debug!(session = self.id, added = self.added_count(), "completion.session.disposed");
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn invocation_count(&self) -> u32 {
		self.invocation_count
	}

	pub fn is_auto(&self) -> bool {
		self.invocation_count == 0
	}

	/// Config copied at construction.
	pub fn config(&self) -> &CompletionConfig {
		&self.config
	}

	pub fn strategy(&self) -> ThreadingStrategy {
		self.strategy
	}

	pub fn is_started(&self) -> bool {
		self.started
	}

	pub fn is_finished(&self) -> bool {
		self.shared.finished.is_released()
	}

	pub fn is_cancelled(&self) -> bool {
		self.shared.token.is_cancelled()
	}

	pub fn is_disposed(&self) -> bool {
		self.live.is_none()
	}

	pub fn added_count(&self) -> u64 {
		self.shared.added.load(Ordering::Acquire)
	}

	pub fn lookup_shown(&self) -> bool {
		self.lookup_shown
	}

	pub(crate) fn mark_lookup_shown(&mut self) {
		self.lookup_shown = true;
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("invocation_count", &self.invocation_count)
			.field("strategy", &self.strategy)
			.field("started", &self.started)
			.field("finished", &self.is_finished())
			.field("cancelled", &self.is_cancelled())
			.field("disposed", &self.is_disposed())
			.field("added", &self.added_count())
			.field("prefix_range", &self.prefix_range)
			.field("lookup_shown", &self.lookup_shown)
			.finish_non_exhaustive()
	}
}
