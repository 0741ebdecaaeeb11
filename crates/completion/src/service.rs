//! Trigger API and the interactive-thread loop.
//!
//! A [`CompletionService`] lives on the interactive thread and owns the
//! [`PhaseCell`]. Hosts call [`CompletionService::invoke`] on triggers,
//! forward buffer changes through [`CompletionService::buffer_changed`], and
//! call [`CompletionService::tick`] once per UI update so background results
//! reach the aggregator and the lookup is refreshed at most once per tick.

use std::sync::Arc;

use quill_worker::{GenerationClock, WorkerRegistry};

use crate::buffer::{BufferEvent, CommitState, EditorSurface, TrackedRange, is_identifier_char};
use crate::candidate::{Candidate, CandidateId};
use crate::config::CompletionConfig;
use crate::contributor::Contributor;
use crate::error::{CompletionError, Result};
use crate::listeners::Interest;
use crate::phase::{Phase, PhaseKind, RestorePrefix, ZombieState};
use crate::presentation::{LookupView, Presentation};
use crate::ranking::RankingPolicy;
use crate::session::{LiveSessions, Session, SessionOptions};
use crate::state::{PhaseCell, PhaseWatch, TriggerDecision};
use crate::threading::ThreadingStrategy;

/// Hint shown when an explicit invocation finds nothing.
pub const NO_SUGGESTIONS: &str = "No suggestions";

/// How the interactive thread treats a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
	/// Wait briefly for a first result before showing "calculating".
	Blocking { modifiers: bool },
	/// Never block; results stream in through `tick`.
	Background,
}

/// The completion engine for one editing surface.
pub struct CompletionService {
	config: CompletionConfig,
	contributors: Vec<Arc<dyn Contributor>>,
	ranking: RankingPolicy,
	presentation: Box<dyn Presentation>,
	cell: PhaseCell,
	clock: GenerationClock,
	registry: WorkerRegistry,
	live: LiveSessions,
	deferred: Option<StartMode>,
}

impl CompletionService {
	pub fn new(config: CompletionConfig, presentation: Box<dyn Presentation>) -> Self {
		Self {
			config: config.validated(),
			contributors: Vec::new(),
			ranking: RankingPolicy::default(),
			presentation,
			cell: PhaseCell::new(),
			clock: GenerationClock::new(),
			registry: WorkerRegistry::new(),
			live: LiveSessions::new(),
			deferred: None,
		}
	}

	pub fn with_contributor(mut self, contributor: Arc<dyn Contributor>) -> Self {
		self.contributors.push(contributor);
		self
	}

	pub fn with_ranking(mut self, ranking: RankingPolicy) -> Self {
		self.ranking = ranking;
		self
	}

	/// Takes effect from the next session.
	pub fn set_config(&mut self, config: CompletionConfig) {
		self.config = config.validated();
	}

	pub fn config(&self) -> &CompletionConfig {
		&self.config
	}

	pub fn phase(&self) -> PhaseKind {
		self.cell.kind()
	}

	pub fn current(&self) -> &Phase {
		self.cell.current()
	}

	pub fn session(&self) -> Option<&Session> {
		self.cell.current().session()
	}

	pub fn watch(&self) -> PhaseWatch {
		self.cell.watch()
	}

	/// Lookup contents of the active session.
	pub fn view(&self) -> Option<LookupView> {
		self.session().map(Session::view)
	}

	/// Sessions constructed and not yet disposed.
	pub fn live_sessions(&self) -> usize {
		self.live.count()
	}

	pub fn workers(&self) -> &WorkerRegistry {
		&self.registry
	}

	pub fn listener_count(&self) -> usize {
		self.cell.listener_count()
	}

	/// Starts completion at the caret.
	///
	/// `invocation_count` 0 is an auto-popup; 1 and up are explicit. An
	/// explicit invocation on top of an explicit or visible session is a
	/// repeat and widens the count.
	pub fn invoke(&mut self, editor: &mut dyn EditorSurface, invocation_count: u32, has_modifier_keys: bool) -> Result<PhaseKind> {
		let previous = self.cell.kind();
		let repeated = invocation_count > 0 && self.cell.current().is_explicit_or_shown();
		let count = match self.cell.new_completion_started(editor, invocation_count, repeated) {
			TriggerDecision::Proceed(count) => count,
			TriggerDecision::Rejected => return Err(CompletionError::Rejected { phase: previous }),
		};
		if previous == PhaseKind::EmptyResultHint {
			self.presentation.hide_hint();
		}
		if previous.owns_session() {
			self.presentation.hide();
		}
		tracing::debug!(
			previous = previous.as_str(),
			invocation_count = count,
			repeated,
			has_modifier_keys,
			"completion.invoke"
		);
		let mode = if count == 0 {
			StartMode::Background
		} else {
			StartMode::Blocking {
				modifiers: has_modifier_keys,
			}
		};
		self.start_session(editor, count, mode)
	}

	/// Continues a session whose buffer commit was deferred.
	pub fn buffer_committed(&mut self, editor: &mut dyn EditorSurface) -> Result<PhaseKind> {
		if self.cell.kind() != PhaseKind::PreparingBuffer {
			return Ok(self.cell.kind());
		}
		let mode = self.deferred.take().unwrap_or(StartMode::Background);
		self.begin_computation(editor, mode)
	}

	/// Applies queued background results and refreshes the lookup.
	///
	/// A session cancelled through its handle closes the lookup here.
	pub fn tick(&mut self, editor: &mut dyn EditorSurface) -> Result<PhaseKind> {
		let kind = self.cell.kind();
		if !matches!(kind, PhaseKind::Computing | PhaseKind::Computed) {
			return Ok(kind);
		}
		let budget = self.config.apply_budget;
		let Some(session) = self.cell.current_mut().session_mut() else {
			return Err(CompletionError::NoSession);
		};
		if session.is_cancelled() {
			tracing::debug!(session = session.id(), ?kind, "completion.session.cancelled_externally");
			self.close();
			return Ok(PhaseKind::Idle);
		}
		session.pump(budget);
		if kind == PhaseKind::Computed {
			// Late candidates from handles on other threads.
			if session.refresh() {
				self.present(false);
			}
			return Ok(PhaseKind::Computed);
		}
		if session.is_finished() {
			return self.on_finished(editor);
		}
		if session.refresh() {
			self.present(true);
		}
		Ok(PhaseKind::Computing)
	}

	/// Inserts item `id` of the lookup and ends the session.
	///
	/// `terminator` is appended unless the inserted text already ends with it.
	pub fn select_item(&mut self, editor: &mut dyn EditorSurface, id: CandidateId, terminator: Option<char>) -> Result<()> {
		if !matches!(self.cell.kind(), PhaseKind::Computed | PhaseKind::Computing) {
			return Err(CompletionError::NoSession);
		}
		let Some(session) = self.cell.current().session() else {
			return Err(CompletionError::NoSession);
		};
		let candidate = session
			.view()
			.items()
			.find(|(item, _)| *item == id)
			.map(|(_, candidate)| Arc::clone(candidate))
			.ok_or(CompletionError::NoSuchItem(id))?;
		let session_id = session.id();

		match insert_candidate(editor, session.prefix_range(), &candidate, terminator) {
			Ok(_) => {
				self.ranking.usage.record(candidate.lookup());
				tracing::debug!(session = session_id, lookup = candidate.lookup(), ?terminator, "completion.select");
				self.close();
				Ok(())
			}
			Err(CompletionError::Stale) => {
				tracing::warn!(session = session_id, "completion.select.stale");
				self.close();
				Err(CompletionError::Stale)
			}
			Err(error) => {
				tracing::warn!(session = session_id, %error, "completion.select.failed");
				Err(error)
			}
		}
	}

	/// Closes whatever completion is showing or computing.
	pub fn cancel(&mut self) {
		if self.cell.kind() != PhaseKind::Idle {
			tracing::debug!(phase = self.cell.kind().as_str(), "completion.cancel");
			self.close();
		}
	}

	/// Reacts to a buffer change the host already applied.
	pub fn buffer_changed(&mut self, editor: &mut dyn EditorSurface, event: BufferEvent) -> Result<PhaseKind> {
		if self.cell.dispatch(&event) {
			tracing::debug!(phase = self.cell.kind().as_str(), ?event, "completion.zombie.dismissed");
			self.close();
			return Ok(PhaseKind::Idle);
		}
		match self.cell.kind() {
			PhaseKind::Computing => self.on_edit_while_computing(editor, event),
			PhaseKind::Computed => self.on_edit_while_shown(editor, event),
			kind => Ok(kind),
		}
	}

	fn start_session(&mut self, editor: &mut dyn EditorSurface, invocation_count: u32, mode: StartMode) -> Result<PhaseKind> {
		let options = SessionOptions {
			invocation_count,
			strategy: ThreadingStrategy::for_write_access(editor.has_write_access()),
			config: self.config.clone(),
			ranking: self.ranking.clone(),
		};
		let session = Session::new(self.clock.next(), options, self.registry.clone(), &self.live);
		self.cell.set(Phase::PreparingBuffer(session));
		self.deferred = None;
		match editor.commit() {
			CommitState::Deferred => {
				tracing::debug!("completion.commit_deferred");
				self.deferred = Some(mode);
				Ok(PhaseKind::PreparingBuffer)
			}
			CommitState::Committed => self.begin_computation(editor, mode),
		}
	}

	fn begin_computation(&mut self, editor: &mut dyn EditorSurface, mode: StartMode) -> Result<PhaseKind> {
		self.cell.assert_phase(&[PhaseKind::PreparingBuffer])?;
		let inline = self.session().is_some_and(|s| s.strategy() == ThreadingStrategy::Synchronous);
		let blocking = inline || matches!(mode, StartMode::Blocking { .. });
		self.cell.promote(if blocking { PhaseKind::Synchronous } else { PhaseKind::Computing })?;

		let contributors = self.contributors.clone();
		let snapshot = editor.snapshot();
		let Some(session) = self.cell.current_mut().session_mut() else {
			return Err(CompletionError::NoSession);
		};
		if let Err(error) = session.start(contributors, snapshot) {
			tracing::warn!(%error, "completion.start_failed");
			self.close();
			return Err(error);
		}
		if !blocking {
			self.present(true);
			return Ok(PhaseKind::Computing);
		}

		let wait = match mode {
			StartMode::Blocking { modifiers: true } => session.config().auto_insert_timeout(),
			_ => session.config().sync_attempt_grouping_time(),
		};
		if session.blocking_wait_for_finish(wait) {
			return self.on_finished(editor);
		}
		self.cell.promote(PhaseKind::Computing)?;
		if let Some(session) = self.cell.current_mut().session_mut() {
			session.refresh();
		}
		self.present(true);
		Ok(PhaseKind::Computing)
	}

	fn on_finished(&mut self, editor: &mut dyn EditorSurface) -> Result<PhaseKind> {
		self.cell.assert_phase(&[PhaseKind::Computing, PhaseKind::Synchronous])?;
		let Some(session) = self.cell.current_mut().session_mut() else {
			return Err(CompletionError::NoSession);
		};
		if session.is_cancelled() {
			tracing::debug!(session = session.id(), "completion.session.cancelled_externally");
			self.close();
			return Ok(PhaseKind::Idle);
		}
		session.finish_computation();
		let view = session.view();
		tracing::debug!(
			session = session.id(),
			items = view.item_count(),
			added = session.added_count(),
			"completion.session.finished"
		);

		if view.is_empty() {
			self.presentation.hide();
			if session.is_auto() {
				self.cell.set(Phase::Idle);
				return Ok(PhaseKind::Idle);
			}
			let zombie = ZombieState::new(session);
			let subscription = self.cell.subscribe(zombie.session(), Interest::Any);
			self.cell.set(Phase::EmptyResultHint(zombie.with_subscription(subscription)));
			self.presentation.show_hint(NO_SUGGESTIONS);
			return Ok(PhaseKind::EmptyResultHint);
		}

		let single = view.item_count() == 1 && !session.is_auto() && session.config().auto_insert_single && !session.lookup_shown();
		if let Some((_, candidate)) = view.items().next().filter(|_| single) {
			let range = session.prefix_range();
			let original = editor.slice(range.range()).unwrap_or_else(|| session.initial_prefix().to_string());
			let zombie = ZombieState::new(session);
			match insert_candidate(editor, range, candidate, None) {
				Ok(inserted) => {
					self.ranking.usage.record(candidate.lookup());
					self.presentation.hide();
					let subscription = self.cell.subscribe(zombie.session(), Interest::Edits);
					self.cell.set(Phase::SinglePendingInsertion(
						zombie.with_subscription(subscription).with_restore(RestorePrefix::new(inserted, original)),
					));
					return Ok(PhaseKind::SinglePendingInsertion);
				}
				Err(error) => {
					tracing::warn!(%error, "completion.auto_insert_failed");
				}
			}
		}

		self.cell.promote(PhaseKind::Computed)?;
		self.present(false);
		Ok(PhaseKind::Computed)
	}

	fn on_edit_while_computing(&mut self, editor: &mut dyn EditorSurface, event: BufferEvent) -> Result<PhaseKind> {
		let Some(session) = self.cell.current().session() else {
			return Err(CompletionError::NoSession);
		};
		if !event.is_edit() {
			self.close();
			return Ok(PhaseKind::Idle);
		}
		session.invalidate_reads();
		let count = session.invocation_count();
		match current_prefix(editor, session.prefix_range().start()) {
			Some(_) => {
				tracing::warn!(session = session.id(), ?event, "completion.session.stale_restart");
				self.restart(editor, count)
			}
			None => {
				self.close();
				Ok(PhaseKind::Idle)
			}
		}
	}

	fn on_edit_while_shown(&mut self, editor: &mut dyn EditorSurface, event: BufferEvent) -> Result<PhaseKind> {
		let closes = match event {
			BufferEvent::CaretMoved => true,
			BufferEvent::Typed(c) => !is_identifier_char(c),
			BufferEvent::Deleted | BufferEvent::Edited => false,
		};
		let Some(session) = self.cell.current_mut().session_mut() else {
			return Err(CompletionError::NoSession);
		};
		let start = session.prefix_range().start();
		let prefix = if closes { None } else { current_prefix(editor, start) };
		let Some(prefix) = prefix else {
			self.close();
			return Ok(PhaseKind::Idle);
		};

		let narrower_than_start = prefix.chars().count() < session.initial_prefix().chars().count();
		if narrower_than_start || session.restart_requested(&prefix) {
			let count = session.invocation_count();
			tracing::debug!(session = session.id(), prefix = %prefix, "completion.session.restart_on_prefix");
			return self.restart(editor, count);
		}

		session.update_prefix(&prefix, TrackedRange::new(start..editor.caret(), editor.version()));
		session.refresh();
		if session.item_count() == 0 {
			self.close();
			return Ok(PhaseKind::Idle);
		}
		self.present(false);
		Ok(PhaseKind::Computed)
	}

	/// Replaces the active session with a fresh one at the same count.
	fn restart(&mut self, editor: &mut dyn EditorSurface, invocation_count: u32) -> Result<PhaseKind> {
		self.cell.set(Phase::Idle);
		self.start_session(editor, invocation_count, StartMode::Background)
	}

	fn present(&mut self, calculating: bool) {
		let Some(session) = self.cell.current_mut().session_mut() else {
			return;
		};
		let view = session.view();
		if view.is_empty() && !(calculating && session.config().show_empty_while_computing) {
			return;
		}
		self.presentation.show(&view, calculating);
		session.mark_lookup_shown();
	}

	fn close(&mut self) {
		self.presentation.hide();
		if self.cell.kind() == PhaseKind::EmptyResultHint {
			self.presentation.hide_hint();
		}
		self.cell.set(Phase::Idle);
		self.deferred = None;
	}
}

impl Drop for CompletionService {
	fn drop(&mut self) {
		self.cell.set(Phase::Idle);
	}
}

/// Identifier text from `start` to the caret, if the caret has not moved
/// before `start` and only identifier chars were typed.
fn current_prefix(editor: &dyn EditorSurface, start: usize) -> Option<String> {
	let caret = editor.caret();
	if caret < start {
		return None;
	}
	editor.slice(start..caret).filter(|text| text.chars().all(is_identifier_char))
}

/// Replaces `range` with the candidate's insert text and places the caret.
fn insert_candidate(
	editor: &mut dyn EditorSurface,
	range: TrackedRange,
	candidate: &Candidate,
	terminator: Option<char>,
) -> Result<TrackedRange> {
	if !range.is_valid(editor.version()) {
		return Err(CompletionError::Stale);
	}
	let mut text = candidate.insert_text().to_string();
	if let Some(terminator) = terminator
		&& !text.ends_with(terminator)
	{
		text.push(terminator);
	}
	let version = editor.replace(range.range(), &text)?;
	let len = text.chars().count();
	let caret = candidate.insert_behavior().caret().map_or(len, |offset| offset.min(len));
	editor.set_caret(range.start() + caret);
	Ok(TrackedRange::new(range.start()..range.start() + len, version))
}
