//! Completion phases.
//!
//! [`Phase`] is the single host-wide value describing what completion is
//! doing. Session-owning variants hold the [`Session`] directly, so replacing
//! the phase is what disposes a session. The two zombie variants outlive their
//! session and keep just enough state to react to the next trigger.

use crate::buffer::{EditorSurface, TrackedRange};
use crate::error::EditError;
use crate::listeners::Subscription;
use crate::session::Session;

/// Discriminant of [`Phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
	Idle,
	PreparingBuffer,
	Computing,
	Computed,
	Synchronous,
	SinglePendingInsertion,
	EmptyResultHint,
}

impl PhaseKind {
	pub const fn owns_session(self) -> bool {
		matches!(self, Self::PreparingBuffer | Self::Computing | Self::Computed | Self::Synchronous)
	}

	pub const fn is_zombie(self) -> bool {
		matches!(self, Self::SinglePendingInsertion | Self::EmptyResultHint)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::PreparingBuffer => "preparing_buffer",
			Self::Computing => "computing",
			Self::Computed => "computed",
			Self::Synchronous => "synchronous",
			Self::SinglePendingInsertion => "single_pending_insertion",
			Self::EmptyResultHint => "empty_result_hint",
		}
	}
}

/// Undo information for an auto-inserted candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePrefix {
	inserted: TrackedRange,
	original: String,
}

impl RestorePrefix {
	pub fn new(inserted: TrackedRange, original: impl Into<String>) -> Self {
		Self {
			inserted,
			original: original.into(),
		}
	}

	pub fn inserted(&self) -> TrackedRange {
		self.inserted
	}

	pub fn original(&self) -> &str {
		&self.original
	}

	/// True while nothing edited the buffer since the insertion.
	pub fn is_intact(&self, version: u64) -> bool {
		self.inserted.is_valid(version)
	}

	/// Replaces the inserted text with the original prefix.
	///
	/// Returns `Ok(false)` without touching the buffer if the insertion is no
	/// longer intact.
	pub fn apply(&self, editor: &mut dyn EditorSurface) -> Result<bool, EditError> {
		if !self.is_intact(editor.version()) {
			return Ok(false);
		}
		editor.replace(self.inserted.range(), &self.original)?;
		editor.set_caret(self.inserted.start() + self.original.chars().count());
		Ok(true)
	}
}

/// State a zombie phase keeps after its session is gone.
#[derive(Debug)]
pub struct ZombieState {
	session: u64,
	invocation_count: u32,
	subscription: Option<Subscription>,
	restore: Option<RestorePrefix>,
}

impl ZombieState {
	pub fn new(session: &Session) -> Self {
		Self {
			session: session.id(),
			invocation_count: session.invocation_count(),
			subscription: None,
			restore: None,
		}
	}

	pub fn with_subscription(mut self, subscription: Subscription) -> Self {
		self.subscription = Some(subscription);
		self
	}

	pub fn with_restore(mut self, restore: RestorePrefix) -> Self {
		self.restore = Some(restore);
		self
	}

	pub fn session(&self) -> u64 {
		self.session
	}

	pub fn invocation_count(&self) -> u32 {
		self.invocation_count
	}

	pub fn is_auto(&self) -> bool {
		self.invocation_count == 0
	}

	pub fn restore(&self) -> Option<&RestorePrefix> {
		self.restore.as_ref()
	}

	pub(crate) fn take_subscription(&mut self) -> Option<Subscription> {
		self.subscription.take()
	}
}

/// What a new trigger does to the active phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
	/// Nothing to tear down; use the requested invocation count.
	PassThrough(u32),
	/// Dispose the active phase and start with the given count.
	Replace(u32),
	/// Undo the auto-insertion, then replace.
	RestoreAndReplace(u32),
	/// The active phase refuses new triggers.
	Reject,
}

/// Next invocation count for a new trigger.
///
/// A repeated explicit trigger widens the scope: at least 2, and always one
/// more than the active count.
pub fn next_invocation_count(current: u32, time: u32, repeated: bool) -> u32 {
	if repeated { current.saturating_add(1).max(2) } else { time }
}

/// Host-wide completion phase.
#[derive(Debug, Default)]
pub enum Phase {
	#[default]
	Idle,
	/// The buffer commit is pending.
	PreparingBuffer(Session),
	/// Contributors run in the background.
	Computing(Session),
	/// Contributors finished; the lookup is visible.
	Computed(Session),
	/// The interactive thread is running or waiting for contributors.
	Synchronous(Session),
	/// A single candidate was inserted; further typing can still undo it.
	SinglePendingInsertion(ZombieState),
	/// Nothing was found; the hint is visible.
	EmptyResultHint(ZombieState),
}

impl Phase {
	pub fn kind(&self) -> PhaseKind {
		match self {
			Self::Idle => PhaseKind::Idle,
			Self::PreparingBuffer(_) => PhaseKind::PreparingBuffer,
			Self::Computing(_) => PhaseKind::Computing,
			Self::Computed(_) => PhaseKind::Computed,
			Self::Synchronous(_) => PhaseKind::Synchronous,
			Self::SinglePendingInsertion(_) => PhaseKind::SinglePendingInsertion,
			Self::EmptyResultHint(_) => PhaseKind::EmptyResultHint,
		}
	}

	pub fn session(&self) -> Option<&Session> {
		match self {
			Self::PreparingBuffer(s) | Self::Computing(s) | Self::Computed(s) | Self::Synchronous(s) => Some(s),
			_ => None,
		}
	}

	pub fn session_mut(&mut self) -> Option<&mut Session> {
		match self {
			Self::PreparingBuffer(s) | Self::Computing(s) | Self::Computed(s) | Self::Synchronous(s) => Some(s),
			_ => None,
		}
	}

	pub fn into_session(self) -> Option<Session> {
		match self {
			Self::PreparingBuffer(s) | Self::Computing(s) | Self::Computed(s) | Self::Synchronous(s) => Some(s),
			_ => None,
		}
	}

	pub fn zombie(&self) -> Option<&ZombieState> {
		match self {
			Self::SinglePendingInsertion(z) | Self::EmptyResultHint(z) => Some(z),
			_ => None,
		}
	}

	/// Wraps `session` in the session-owning variant `kind`.
	///
	/// Returns the session back if `kind` does not own one.
	pub fn with_session(kind: PhaseKind, session: Session) -> Result<Self, Session> {
		match kind {
			PhaseKind::PreparingBuffer => Ok(Self::PreparingBuffer(session)),
			PhaseKind::Computing => Ok(Self::Computing(session)),
			PhaseKind::Computed => Ok(Self::Computed(session)),
			PhaseKind::Synchronous => Ok(Self::Synchronous(session)),
			_ => Err(session),
		}
	}

	/// Whether the phase belongs to an explicit invocation or showed a
	/// lookup; a new explicit trigger on top of it counts as a repeat.
	pub fn is_explicit_or_shown(&self) -> bool {
		match self {
			Self::Idle => false,
			Self::PreparingBuffer(s) | Self::Computing(s) | Self::Computed(s) | Self::Synchronous(s) => {
				!s.is_auto() || s.lookup_shown()
			}
			Self::SinglePendingInsertion(z) | Self::EmptyResultHint(z) => !z.is_auto(),
		}
	}

	/// How a new trigger merges with this phase.
	///
	/// `time` is the requested invocation count and `version` the current
	/// buffer version.
	pub fn trigger_action(&self, time: u32, repeated: bool, version: u64) -> TriggerAction {
		match self {
			Self::Idle => TriggerAction::PassThrough(time),
			Self::PreparingBuffer(s) | Self::Computing(s) | Self::Computed(s) => {
				TriggerAction::Replace(next_invocation_count(s.invocation_count(), time, repeated))
			}
			Self::Synchronous(_) => TriggerAction::Reject,
			Self::SinglePendingInsertion(z) => match z.restore() {
				Some(restore) if repeated && restore.is_intact(version) => {
					TriggerAction::RestoreAndReplace(next_invocation_count(z.invocation_count(), time, repeated))
				}
				_ => TriggerAction::PassThrough(time),
			},
			Self::EmptyResultHint(z) => TriggerAction::Replace(next_invocation_count(z.invocation_count(), time, repeated)),
		}
	}
}
