//! The single-writer phase slot.
//!
//! [`PhaseCell`] is owned by the interactive thread and is the only place a
//! [`Phase`] is ever replaced. Replacing a phase disposes whatever it owned:
//! the session of a session-owning variant, or the listener of a zombie.
//! Other threads observe the slot through a [`PhaseWatch`].

use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::{BufferEvent, EditorSurface};
use crate::error::{CompletionError, Result};
use crate::listeners::{Interest, ListenerArena, Subscription};
use crate::phase::{Phase, PhaseKind, TriggerAction};

/// Point-in-time view of the phase slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSnapshot {
	pub kind: PhaseKind,
	/// Session owned by the phase, if any.
	pub session: Option<u64>,
	/// Number of phase replacements so far.
	pub transitions: u64,
}

impl Default for PhaseSnapshot {
	fn default() -> Self {
		Self {
			kind: PhaseKind::Idle,
			session: None,
			transitions: 0,
		}
	}
}

/// Read-only observer of a [`PhaseCell`], usable from any thread.
#[derive(Debug, Clone, Default)]
pub struct PhaseWatch {
	inner: Arc<RwLock<PhaseSnapshot>>,
}

impl PhaseWatch {
	pub fn get(&self) -> PhaseSnapshot {
		*self.inner.read()
	}

	pub fn kind(&self) -> PhaseKind {
		self.inner.read().kind
	}

	fn publish(&self, phase: &Phase) {
		let mut snapshot = self.inner.write();
		snapshot.kind = phase.kind();
		snapshot.session = phase.session().map(|s| s.id()).or_else(|| phase.zombie().map(|z| z.session()));
		snapshot.transitions += 1;
	}
}

/// Outcome of [`PhaseCell::new_completion_started`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
	/// Start a session with this invocation count.
	Proceed(u32),
	Rejected,
}

/// Owner of the host-wide [`Phase`].
#[derive(Debug, Default)]
pub struct PhaseCell {
	phase: Phase,
	listeners: ListenerArena,
	watch: PhaseWatch,
}

impl PhaseCell {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn current(&self) -> &Phase {
		&self.phase
	}

	pub fn current_mut(&mut self) -> &mut Phase {
		&mut self.phase
	}

	pub fn kind(&self) -> PhaseKind {
		self.phase.kind()
	}

	pub fn watch(&self) -> PhaseWatch {
		self.watch.clone()
	}

	/// Number of live zombie listeners.
	pub fn listener_count(&self) -> usize {
		self.listeners.len()
	}

	/// Replaces the active phase, disposing the previous one.
	pub fn set(&mut self, next: Phase) {
		let from = self.phase.kind();
		let to = next.kind();
		let old = std::mem::replace(&mut self.phase, next);
		self.dispose(old);
		self.watch.publish(&self.phase);
		tracing::debug!(from = from.as_str(), to = to.as_str(), "completion.phase.set");
	}

	/// Moves the active session into the session-owning variant `to`.
	pub fn promote(&mut self, to: PhaseKind) -> Result<()> {
		let from = self.phase.kind();
		if !from.owns_session() || !to.owns_session() {
			return self.violation(&[PhaseKind::PreparingBuffer, PhaseKind::Computing, PhaseKind::Computed, PhaseKind::Synchronous]);
		}
		let Some(session) = std::mem::take(&mut self.phase).into_session() else {
			return self.violation(&[from]);
		};
		match Phase::with_session(to, session) {
			Ok(phase) => self.phase = phase,
			Err(mut session) => {
				session.dispose();
				return self.violation(&[from]);
			}
		}
		self.watch.publish(&self.phase);
		tracing::debug!(from = from.as_str(), to = to.as_str(), "completion.phase.promote");
		Ok(())
	}

	/// Checks the active phase; on mismatch, logs the slot and resets it.
	pub fn assert_phase(&mut self, expected: &[PhaseKind]) -> Result<()> {
		if expected.contains(&self.phase.kind()) { Ok(()) } else { self.violation(expected) }
	}

	fn violation(&mut self, expected: &[PhaseKind]) -> Result<()> {
		let actual = self.phase.kind();
		tracing::error!(
			?expected,
			actual = actual.as_str(),
			phase = ?self.phase,
			listeners = self.listeners.len(),
			"completion.phase.protocol_violation"
		);
		self.set(Phase::Idle);
		Err(CompletionError::ProtocolViolation {
			expected: expected.to_vec(),
			actual,
		})
	}

	/// Registers a zombie listener for `session`.
	pub fn subscribe(&mut self, session: u64, interest: Interest) -> Subscription {
		self.listeners.subscribe(session, interest)
	}

	/// Whether `event` fires the active zombie's listener.
	pub fn dispatch(&self, event: &BufferEvent) -> bool {
		match self.phase.zombie() {
			Some(zombie) => self.listeners.fired_by(event).contains(&zombie.session()),
			None => false,
		}
	}

	/// Merges a new trigger with the active phase.
	///
	/// Tears the active phase down when the trigger replaces it. A pending
	/// single insertion that is still intact is undone first, so the next
	/// session sees the original prefix.
	pub fn new_completion_started(&mut self, editor: &mut dyn EditorSurface, time: u32, repeated: bool) -> TriggerDecision {
		let action = self.phase.trigger_action(time, repeated, editor.version());
		tracing::debug!(phase = self.phase.kind().as_str(), time, repeated, ?action, "completion.phase.new_trigger");
		match action {
			TriggerAction::PassThrough(count) => {
				if self.phase.kind() != PhaseKind::Idle {
					self.set(Phase::Idle);
				}
				TriggerDecision::Proceed(count)
			}
			TriggerAction::Replace(count) => {
				self.set(Phase::Idle);
				TriggerDecision::Proceed(count)
			}
			TriggerAction::RestoreAndReplace(count) => {
				if let Some(restore) = self.phase.zombie().and_then(|z| z.restore()) {
					match restore.apply(editor) {
						Ok(restored) => tracing::debug!(restored, "completion.phase.restore_prefix"),
						Err(error) => tracing::warn!(%error, "completion.phase.restore_prefix_failed"),
					}
				}
				self.set(Phase::Idle);
				TriggerDecision::Proceed(count)
			}
			TriggerAction::Reject => TriggerDecision::Rejected,
		}
	}

	fn dispose(&mut self, old: Phase) {
		match old {
			Phase::Idle => {}
			Phase::PreparingBuffer(mut session)
			| Phase::Computing(mut session)
			| Phase::Computed(mut session)
			| Phase::Synchronous(mut session) => session.dispose(),
			Phase::SinglePendingInsertion(mut zombie) | Phase::EmptyResultHint(mut zombie) => {
				if let Some(subscription) = zombie.take_subscription() {
					self.listeners.release(subscription);
				}
			}
		}
	}
}
