//! Buffer listeners owned by zombie phases.
//!
//! Listeners live in a slab keyed by session id. Registering one hands out a
//! [`Subscription`], a non-`Clone` capability that [`ListenerArena::release`]
//! consumes, so each registration is released at most once.

use slab::Slab;

use crate::buffer::BufferEvent;

/// Which buffer events fire a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
	/// Edits only; caret movement is ignored.
	Edits,
	/// Any edit or caret movement.
	Any,
}

impl Interest {
	fn fires_on(self, event: &BufferEvent) -> bool {
		match self {
			Self::Edits => event.is_edit(),
			Self::Any => true,
		}
	}
}

#[derive(Debug)]
struct Listener {
	session: u64,
	interest: Interest,
}

/// Capability for one registered listener.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a subscription must be released through its arena"]
pub struct Subscription {
	key: usize,
	session: u64,
}

impl Subscription {
	pub fn session(&self) -> u64 {
		self.session
	}
}

/// Slab of live listeners.
#[derive(Debug, Default)]
pub struct ListenerArena {
	listeners: Slab<Listener>,
}

impl ListenerArena {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&mut self, session: u64, interest: Interest) -> Subscription {
		let key = self.listeners.insert(Listener { session, interest });
		tracing::trace!(session, key, ?interest, "completion.listener.subscribe");
		Subscription { key, session }
	}

	/// Removes the listener behind `subscription`.
	///
	/// Returns false if the slot was already reused by another session, which
	/// leaves that session's listener untouched.
	pub fn release(&mut self, subscription: Subscription) -> bool {
		let owned = self
			.listeners
			.get(subscription.key)
			.is_some_and(|listener| listener.session == subscription.session);
		if owned {
			self.listeners.remove(subscription.key);
			tracing::trace!(session = subscription.session, key = subscription.key, "completion.listener.release");
		}
		owned
	}

	/// Sessions whose listeners fire on `event`.
	pub fn fired_by(&self, event: &BufferEvent) -> Vec<u64> {
		let mut sessions: Vec<u64> = self
			.listeners
			.iter()
			.filter(|(_, listener)| listener.interest.fires_on(event))
			.map(|(_, listener)| listener.session)
			.collect();
		sessions.sort_unstable();
		sessions.dedup();
		sessions
	}

	pub fn len(&self) -> usize {
		self.listeners.len()
	}

	pub fn is_empty(&self) -> bool {
		self.listeners.is_empty()
	}
}
