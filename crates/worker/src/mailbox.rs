//! Bounded blocking mailbox.
//!
//! Producers on worker threads [`MailboxSender::send`] into a FIFO queue of
//! fixed capacity; the interactive thread pulls with
//! [`MailboxReceiver::try_recv`] or [`MailboxReceiver::recv_timeout`]. A full
//! queue applies backpressure to the sender instead of dropping messages.
//! Closing wakes every blocked party: senders fail with
//! [`MailboxSendError::Closed`], receivers drain what is already queued and
//! then observe [`MailboxRecvError::Closed`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Mailbox send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSendError {
	/// Mailbox is closed.
	Closed,
	/// Queue is full and non-blocking send was used.
	Full,
}

/// Mailbox receive error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxRecvError {
	/// Nothing queued right now.
	Empty,
	/// Nothing arrived before the deadline.
	Timeout,
	/// Mailbox is closed and fully drained.
	Closed,
}

struct MailboxState<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct MailboxInner<T> {
	capacity: usize,
	state: Mutex<MailboxState<T>>,
	not_empty: Condvar,
	not_full: Condvar,
}

impl<T> MailboxInner<T> {
	fn close(&self) {
		let mut state = self.state.lock();
		state.closed = true;
		drop(state);
		self.not_empty.notify_all();
		self.not_full.notify_all();
	}
}

/// Multi-producer mailbox sender.
pub struct MailboxSender<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Mailbox receiver.
pub struct MailboxReceiver<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Bounded mailbox handing out sender and receiver halves.
pub struct Mailbox<T> {
	inner: Arc<MailboxInner<T>>,
}

impl<T> Clone for MailboxSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Mailbox<T> {
	/// Creates a bounded mailbox.
	///
	/// # Panics
	///
	/// Panics if `capacity` is zero.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "mailbox capacity must be > 0");
		Self {
			inner: Arc::new(MailboxInner {
				capacity,
				state: Mutex::new(MailboxState {
					queue: VecDeque::with_capacity(capacity.min(256)),
					closed: false,
				}),
				not_empty: Condvar::new(),
				not_full: Condvar::new(),
			}),
		}
	}

	/// Returns a sender handle.
	pub fn sender(&self) -> MailboxSender<T> {
		MailboxSender {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Returns a receiver handle.
	pub fn receiver(&self) -> MailboxReceiver<T> {
		MailboxReceiver {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Splits the mailbox into its two halves.
	pub fn split(self) -> (MailboxSender<T>, MailboxReceiver<T>) {
		(self.sender(), self.receiver())
	}
}

impl<T> MailboxSender<T> {
	/// Enqueues `msg`, waiting for capacity while the queue is full.
	pub fn send(&self, msg: T) -> Result<(), MailboxSendError> {
		let mut state = self.inner.state.lock();
		loop {
			if state.closed {
				return Err(MailboxSendError::Closed);
			}
			if state.queue.len() < self.inner.capacity {
				state.queue.push_back(msg);
				drop(state);
				self.inner.not_empty.notify_one();
				return Ok(());
			}
			self.inner.not_full.wait(&mut state);
		}
	}

	/// Non-blocking enqueue.
	pub fn try_send(&self, msg: T) -> Result<(), MailboxSendError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(MailboxSendError::Closed);
		}
		if state.queue.len() >= self.inner.capacity {
			return Err(MailboxSendError::Full);
		}
		state.queue.push_back(msg);
		drop(state);
		self.inner.not_empty.notify_one();
		Ok(())
	}

	/// Closes the mailbox. Idempotent.
	pub fn close(&self) {
		self.inner.close();
	}

	/// Returns true once the mailbox has been closed.
	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}
}

impl<T> MailboxReceiver<T> {
	/// Pops the oldest queued message without waiting.
	pub fn try_recv(&self) -> Result<T, MailboxRecvError> {
		let mut state = self.inner.state.lock();
		match state.queue.pop_front() {
			Some(msg) => {
				drop(state);
				self.inner.not_full.notify_one();
				Ok(msg)
			}
			None if state.closed => Err(MailboxRecvError::Closed),
			None => Err(MailboxRecvError::Empty),
		}
	}

	/// Pops the oldest queued message, waiting at most `timeout` for one.
	pub fn recv_timeout(&self, timeout: Duration) -> Result<T, MailboxRecvError> {
		let deadline = Instant::now() + timeout;
		let mut state = self.inner.state.lock();
		loop {
			if let Some(msg) = state.queue.pop_front() {
				drop(state);
				self.inner.not_full.notify_one();
				return Ok(msg);
			}
			if state.closed {
				return Err(MailboxRecvError::Closed);
			}
			if self.inner.not_empty.wait_until(&mut state, deadline).timed_out() {
				return match state.queue.pop_front() {
					Some(msg) => {
						drop(state);
						self.inner.not_full.notify_one();
						Ok(msg)
					}
					None if state.closed => Err(MailboxRecvError::Closed),
					None => Err(MailboxRecvError::Timeout),
				};
			}
		}
	}

	/// Closes the mailbox from the receiving side. Idempotent.
	pub fn close(&self) {
		self.inner.close();
	}

	/// Returns current queue length.
	pub fn len(&self) -> usize {
		self.inner.state.lock().queue.len()
	}

	/// Returns true when nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
