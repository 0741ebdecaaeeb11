//! Editor-side contracts the engine talks to.
//!
//! The engine never owns a buffer. It reads through [`EditorSurface`], takes
//! immutable [`BufferSnapshot`]s for contributors, and detects stale state by
//! comparing buffer versions: every edit bumps the version, so a
//! [`TrackedRange`] recorded at one version stops being valid as soon as
//! anything changes.
//!
//! [`MemoryEditor`] is a rope-backed surface suitable for headless hosts.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ropey::Rope;

use crate::error::EditError;

/// Characters that extend a completion prefix.
pub fn is_identifier_char(c: char) -> bool {
	c.is_alphanumeric() || c == '_'
}

/// Immutable view of the buffer at one version.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
	text: Rope,
	version: u64,
	caret: usize,
}

impl BufferSnapshot {
	pub fn new(text: Rope, version: u64, caret: usize) -> Self {
		let caret = caret.min(text.len_chars());
		Self { text, version, caret }
	}

	pub fn text(&self) -> &Rope {
		&self.text
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn caret(&self) -> usize {
		self.caret
	}

	pub fn len_chars(&self) -> usize {
		self.text.len_chars()
	}

	/// Char offset where the identifier ending at the caret begins.
	pub fn prefix_start(&self) -> usize {
		let mut start = self.caret;
		while start > 0 && is_identifier_char(self.text.char(start - 1)) {
			start -= 1;
		}
		start
	}

	/// Identifier text immediately before the caret.
	pub fn prefix(&self) -> String {
		self.text.slice(self.prefix_start()..self.caret).to_string()
	}

	/// Text in `range`, or `None` if it does not fit the buffer.
	pub fn slice(&self, range: Range<usize>) -> Option<String> {
		if range.start > range.end || range.end > self.text.len_chars() {
			return None;
		}
		Some(self.text.slice(range).to_string())
	}
}

/// Char range pinned to the buffer version it was recorded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedRange {
	start: usize,
	end: usize,
	version: u64,
}

impl TrackedRange {
	pub fn new(range: Range<usize>, version: u64) -> Self {
		Self {
			start: range.start,
			end: range.end.max(range.start),
			version,
		}
	}

	pub fn start(&self) -> usize {
		self.start
	}

	pub fn end(&self) -> usize {
		self.end
	}

	pub fn range(&self) -> Range<usize> {
		self.start..self.end
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	/// True while the buffer is still at the recorded version.
	pub fn is_valid(&self, current_version: u64) -> bool {
		self.version == current_version
	}
}

/// Outcome of [`EditorSurface::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
	/// Pending edits are applied; producers may run.
	Committed,
	/// The host will commit later and call
	/// [`CompletionService::buffer_committed`](crate::CompletionService::buffer_committed).
	Deferred,
}

/// Change notifications the host forwards to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEvent {
	/// A character was typed before the caret.
	Typed(char),
	/// Text before the caret was deleted.
	Deleted,
	/// Any other edit.
	Edited,
	/// The caret moved without an edit.
	CaretMoved,
}

impl BufferEvent {
	pub fn is_edit(self) -> bool {
		!matches!(self, Self::CaretMoved)
	}
}

/// Editing surface a completion session is bound to.
pub trait EditorSurface {
	fn snapshot(&self) -> BufferSnapshot;
	/// Current buffer version; bumped by every edit.
	fn version(&self) -> u64;
	fn caret(&self) -> usize;
	/// Whether the caller already holds exclusive write access, which selects
	/// the synchronous threading strategy.
	fn has_write_access(&self) -> bool;
	/// Applies pending edits before producers read the buffer.
	fn commit(&mut self) -> CommitState;
	/// Replaces `range` with `text` and returns the new version.
	fn replace(&mut self, range: Range<usize>, text: &str) -> Result<u64, EditError>;
	fn set_caret(&mut self, offset: usize);
	fn slice(&self, range: Range<usize>) -> Option<String>;
}

/// Read access shared between a session and its contributors.
///
/// Invalidated by the interactive thread when the buffer changes under a
/// running session; contributors observe it at their checkpoints.
#[derive(Debug, Clone, Default)]
pub struct ReadAccess {
	invalidated: Arc<AtomicBool>,
}

impl ReadAccess {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_valid(&self) -> bool {
		!self.invalidated.load(Ordering::Acquire)
	}

	pub fn invalidate(&self) {
		self.invalidated.store(true, Ordering::Release);
	}
}

/// In-memory rope-backed editor.
#[derive(Debug, Clone)]
pub struct MemoryEditor {
	text: Rope,
	version: u64,
	caret: usize,
	write_access: bool,
	read_only: bool,
	defer_commit: bool,
}

impl MemoryEditor {
	/// Buffer holding `text` with the caret at the end.
	pub fn new(text: &str) -> Self {
		let text = Rope::from_str(text);
		let caret = text.len_chars();
		Self {
			text,
			version: 1,
			caret,
			write_access: false,
			read_only: false,
			defer_commit: false,
		}
	}

	pub fn with_caret(mut self, caret: usize) -> Self {
		self.caret = caret.min(self.text.len_chars());
		self
	}

	pub fn with_write_access(mut self, write_access: bool) -> Self {
		self.write_access = write_access;
		self
	}

	pub fn with_read_only(mut self, read_only: bool) -> Self {
		self.read_only = read_only;
		self
	}

	pub fn with_deferred_commit(mut self, defer: bool) -> Self {
		self.defer_commit = defer;
		self
	}

	pub fn set_deferred_commit(&mut self, defer: bool) {
		self.defer_commit = defer;
	}

	pub fn text(&self) -> String {
		self.text.to_string()
	}

	/// Inserts `c` at the caret and returns the event to forward.
	pub fn type_char(&mut self, c: char) -> BufferEvent {
		let mut buf = [0u8; 4];
		match self.replace(self.caret..self.caret, c.encode_utf8(&mut buf)) {
			Ok(_) => {
				self.caret += 1;
				BufferEvent::Typed(c)
			}
			Err(_) => BufferEvent::Edited,
		}
	}

	/// Deletes the char before the caret.
	pub fn backspace(&mut self) -> BufferEvent {
		if self.caret > 0 {
			// `replace` pulls the caret back over the removed char.
			let _ = self.replace(self.caret - 1..self.caret, "");
		}
		BufferEvent::Deleted
	}

	pub fn move_caret(&mut self, offset: usize) -> BufferEvent {
		self.set_caret(offset);
		BufferEvent::CaretMoved
	}
}

impl EditorSurface for MemoryEditor {
	fn snapshot(&self) -> BufferSnapshot {
		BufferSnapshot::new(self.text.clone(), self.version, self.caret)
	}

	fn version(&self) -> u64 {
		self.version
	}

	fn caret(&self) -> usize {
		self.caret
	}

	fn has_write_access(&self) -> bool {
		self.write_access
	}

	fn commit(&mut self) -> CommitState {
		if self.defer_commit { CommitState::Deferred } else { CommitState::Committed }
	}

	fn replace(&mut self, range: Range<usize>, text: &str) -> Result<u64, EditError> {
		if self.read_only {
			return Err(EditError::ReadOnly);
		}
		let len = self.text.len_chars();
		if range.start > range.end || range.end > len {
			return Err(EditError::OutOfBounds {
				start: range.start,
				end: range.end,
				len,
			});
		}
		self.text.remove(range.clone());
		self.text.insert(range.start, text);
		if self.caret > range.start {
			let removed = range.end - range.start;
			let shifted = self.caret.saturating_sub(removed).max(range.start);
			self.caret = (shifted + text.chars().count()).min(self.text.len_chars());
		}
		self.version += 1;
		Ok(self.version)
	}

	fn set_caret(&mut self, offset: usize) {
		self.caret = offset.min(self.text.len_chars());
	}

	fn slice(&self, range: Range<usize>) -> Option<String> {
		if range.start > range.end || range.end > self.text.len_chars() {
			return None;
		}
		Some(self.text.slice(range).to_string())
	}
}
