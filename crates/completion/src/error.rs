//! Error types for completion sessions.

use std::path::PathBuf;

use thiserror::Error;

use crate::candidate::CandidateId;
use crate::phase::PhaseKind;

/// Reason a contributor checkpoint refused to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
	/// The session was cancelled.
	#[error("completion session cancelled")]
	Cancelled,
	/// Read access was invalidated by a buffer edit.
	#[error("buffer changed under the completion session")]
	Stale,
}

impl From<quill_worker::Interrupted> for Interrupted {
	fn from(reason: quill_worker::Interrupted) -> Self {
		match reason {
			quill_worker::Interrupted::Cancelled => Self::Cancelled,
		}
	}
}

/// Failure reported by a contributor.
#[derive(Debug, Error)]
pub enum ContributorError {
	/// The contributor observed cancellation or stale read access.
	#[error(transparent)]
	Interrupted(#[from] Interrupted),
	/// The contributor failed on its own.
	#[error(transparent)]
	Failed(#[from] anyhow::Error),
}

impl From<quill_worker::Interrupted> for ContributorError {
	fn from(reason: quill_worker::Interrupted) -> Self {
		Self::Interrupted(reason.into())
	}
}

/// Errors surfaced by the completion engine.
#[derive(Debug, Error)]
pub enum CompletionError {
	/// The phase slot was not in any of the expected phases.
	///
	/// Two sessions raced past the single-slot invariant; the slot has been
	/// reset to idle.
	#[error("expected phase {expected:?}, found {actual:?}")]
	ProtocolViolation { expected: Vec<PhaseKind>, actual: PhaseKind },

	/// The active phase refuses new triggers.
	#[error("completion trigger rejected while {phase:?}")]
	Rejected { phase: PhaseKind },

	/// `start` was called twice on one session.
	#[error("completion session {0} already started")]
	AlreadyStarted(u64),

	/// The tracked completion range no longer matches the buffer.
	#[error("buffer changed; completion range is stale")]
	Stale,

	/// No session is active.
	#[error("no active completion session")]
	NoSession,

	/// The lookup does not contain the requested item.
	#[error("no lookup item {0}")]
	NoSuchItem(CandidateId),

	/// The editor refused an edit.
	#[error("insertion failed: {0}")]
	Insertion(#[from] EditError),

	/// The producer worker could not be spawned.
	#[error("failed to spawn completion worker: {0}")]
	Spawn(#[from] std::io::Error),

	/// Configuration could not be loaded.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Failure applying an edit to the editor surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
	/// The range does not fit the buffer.
	#[error("range {start}..{end} out of bounds for buffer of {len} chars")]
	OutOfBounds { start: usize, end: usize, len: usize },
	/// The buffer is read-only.
	#[error("buffer is read-only")]
	ReadOnly,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {}: {error}", path.display())]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Error parsing TOML syntax or field types.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Result type for completion operations.
pub type Result<T> = std::result::Result<T, CompletionError>;
