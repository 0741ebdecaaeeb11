//! Completion tunables.
//!
//! Read from the `[completion]` table of a TOML document. Every key is
//! optional; missing keys take their defaults and values under their floor are
//! clamped by [`CompletionConfig::validated`]. Sessions copy the config when
//! they start, so edits only affect the next session.
//!
//! ```toml
//! [completion]
//! auto-insert-timeout-ms = 2000
//! sync-attempt-grouping-time-ms = 300
//! middle-match-backlog-threshold = 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Lowest accepted `auto-insert-timeout-ms`.
pub const AUTO_INSERT_TIMEOUT_FLOOR_MS: u64 = 300;

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CompletionConfig {
	/// Blocking wait used while modifier keys are still held at invocation.
	pub auto_insert_timeout_ms: u64,
	/// Blocking wait for the first attempt of an explicit invocation.
	pub sync_attempt_grouping_time_ms: u64,
	/// Middle matches are held back until more start matches than this arrived.
	pub middle_match_backlog_threshold: usize,
	/// Bound of the producer mailbox.
	pub queue_capacity: usize,
	/// Queued messages applied per tick.
	pub apply_budget: usize,
	/// Poll interval of every bounded wait.
	pub checkpoint_poll_ms: u64,
	/// Allow an empty lookup to be shown before computation finishes.
	pub show_empty_while_computing: bool,
	/// Insert the only result of an explicit invocation directly.
	pub auto_insert_single: bool,
}

impl Default for CompletionConfig {
	fn default() -> Self {
		Self {
			auto_insert_timeout_ms: 2000,
			sync_attempt_grouping_time_ms: 300,
			middle_match_backlog_threshold: 10,
			queue_capacity: 1024,
			apply_budget: 512,
			checkpoint_poll_ms: 10,
			show_empty_while_computing: false,
			auto_insert_single: true,
		}
	}
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
	#[serde(default)]
	completion: CompletionConfig,
}

impl CompletionConfig {
	/// Parses the `[completion]` table of a TOML document.
	pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
		let file: ConfigFile = toml::from_str(src)?;
		Ok(file.completion.validated())
	}

	/// Reads and parses a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let src = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&src)
	}

	/// Clamps every value to its floor.
	pub fn validated(mut self) -> Self {
		clamp("auto-insert-timeout-ms", &mut self.auto_insert_timeout_ms, AUTO_INSERT_TIMEOUT_FLOOR_MS);
		clamp("middle-match-backlog-threshold", &mut self.middle_match_backlog_threshold, 1);
		clamp("queue-capacity", &mut self.queue_capacity, 1);
		clamp("apply-budget", &mut self.apply_budget, 1);
		clamp("checkpoint-poll-ms", &mut self.checkpoint_poll_ms, 1);
		self
	}

	pub fn auto_insert_timeout(&self) -> Duration {
		Duration::from_millis(self.auto_insert_timeout_ms)
	}

	pub fn sync_attempt_grouping_time(&self) -> Duration {
		Duration::from_millis(self.sync_attempt_grouping_time_ms)
	}

	pub fn checkpoint_poll(&self) -> Duration {
		Duration::from_millis(self.checkpoint_poll_ms)
	}
}

fn clamp<T>(key: &'static str, value: &mut T, floor: T)
where
	T: PartialOrd + Copy + std::fmt::Display,
{
	if *value < floor {
		tracing::warn!(key, value = %value, floor = %floor, "completion.config.clamped");
		*value = floor;
	}
}
