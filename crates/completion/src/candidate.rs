//! Completion candidates as produced by contributors.

use std::fmt;
use std::sync::Arc;

/// Aggregator-assigned identifier; equals the candidate's arrival index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(pub(crate) u32);

impl CandidateId {
	pub const fn index(self) -> usize {
		self.0 as usize
	}
}

impl fmt::Display for CandidateId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Named group a candidate can be tagged with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupId(Arc<str>);

impl GroupId {
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self(name.into())
	}

	pub fn name(&self) -> &str {
		&self.0
	}
}

/// What gets written into the buffer when a candidate is selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InsertBehavior {
	/// Insert the lookup string.
	#[default]
	Replace,
	/// Insert different text than what is displayed.
	ReplaceWith(String),
	/// Insert `text` and leave the caret `caret` chars into it.
	ReplaceWithCaret { text: String, caret: usize },
}

impl InsertBehavior {
	/// Text to insert for a candidate displayed as `lookup`.
	pub fn text<'a>(&'a self, lookup: &'a str) -> &'a str {
		match self {
			Self::Replace => lookup,
			Self::ReplaceWith(text) | Self::ReplaceWithCaret { text, .. } => text,
		}
	}

	/// Caret offset inside the inserted text, `None` meaning "after it".
	pub fn caret(&self) -> Option<usize> {
		match self {
			Self::ReplaceWithCaret { caret, .. } => Some(*caret),
			_ => None,
		}
	}
}

/// Raw ranking inputs a contributor attaches to its candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankingHints {
	pub priority: i32,
	pub class: i32,
	pub proximity: i32,
}

/// One suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
	lookup: String,
	detail: Option<String>,
	hints: RankingHints,
	group: Option<GroupId>,
	insert: InsertBehavior,
}

impl Candidate {
	pub fn new(lookup: impl Into<String>) -> Self {
		Self {
			lookup: lookup.into(),
			detail: None,
			hints: RankingHints::default(),
			group: None,
			insert: InsertBehavior::Replace,
		}
	}

	pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
		self.detail = Some(detail.into());
		self
	}

	pub fn with_priority(mut self, priority: i32) -> Self {
		self.hints.priority = priority;
		self
	}

	pub fn with_class(mut self, class: i32) -> Self {
		self.hints.class = class;
		self
	}

	pub fn with_proximity(mut self, proximity: i32) -> Self {
		self.hints.proximity = proximity;
		self
	}

	pub fn with_group(mut self, group: GroupId) -> Self {
		self.group = Some(group);
		self
	}

	pub fn with_insert(mut self, insert: InsertBehavior) -> Self {
		self.insert = insert;
		self
	}

	/// Display string; also the deduplication key.
	pub fn lookup(&self) -> &str {
		&self.lookup
	}

	pub fn detail(&self) -> Option<&str> {
		self.detail.as_deref()
	}

	pub fn hints(&self) -> RankingHints {
		self.hints
	}

	pub fn group(&self) -> Option<&GroupId> {
		self.group.as_ref()
	}

	pub fn insert_behavior(&self) -> &InsertBehavior {
		&self.insert
	}

	/// Text to insert on selection.
	pub fn insert_text(&self) -> &str {
		self.insert.text(&self.lookup)
	}
}
