//! Case-insensitive prefix matching.

/// How a candidate matched the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
	/// The lookup string starts with the prefix.
	Start,
	/// The prefix occurs later in the lookup string.
	Middle,
}

/// Matches lookup strings against the current prefix.
#[derive(Debug, Clone, Default)]
pub struct PrefixMatcher {
	prefix: String,
	lowered: String,
}

impl PrefixMatcher {
	pub fn new(prefix: impl Into<String>) -> Self {
		let prefix = prefix.into();
		let lowered = prefix.to_lowercase();
		Self { prefix, lowered }
	}

	pub fn prefix(&self) -> &str {
		&self.prefix
	}

	/// Classifies `text`, or returns `None` if it does not match at all.
	///
	/// An empty prefix start-matches everything.
	pub fn match_kind(&self, text: &str) -> Option<MatchKind> {
		if self.lowered.is_empty() {
			return Some(MatchKind::Start);
		}
		let hay = text.to_lowercase();
		if hay.starts_with(&self.lowered) {
			Some(MatchKind::Start)
		} else if hay.contains(&self.lowered) {
			Some(MatchKind::Middle)
		} else {
			None
		}
	}
}
