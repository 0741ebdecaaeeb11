//! Ranking vectors and the pluggable pieces that produce them.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::candidate::Candidate;

/// Ordered weights compared most-significant field first.
///
/// Field order is the comparison order: `priority`, then `class`, then
/// `usage`, then `proximity`. Higher sorts earlier in the lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RankingVector {
	pub priority: i32,
	pub class: i32,
	pub usage: u32,
	pub proximity: i32,
}

/// Context a [`Weigher`] sees. Fixed for the lifetime of a session.
pub struct WeighContext<'a> {
	/// Prefix at session start.
	pub prefix: &'a str,
	pub usage: &'a dyn UsageStatistics,
}

/// Computes the ranking vector of a candidate.
pub trait Weigher: Send + Sync {
	fn weigh(&self, candidate: &Candidate, ctx: &WeighContext<'_>) -> RankingVector;
}

/// Copies the contributor hints and looks up usage statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultWeigher;

impl Weigher for DefaultWeigher {
	fn weigh(&self, candidate: &Candidate, ctx: &WeighContext<'_>) -> RankingVector {
		let hints = candidate.hints();
		RankingVector {
			priority: hints.priority,
			class: hints.class,
			usage: ctx.usage.usage(candidate.lookup()),
			proximity: hints.proximity,
		}
	}
}

/// Source of the statistical-usage field.
pub trait UsageStatistics: Send + Sync {
	fn usage(&self, lookup: &str) -> u32;
	fn record(&self, lookup: &str);
}

/// Statistics that never score anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStatistics;

impl UsageStatistics for NoStatistics {
	fn usage(&self, _lookup: &str) -> u32 {
		0
	}

	fn record(&self, _lookup: &str) {}
}

/// In-memory selection counts.
#[derive(Debug, Default)]
pub struct RecentSelections {
	counts: Mutex<FxHashMap<String, u32>>,
}

impl RecentSelections {
	pub fn new() -> Self {
		Self::default()
	}
}

impl UsageStatistics for RecentSelections {
	fn usage(&self, lookup: &str) -> u32 {
		self.counts.lock().get(lookup).copied().unwrap_or(0)
	}

	fn record(&self, lookup: &str) {
		let mut counts = self.counts.lock();
		let count = counts.entry(lookup.to_string()).or_default();
		*count = count.saturating_add(1);
	}
}

/// Candidate-level predicate excluding items from preselection.
pub trait SkipPredicate: Send + Sync {
	fn skip(&self, candidate: &Candidate) -> bool;
}

impl<F> SkipPredicate for F
where
	F: Fn(&Candidate) -> bool + Send + Sync,
{
	fn skip(&self, candidate: &Candidate) -> bool {
		self(candidate)
	}
}

/// Caller-supplied ordering applied after the lexical tie-break.
pub type ProximityTiebreak = Arc<dyn Fn(&Candidate, &Candidate) -> Ordering + Send + Sync>;

/// Everything a session's aggregator needs to rank candidates.
#[derive(Clone)]
pub struct RankingPolicy {
	pub weigher: Arc<dyn Weigher>,
	pub usage: Arc<dyn UsageStatistics>,
	pub tiebreak: Option<ProximityTiebreak>,
	pub skip: Vec<Arc<dyn SkipPredicate>>,
}

impl Default for RankingPolicy {
	fn default() -> Self {
		Self {
			weigher: Arc::new(DefaultWeigher),
			usage: Arc::new(NoStatistics),
			tiebreak: None,
			skip: Vec::new(),
		}
	}
}

impl std::fmt::Debug for RankingPolicy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RankingPolicy")
			.field("tiebreak", &self.tiebreak.is_some())
			.field("skip", &self.skip.len())
			.finish_non_exhaustive()
	}
}
