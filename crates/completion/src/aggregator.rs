//! Result aggregation: dedupe, ranking, grouping and preselection.
//!
//! Candidates are appended in application order and never re-sorted on
//! arrival. The sorted [`LookupView`] is rebuilt on [`ResultAggregator::refresh`],
//! which the session calls at most once per tick, and not at all while a batch
//! is open. Re-sorting is the dominant cost under heavy candidate volume, so
//! arrivals only mark the view dirty.
//!
//! # Ordering
//!
//! Most relevant first by [`RankingVector`], then case-insensitive lexical
//! order of the lookup string, then the caller's proximity tie-break, then
//! arrival order. The last key makes the order total, so identical inputs
//! always sort identically.
//!
//! # Grouping
//!
//! When every group-tagged item sits in a contiguous suffix of the sorted list,
//! each group gets a separator and its own run. If tagged and untagged items
//! interleave, grouping is dropped for that refresh and the flat order is
//! shown.

use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::map::Entry;
use rustc_hash::FxHashMap;

use crate::candidate::{Candidate, CandidateId, GroupId};
use crate::matcher::{MatchKind, PrefixMatcher};
use crate::presentation::{LookupRow, LookupView};
use crate::ranking::{RankingPolicy, RankingVector, WeighContext};

/// Outcome of [`ResultAggregator::add_element`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
	Added(CandidateId),
	/// A candidate with the same lookup string was already present.
	Duplicate(CandidateId),
}

struct SortKey {
	id: CandidateId,
	vector: RankingVector,
	lowered: String,
	candidate: Arc<Candidate>,
}

/// Collects and orders the candidates of one session.
pub struct ResultAggregator {
	entries: IndexMap<String, Arc<Candidate>>,
	matcher: PrefixMatcher,
	initial_prefix: String,
	policy: RankingPolicy,
	relevance: FxHashMap<CandidateId, RankingVector>,
	batch_depth: usize,
	dirty: bool,
	view: LookupView,
	sorts: u64,
	weighings: u64,
	duplicates: u64,
}

impl std::fmt::Debug for ResultAggregator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResultAggregator")
			.field("prefix", &self.matcher.prefix())
			.field("entries", &self.entries.len())
			.field("batch_depth", &self.batch_depth)
			.field("dirty", &self.dirty)
			.field("sorts", &self.sorts)
			.finish_non_exhaustive()
	}
}

impl ResultAggregator {
	pub fn new(prefix: impl Into<String>, policy: RankingPolicy) -> Self {
		let prefix = prefix.into();
		Self {
			entries: IndexMap::new(),
			matcher: PrefixMatcher::new(prefix.clone()),
			initial_prefix: prefix,
			policy,
			relevance: FxHashMap::default(),
			batch_depth: 0,
			dirty: false,
			view: LookupView::default(),
			sorts: 0,
			weighings: 0,
			duplicates: 0,
		}
	}

	/// Appends a candidate unless one with the same lookup string exists.
	pub fn add_element(&mut self, candidate: Candidate) -> AddOutcome {
		match self.entries.entry(candidate.lookup().to_string()) {
			Entry::Occupied(existing) => {
				self.duplicates += 1;
				let id = CandidateId(existing.index() as u32);
				tracing::trace!(lookup = candidate.lookup(), %id, "completion.aggregator.duplicate");
				AddOutcome::Duplicate(id)
			}
			Entry::Vacant(slot) => {
				let id = CandidateId(slot.index() as u32);
				slot.insert(Arc::new(candidate));
				self.dirty = true;
				AddOutcome::Added(id)
			}
		}
	}

	/// Memoized ranking vector of an applied candidate.
	pub fn relevance(&mut self, id: CandidateId) -> Option<RankingVector> {
		let candidate = Arc::clone(self.entries.get_index(id.index())?.1);
		Some(self.weigh(id, &candidate))
	}

	fn weigh(&mut self, id: CandidateId, candidate: &Candidate) -> RankingVector {
		if let Some(vector) = self.relevance.get(&id) {
			return *vector;
		}
		let ctx = WeighContext {
			prefix: &self.initial_prefix,
			usage: &*self.policy.usage,
		};
		let vector = self.policy.weigher.weigh(candidate, &ctx);
		self.weighings += 1;
		self.relevance.insert(id, vector);
		vector
	}

	pub fn match_kind(&self, candidate: &Candidate) -> Option<MatchKind> {
		self.matcher.match_kind(candidate.lookup())
	}

	pub fn prefix(&self) -> &str {
		self.matcher.prefix()
	}

	/// Replaces the prefix the view is filtered by.
	pub fn set_prefix(&mut self, prefix: impl Into<String>) {
		self.matcher = PrefixMatcher::new(prefix);
		self.dirty = true;
	}

	pub fn begin_batch(&mut self) {
		self.batch_depth += 1;
	}

	pub fn end_batch(&mut self) {
		if self.batch_depth == 0 {
			tracing::warn!("completion.aggregator.unbalanced_end_batch");
			return;
		}
		self.batch_depth -= 1;
	}

	pub fn in_batch(&self) -> bool {
		self.batch_depth > 0
	}

	/// Closes batches left open by a contributor that stopped early.
	pub(crate) fn reset_batches(&mut self) {
		if self.batch_depth > 0 {
			tracing::debug!(depth = self.batch_depth, "completion.aggregator.batches_reset");
			self.batch_depth = 0;
		}
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	/// Rebuilds the view if anything changed and no batch is open.
	///
	/// Returns true if the view was rebuilt.
	pub fn refresh(&mut self) -> bool {
		if !self.dirty || self.in_batch() {
			return false;
		}
		self.rebuild();
		true
	}

	/// Sorted items, rebuilding first if stale.
	pub fn items_snapshot(&mut self) -> Vec<Arc<Candidate>> {
		if self.dirty {
			self.rebuild();
		}
		self.view.items().map(|(_, c)| Arc::clone(c)).collect()
	}

	/// View as of the last rebuild.
	pub fn view(&self) -> &LookupView {
		&self.view
	}

	pub fn get(&self, id: CandidateId) -> Option<&Arc<Candidate>> {
		self.entries.get_index(id.index()).map(|(_, c)| c)
	}

	/// Lookup strings in the order they were applied, before any sorting.
	pub fn application_order(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Number of view rebuilds so far.
	pub fn sort_count(&self) -> u64 {
		self.sorts
	}

	/// Number of weigher invocations so far.
	pub fn weigh_count(&self) -> u64 {
		self.weighings
	}

	pub fn duplicate_count(&self) -> u64 {
		self.duplicates
	}

	/// Unconditionally re-sorts and rebuilds the view.
	pub fn rebuild(&mut self) {
		let matching: Vec<(CandidateId, Arc<Candidate>)> = self
			.entries
			.values()
			.enumerate()
			.filter(|(_, c)| self.matcher.match_kind(c.lookup()).is_some())
			.map(|(index, c)| (CandidateId(index as u32), Arc::clone(c)))
			.collect();

		let mut keyed: Vec<SortKey> = matching
			.into_iter()
			.map(|(id, candidate)| SortKey {
				id,
				vector: self.weigh(id, &candidate),
				lowered: candidate.lookup().to_lowercase(),
				candidate,
			})
			.collect();

		let tiebreak = self.policy.tiebreak.clone();
		keyed.sort_by(|a, b| {
			b.vector
				.cmp(&a.vector)
				.then_with(|| a.lowered.cmp(&b.lowered))
				.then_with(|| tiebreak.as_ref().map_or(Ordering::Equal, |t| t(&a.candidate, &b.candidate)))
				.then_with(|| a.id.cmp(&b.id))
		});

		let (rows, grouped) = match grouped_rows(&keyed) {
			Some(rows) => (rows, true),
			None => (keyed.iter().map(item_row).collect(), false),
		};

		let selected = rows.iter().position(|row| match row {
			LookupRow::Item { candidate, .. } => !self.policy.skip.iter().any(|p| p.skip(candidate)),
			LookupRow::Separator(_) => false,
		});

		self.view = LookupView { rows, selected, grouped };
		self.sorts += 1;
		self.dirty = false;
		tracing::trace!(items = keyed.len(), grouped, sorts = self.sorts, "completion.aggregator.rebuilt");
	}
}

fn item_row(key: &SortKey) -> LookupRow {
	LookupRow::Item {
		id: key.id,
		candidate: Arc::clone(&key.candidate),
	}
}

/// Grouped layout, or `None` when there are no groups or they interleave
/// with untagged items.
fn grouped_rows(sorted: &[SortKey]) -> Option<Vec<LookupRow>> {
	let first_tagged = sorted.iter().position(|k| k.candidate.group().is_some())?;
	if sorted[first_tagged..].iter().any(|k| k.candidate.group().is_none()) {
		tracing::trace!(first_tagged, "completion.aggregator.grouping_abandoned");
		return None;
	}

	let mut groups: IndexMap<&GroupId, Vec<&SortKey>> = IndexMap::new();
	for key in &sorted[first_tagged..] {
		if let Some(group) = key.candidate.group() {
			groups.entry(group).or_default().push(key);
		}
	}

	let mut rows: Vec<LookupRow> = sorted[..first_tagged].iter().map(item_row).collect();
	for (group, members) in groups {
		rows.push(LookupRow::Separator(group.clone()));
		rows.extend(members.into_iter().map(item_row));
	}
	Some(rows)
}
