//! Lookup view handed to the presentation surface.

use std::sync::Arc;

use crate::candidate::{Candidate, CandidateId, GroupId};

/// One row of the lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRow {
	Item { id: CandidateId, candidate: Arc<Candidate> },
	/// Header preceding the first item of a group.
	Separator(GroupId),
}

impl LookupRow {
	pub fn candidate(&self) -> Option<&Arc<Candidate>> {
		match self {
			Self::Item { candidate, .. } => Some(candidate),
			Self::Separator(_) => None,
		}
	}
}

/// Ordered, filtered lookup contents as of the last refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupView {
	pub(crate) rows: Vec<LookupRow>,
	pub(crate) selected: Option<usize>,
	pub(crate) grouped: bool,
}

impl LookupView {
	pub fn rows(&self) -> &[LookupRow] {
		&self.rows
	}

	/// Row index of the preselected item.
	pub fn selected_row(&self) -> Option<usize> {
		self.selected
	}

	pub fn selected(&self) -> Option<(CandidateId, &Arc<Candidate>)> {
		match self.rows.get(self.selected?)? {
			LookupRow::Item { id, candidate } => Some((*id, candidate)),
			LookupRow::Separator(_) => None,
		}
	}

	/// Whether group separators were injected on the last refresh.
	pub fn is_grouped(&self) -> bool {
		self.grouped
	}

	pub fn items(&self) -> impl Iterator<Item = (CandidateId, &Arc<Candidate>)> {
		self.rows.iter().filter_map(|row| match row {
			LookupRow::Item { id, candidate } => Some((*id, candidate)),
			LookupRow::Separator(_) => None,
		})
	}

	/// Lookup strings of the items, in display order.
	pub fn labels(&self) -> Vec<&str> {
		self.items().map(|(_, c)| c.lookup()).collect()
	}

	pub fn item_count(&self) -> usize {
		self.items().count()
	}

	pub fn is_empty(&self) -> bool {
		self.item_count() == 0
	}
}

/// Surface that renders the lookup and hints. The engine never draws.
pub trait Presentation: Send {
	/// Shows or updates the lookup.
	fn show(&mut self, view: &LookupView, calculating: bool);
	fn hide(&mut self);
	fn show_hint(&mut self, message: &str);
	fn hide_hint(&mut self);
}

/// Presentation that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

impl Presentation for Headless {
	fn show(&mut self, _view: &LookupView, _calculating: bool) {}
	fn hide(&mut self) {}
	fn show_hint(&mut self, _message: &str) {}
	fn hide_hint(&mut self) {}
}
