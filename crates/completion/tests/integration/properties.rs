//! Randomized checks of the engine's ordering and ownership guarantees.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use quill_completion::{
	BufferEvent, Candidate, CompletionParameters, CompletionService, Contributor, ContributorError, EditorSurface, GroupId, LiveSessions, LookupRow,
	MemoryEditor, RankingPolicy, ResultAggregator, ResultSink, Session, SessionOptions, SkipPredicate, ThreadingStrategy,
};
use quill_worker::WorkerRegistry;

use crate::common::*;

#[derive(Debug, Clone)]
enum Op {
	Invoke(u32),
	Type(char),
	Backspace,
	MoveCaret,
	Tick,
	Select,
	Cancel,
}

fn arb_op() -> impl Strategy<Value = Op> {
	prop_oneof![
		(0u32..3).prop_map(Op::Invoke),
		prop::sample::select(vec!['i', 'n', 't', 'v', '_', ' ', '(']).prop_map(Op::Type),
		Just(Op::Backspace),
		Just(Op::MoveCaret),
		Just(Op::Tick),
		Just(Op::Select),
		Just(Op::Cancel),
	]
}

fn check_ownership(service: &CompletionService) -> Result<(), TestCaseError> {
	let kind = service.phase();
	let live = service.live_sessions();
	prop_assert!(live <= 1, "{live} live sessions in {kind:?}");
	prop_assert_eq!(live, usize::from(kind.owns_session()), "phase {:?}", kind);
	prop_assert_eq!(service.listener_count(), usize::from(kind.is_zombie()), "phase {:?}", kind);
	Ok(())
}

/// Emits `items` in order without batching.
struct Emitter {
	items: Vec<String>,
}

impl Contributor for Emitter {
	fn name(&self) -> &str {
		"emitter"
	}

	fn fill(&self, params: &CompletionParameters, sink: &dyn ResultSink) -> Result<(), ContributorError> {
		for lookup in &self.items {
			params.checkpoint()?;
			sink.add(Candidate::new(lookup.as_str()));
		}
		Ok(())
	}
}

fn arb_lookups() -> impl Strategy<Value = Vec<String>> {
	prop::collection::vec("[a-e]{1,4}", 1..24)
}

fn skip_leading_a() -> Arc<dyn SkipPredicate> {
	Arc::new(|candidate: &Candidate| candidate.lookup().starts_with('a'))
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(24))]

	/// At most one session is live, and zombies and idle own none.
	#[test]
	fn prop_at_most_one_live_session(ops in prop::collection::vec(arb_op(), 1..12)) {
		let (mut service, _presentation) = service(patient_config(), vec![
			ListContributor::new("a", &["print", "println", "private", "pri_v"]),
			ListContributor::new("b", &["print", "prism"]),
		]);
		let mut editor = MemoryEditor::new("x pri");

		for op in ops {
			match op {
				Op::Invoke(count) => {
					prop_assert!(service.invoke(&mut editor, count, false).is_ok());
				}
				Op::Type(c) => {
					let event = editor.type_char(c);
					prop_assert!(service.buffer_changed(&mut editor, event).is_ok());
				}
				Op::Backspace => {
					let event = editor.backspace();
					prop_assert!(service.buffer_changed(&mut editor, event).is_ok());
				}
				Op::MoveCaret => {
					let event = editor.move_caret(0);
					prop_assert!(service.buffer_changed(&mut editor, event).is_ok());
					let event: BufferEvent = editor.move_caret(editor.text().chars().count());
					prop_assert!(service.buffer_changed(&mut editor, event).is_ok());
				}
				Op::Tick => {
					prop_assert!(service.tick(&mut editor).is_ok());
				}
				Op::Select => {
					if let Some(id) = service.view().and_then(|view| view.selected().map(|(id, _)| id)) {
						let _ = service.select_item(&mut editor, id, None);
					}
				}
				Op::Cancel => service.cancel(),
			}
			check_ownership(&service)?;
		}

		let workers = service.workers().clone();
		drop(service);
		prop_assert!(wait_until(Duration::from_secs(5), || workers.live_count() == 0));
	}

	/// Candidates reach the aggregator in the order their contributor emitted them.
	#[test]
	fn prop_background_results_keep_emission_order(lookups in arb_lookups()) {
		let options = SessionOptions {
			invocation_count: 1,
			strategy: ThreadingStrategy::Asynchronous,
			config: patient_config(),
			ranking: RankingPolicy::default(),
		};
		let mut session = Session::new(1, options, WorkerRegistry::new(), &LiveSessions::new());
		let emitter: Arc<dyn Contributor> = Arc::new(Emitter { items: lookups.clone() });
		session.start(vec![emitter], MemoryEditor::new("").snapshot()).expect("start");
		prop_assert!(session.blocking_wait_for_finish(Duration::from_secs(5)));
		session.finish_computation();

		let mut expected: Vec<&str> = Vec::new();
		for lookup in &lookups {
			if !expected.contains(&lookup.as_str()) {
				expected.push(lookup);
			}
		}
		let applied: Vec<String> = session.with_aggregator(|agg| agg.application_order().map(str::to_string).collect());
		prop_assert_eq!(applied, expected);
	}

	/// The sorted view does not depend on arrival order.
	#[test]
	fn prop_sort_is_independent_of_arrival(
		(items, shuffled) in prop::collection::btree_map("[a-f]{1,5}", 0i32..3, 1..20).prop_flat_map(|items| {
			let items: Vec<(String, i32)> = items.into_iter().collect();
			(Just(items.clone()), Just(items).prop_shuffle())
		})
	) {
		let policy = RankingPolicy {
			skip: vec![skip_leading_a()],
			..RankingPolicy::default()
		};
		let view_of = |items: &[(String, i32)]| {
			let mut agg = ResultAggregator::new("", policy.clone());
			for (lookup, priority) in items {
				agg.add_element(Candidate::new(lookup.as_str()).with_priority(*priority));
			}
			agg.rebuild();
			agg.view().clone()
		};
		let ordered = view_of(&items);
		let arrived = view_of(&shuffled);
		prop_assert_eq!(ordered.labels(), arrived.labels());

		let expected_selected = ordered.labels().iter().position(|lookup| !lookup.starts_with('a'));
		prop_assert_eq!(ordered.selected_row(), expected_selected);
		prop_assert_eq!(arrived.selected().map(|(_, c)| c.lookup().to_string()), ordered.selected().map(|(_, c)| c.lookup().to_string()));
	}

	/// Separators appear only when tagged items form a suffix of the sorted list.
	#[test]
	fn prop_grouping_only_for_tagged_suffixes(tags in prop::collection::vec(prop::option::of(0usize..3), 1..12)) {
		let groups = [GroupId::new("alpha"), GroupId::new("beta"), GroupId::new("gamma")];
		let mut agg = ResultAggregator::new("", RankingPolicy::default());
		for (index, tag) in tags.iter().enumerate() {
			let candidate = Candidate::new(format!("item{index:02}")).with_priority(-(index as i32));
			agg.add_element(match tag {
				Some(group) => candidate.with_group(groups[*group].clone()),
				None => candidate,
			});
		}
		agg.rebuild();
		let view = agg.view();

		let first_tagged = tags.iter().position(Option::is_some);
		let suffix = first_tagged.is_some_and(|first| tags[first..].iter().all(Option::is_some));
		prop_assert_eq!(view.is_grouped(), suffix);
		prop_assert_eq!(view.item_count(), tags.len());

		let separators = view.rows().iter().filter(|row| matches!(row, LookupRow::Separator(_))).count();
		if suffix {
			let mut distinct: Vec<usize> = tags.iter().flatten().copied().collect();
			distinct.sort_unstable();
			distinct.dedup();
			prop_assert_eq!(separators, distinct.len());
		} else {
			prop_assert_eq!(separators, 0);
			let labels: Vec<String> = (0..tags.len()).map(|index| format!("item{index:02}")).collect();
			prop_assert_eq!(view.labels(), labels);
		}
	}
}

#[test]
fn interleaved_groups_fall_back_to_a_flat_list() {
	let a = GroupId::new("a");
	let b = GroupId::new("b");
	let tagged = |lookup: &str, priority: i32, group: Option<&GroupId>| {
		let candidate = Candidate::new(lookup).with_priority(priority);
		match group {
			Some(group) => candidate.with_group(group.clone()),
			None => candidate,
		}
	};

	let mut agg = ResultAggregator::new("", RankingPolicy::default());
	for candidate in [tagged("a1", 4, Some(&a)), tagged("a2", 3, Some(&a)), tagged("u1", 2, None), tagged("b1", 1, Some(&b))] {
		agg.add_element(candidate);
	}
	agg.rebuild();
	assert!(!agg.view().is_grouped());
	assert_eq!(agg.view().labels(), vec!["a1", "a2", "u1", "b1"]);

	let mut agg = ResultAggregator::new("", RankingPolicy::default());
	for candidate in [
		tagged("u1", 6, None),
		tagged("u2", 5, None),
		tagged("a1", 4, Some(&a)),
		tagged("a2", 3, Some(&a)),
		tagged("b1", 2, Some(&b)),
		tagged("b2", 1, Some(&b)),
	] {
		agg.add_element(candidate);
	}
	agg.rebuild();
	let rows: Vec<String> = agg
		.view()
		.rows()
		.iter()
		.map(|row| match row {
			LookupRow::Item { candidate, .. } => candidate.lookup().to_string(),
			LookupRow::Separator(group) => format!("--{}", group.name()),
		})
		.collect();
	assert_eq!(rows, vec!["u1", "u2", "--a", "a1", "a2", "--b", "b1", "b2"]);
}
