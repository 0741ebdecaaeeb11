//! Background sessions, blocking waits and cancellation across threads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use quill_completion::{
	Candidate, CompletionService, Contributor, EditorSurface, LiveSessions, MemoryEditor, PhaseKind, RankingPolicy, Session, SessionOptions, ThreadingStrategy,
};
use quill_worker::WorkerRegistry;

use crate::common::*;

fn labels(service: &CompletionService) -> Vec<String> {
	service
		.view()
		.map(|view| view.labels().into_iter().map(str::to_string).collect())
		.unwrap_or_default()
}

#[test]
fn slow_contributors_fall_back_to_a_calculating_lookup() {
	let gated = GatedContributor::new(&["print"], &["println"]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");

	assert_eq!(service.invoke(&mut editor, 1, false).expect("invoke"), PhaseKind::Computing);
	assert!(wait_until(Duration::from_secs(5), || {
		service.tick(&mut editor).expect("tick");
		presentation.last_lookup().is_some()
	}));
	assert_eq!(presentation.last_lookup(), Some((vec!["print".to_string()], true)));
	assert_eq!(service.phase(), PhaseKind::Computing);
	assert_eq!(service.workers().live_count(), 1);

	gated.gate.release();
	assert_eq!(tick_until_settled(&mut service, &mut editor, Duration::from_secs(5)), PhaseKind::Computed);
	assert_eq!(labels(&service), vec!["print", "println"]);
	assert_eq!(presentation.last_lookup().map(|(_, calculating)| calculating), Some(false));
	assert!(wait_until(Duration::from_secs(5), || service.workers().live_count() == 0));
}

#[test]
fn held_modifiers_extend_the_blocking_wait() {
	let gated = GatedContributor::new(&["print"], &["println"]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, _presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");

	let releaser = {
		let gated = Arc::clone(&gated);
		std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(100));
			gated.gate.release();
		})
	};
	let started = Instant::now();
	assert_eq!(service.invoke(&mut editor, 1, true).expect("invoke"), PhaseKind::Computed);
	assert!(started.elapsed() >= Duration::from_millis(90));
	assert_eq!(labels(&service), vec!["print", "println"]);
	releaser.join().expect("releaser");
}

#[test]
fn repeated_invocation_cancels_the_predecessor_first() {
	let gated = GatedContributor::new(&["print"], &["println"]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, _presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");

	assert_eq!(service.invoke(&mut editor, 1, false).expect("first"), PhaseKind::Computing);
	assert!(wait_until(Duration::from_secs(5), || gated.tokens.lock().len() == 1));
	assert_eq!(service.invoke(&mut editor, 1, false).expect("second"), PhaseKind::Computing);
	assert!(wait_until(Duration::from_secs(5), || gated.tokens.lock().len() == 2));

	assert_eq!(*gated.predecessors_cancelled.lock(), vec![true, true]);
	assert_eq!(*gated.invocation_counts.lock(), vec![1, 2]);
	assert!(gated.tokens.lock()[0].is_cancelled());
	assert_eq!(service.live_sessions(), 1);

	gated.gate.release();
	assert_eq!(tick_until_settled(&mut service, &mut editor, Duration::from_secs(5)), PhaseKind::Computed);
	assert_eq!(service.session().map(|s| s.invocation_count()), Some(2));
	assert!(wait_until(Duration::from_secs(5), || service.workers().live_count() == 0));
}

#[test]
fn auto_popup_over_a_running_session_keeps_the_count() {
	let gated = GatedContributor::new(&["print"], &[]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, _presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");

	service.invoke(&mut editor, 0, false).expect("first");
	assert!(wait_until(Duration::from_secs(5), || gated.tokens.lock().len() == 1));
	service.invoke(&mut editor, 0, false).expect("second");
	assert!(wait_until(Duration::from_secs(5), || gated.invocation_counts.lock().len() == 2));
	assert_eq!(*gated.invocation_counts.lock(), vec![0, 0]);
	gated.gate.release();
}

/// Cancels the running session from another thread and waits for its worker
/// to stop.
fn cancel_from_another_thread(service: &CompletionService) {
	let handle = service.session().map(Session::handle).expect("running session");
	std::thread::spawn(move || handle.cancel()).join().expect("canceller");
	assert!(wait_until(Duration::from_secs(5), || service.session().is_some_and(Session::is_finished)));
}

#[test]
fn cancelled_handle_never_auto_inserts_a_delayed_middle_match() {
	let gated = GatedContributor::new(&["sprint"], &[]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");

	assert_eq!(service.invoke(&mut editor, 1, false).expect("invoke"), PhaseKind::Computing);
	assert!(wait_until(Duration::from_secs(5), || gated.tokens.lock().len() == 1));
	cancel_from_another_thread(&service);

	assert_eq!(tick_until_settled(&mut service, &mut editor, Duration::from_secs(5)), PhaseKind::Idle);
	assert_eq!(editor.text(), "pri");
	assert!(presentation.last_lookup().is_none());
	assert_eq!(service.live_sessions(), 0);
}

#[test]
fn cancelled_handle_never_shows_the_empty_hint() {
	let gated = GatedContributor::new(&[], &[]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");

	assert_eq!(service.invoke(&mut editor, 1, false).expect("invoke"), PhaseKind::Computing);
	cancel_from_another_thread(&service);

	assert_eq!(tick_until_settled(&mut service, &mut editor, Duration::from_secs(5)), PhaseKind::Idle);
	assert!(presentation.hints().is_empty());
	assert_eq!(service.phase(), PhaseKind::Idle);
}

#[test]
fn late_handle_adds_reach_a_computed_lookup() {
	let (mut service, presentation) = service(patient_config(), vec![ListContributor::new("list", &["print"])]);
	let mut editor = MemoryEditor::new("pri");

	service.invoke(&mut editor, 0, false).expect("invoke");
	assert_eq!(tick_until_settled(&mut service, &mut editor, Duration::from_secs(5)), PhaseKind::Computed);
	let handle = service.session().map(Session::handle).expect("session");
	std::thread::spawn(move || handle.add_candidate(Candidate::new("println")))
		.join()
		.expect("producer");

	assert_eq!(service.tick(&mut editor).expect("tick"), PhaseKind::Computed);
	assert_eq!(labels(&service), vec!["print", "println"]);
	assert_eq!(presentation.last_lookup(), Some((vec!["print".to_string(), "println".to_string()], false)));
}

#[test]
fn editing_while_computing_restarts_on_a_fresh_snapshot() {
	let gated = GatedContributor::new(&["print"], &["println"]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, _presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");

	service.invoke(&mut editor, 1, false).expect("invoke");
	let first = service.session().map(|s| s.id());
	let typed = editor.type_char('n');
	assert_eq!(service.buffer_changed(&mut editor, typed).expect("typed"), PhaseKind::Computing);
	assert_ne!(service.session().map(|s| s.id()), first);
	assert_eq!(service.live_sessions(), 1);
	assert!(wait_until(Duration::from_secs(5), || gated.tokens.lock().len() == 2));
	assert!(gated.tokens.lock()[0].is_cancelled());

	gated.gate.release();
	assert_eq!(tick_until_settled(&mut service, &mut editor, Duration::from_secs(5)), PhaseKind::Computed);
	assert_eq!(labels(&service), vec!["print", "println"]);
	assert_eq!(service.session().map(|s| s.initial_prefix().to_string()), Some("prin".to_string()));
}

#[test]
fn caret_move_while_computing_closes() {
	let gated = GatedContributor::new(&["print"], &[]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, _presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");

	service.invoke(&mut editor, 1, false).expect("invoke");
	let moved = editor.move_caret(0);
	assert_eq!(service.buffer_changed(&mut editor, moved).expect("moved"), PhaseKind::Idle);
	assert_eq!(service.live_sessions(), 0);
	assert!(wait_until(Duration::from_secs(5), || service.workers().live_count() == 0));
}

#[test]
fn cancel_stops_the_worker() {
	let gated = GatedContributor::new(&["print"], &["println"]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, _presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");

	service.invoke(&mut editor, 0, false).expect("invoke");
	assert!(wait_until(Duration::from_secs(5), || gated.tokens.lock().len() == 1));
	service.cancel();
	assert_eq!(service.phase(), PhaseKind::Idle);
	assert!(wait_until(Duration::from_secs(5), || service.workers().live_count() == 0));
	assert!(gated.tokens.lock()[0].is_cancelled());
}

#[test]
fn dropping_the_service_cancels_background_work() {
	let gated = GatedContributor::new(&["print"], &[]);
	let contributor: Arc<dyn Contributor> = gated.clone();
	let (mut service, _presentation) = service(impatient_config(), vec![contributor]);
	let mut editor = MemoryEditor::new("pri");
	service.invoke(&mut editor, 0, false).expect("invoke");
	assert!(wait_until(Duration::from_secs(5), || gated.tokens.lock().len() == 1));
	let workers = service.workers().clone();

	drop(service);
	assert!(gated.tokens.lock()[0].is_cancelled());
	assert!(wait_until(Duration::from_secs(5), || workers.live_count() == 0));
}

#[test]
fn one_batch_per_contributor_sorts_once() {
	let (mut service, _presentation) = service(patient_config(), vec![
		ListContributor::new("a", &["print", "private", "println"]),
		ListContributor::new("b", &["primary", "prism"]),
	]);
	let mut editor = MemoryEditor::new("pri");
	assert_eq!(service.invoke(&mut editor, 1, false).expect("invoke"), PhaseKind::Computed);
	let sorts = service.session().map(|s| s.with_aggregator(|aggregator| aggregator.sort_count()));
	assert_eq!(sorts, Some(1));
}

#[test]
fn concurrent_handles_feed_the_interactive_thread() {
	init_tracing();
	let options = SessionOptions {
		invocation_count: 1,
		strategy: ThreadingStrategy::Asynchronous,
		config: patient_config(),
		ranking: RankingPolicy::default(),
	};
	let live = LiveSessions::new();
	let mut session = Session::new(7, options, WorkerRegistry::new(), &live);
	let finished = session
		.start(vec![ListContributor::new("a", &["pri0"])], MemoryEditor::new("pri").snapshot())
		.expect("start");

	let producers: Vec<_> = (0..4)
		.map(|thread| {
			let handle = session.handle();
			std::thread::spawn(move || {
				for i in 0..25 {
					handle.add_candidate(Candidate::new(format!("pri_{thread}_{i}")));
				}
			})
		})
		.collect();
	for producer in producers {
		producer.join().expect("producer");
	}

	assert!(session.blocking_wait_for_finish(Duration::from_secs(5)));
	assert!(finished.is_finished());
	session.finish_computation();
	assert_eq!(session.item_count(), 101);
	assert_eq!(session.added_count(), 101);
	assert_eq!(live.count(), 1);
	drop(session);
	assert_eq!(live.count(), 0);
}

#[tokio::test]
async fn finish_handle_can_be_awaited() {
	let options = SessionOptions {
		invocation_count: 1,
		strategy: ThreadingStrategy::Asynchronous,
		config: patient_config(),
		ranking: RankingPolicy::default(),
	};
	let mut session = Session::new(1, options, WorkerRegistry::new(), &LiveSessions::new());
	let finished = session
		.start(vec![ListContributor::new("a", &["print"])], MemoryEditor::new("pri").snapshot())
		.expect("start");

	tokio::time::timeout(Duration::from_secs(5), finished.finished()).await.expect("finished in time");
	session.finish_computation();
	assert_eq!(session.view().labels(), vec!["print"]);
}
