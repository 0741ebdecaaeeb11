#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Completion sessions for a live, constantly changing buffer.
//!
//! One [`CompletionService`] per editing surface arbitrates every trigger
//! through a single [`PhaseCell`], so at most one [`Session`] is ever live.
//! Sessions run their [`Contributor`]s either in-line
//! ([`ThreadingStrategy::Synchronous`]) or on a dedicated worker
//! ([`ThreadingStrategy::Asynchronous`]), and the [`ResultAggregator`]
//! dedupes, ranks and groups what they produce.
//!
//! # Main Types
//!
//! - [`CompletionService`] - trigger API and interactive-thread tick loop
//! - [`Phase`] - what completion is doing right now
//! - [`Session`] - one completion attempt
//! - [`ResultAggregator`] - candidate ordering and the lookup view
//! - [`EditorSurface`] / [`Presentation`] - the host's side of the contract

pub mod aggregator;
pub mod buffer;
pub mod candidate;
pub mod config;
pub mod contributor;
pub mod error;
pub mod listeners;
pub mod matcher;
pub mod phase;
pub mod presentation;
pub mod ranking;
pub mod service;
pub mod session;
pub mod state;
pub mod threading;

pub use aggregator::{AddOutcome, ResultAggregator};
pub use buffer::{BufferEvent, BufferSnapshot, CommitState, EditorSurface, MemoryEditor, ReadAccess, TrackedRange, is_identifier_char};
pub use candidate::{Candidate, CandidateId, GroupId, InsertBehavior, RankingHints};
pub use config::CompletionConfig;
pub use contributor::{CompletionParameters, Contributor, ResultSink, RunOutcome};
pub use error::{CompletionError, ConfigError, ContributorError, EditError, Interrupted, Result};
pub use listeners::{Interest, ListenerArena, Subscription};
pub use matcher::{MatchKind, PrefixMatcher};
pub use phase::{Phase, PhaseKind, RestorePrefix, TriggerAction, ZombieState, next_invocation_count};
pub use presentation::{Headless, LookupRow, LookupView, Presentation};
pub use ranking::{
	DefaultWeigher, NoStatistics, ProximityTiebreak, RankingPolicy, RankingVector, RecentSelections, SkipPredicate, UsageStatistics,
	WeighContext, Weigher,
};
pub use service::{CompletionService, NO_SUGGESTIONS};
pub use session::{FinishHandle, LiveSessions, Session, SessionHandle, SessionOptions};
pub use state::{PhaseCell, PhaseSnapshot, PhaseWatch, TriggerDecision};
pub use threading::{BatchGuard, ThreadingStrategy};
