//! # Slotwise Core Library
//!
//! Core scheduling engine for slotwise. It implements a CLI-first
//! philosophy where all operations are available via a standalone CLI
//! binary, with any GUI being a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Availability**: pure free/busy tiling over calendar events, working
//!   hours, and protected slots
//! - **Scoring**: weighted, explainable slot scoring with a fixed factor
//!   table
//! - **Suggestions**: ranked candidate slots per task
//! - **Proposals**: batch plans with displacement and a TTL
//! - **Commit**: writes through the calendar/task store ports with retry,
//!   backoff, and per-task isolation
//!
//! ## Key Components
//!
//! - [`compute_availability`]: deterministic free/busy computation
//! - [`SuggestionGenerator`]: ranked slot suggestions
//! - [`ProposalBuilder`]: batch proposals
//! - [`CommitEngine`]: calendar and task store writes
//! - [`EngineConfig`]: TOML configuration management

pub mod availability;
pub mod calendar;
pub mod commit;
pub mod config;
pub mod conflict;
pub mod error;
pub mod proposal;
pub mod rules;
pub mod scoring;
pub mod store;
pub mod suggest;
pub mod task;

pub use availability::{
    availability_fingerprint, compute_availability, AvailabilityCache, AvailabilityWindow,
    DateRange, TimeSlot,
};
pub use calendar::{BufferKind, CalendarEvent, EventDraft, EventStatus};
pub use commit::{
    CommitConfig, CommitEngine, ConfirmApprovals, ConfirmOutcome, FailedPlacement,
    ScheduleTaskResult, ScheduledPlacement,
};
pub use config::EngineConfig;
pub use conflict::{detect_conflicts, has_error, Conflict, ConflictKind, Severity};
pub use error::{CalendarError, ConfigError, Result, SchedulingError, ValidationError};
pub use proposal::{
    typed_blocks_from, Displacement, ProposalBuilder, ProposalEntry, ProposalStatus,
    ProposalSummary, ProposeRequest, ScheduleProposal, SkippedTask,
};
pub use rules::{
    ClockRange, ProtectedSlot, SchedulingRule, TimeOfDay, UserSchedulingPreferences, WorkingHours,
};
pub use scoring::{
    FactorWeights, ScoreContext, ScoringEngine, ScoringFactor, SlotScore, TypedBlock,
};
pub use store::{
    google::GoogleCalendarStore, CalendarStore, MemoryCalendarStore, MemoryTaskStore, TaskStore,
};
pub use suggest::{SuggestRequest, Suggestion, SuggestionGenerator};
pub use task::{SyncStatus, Task, TaskType, TimeOfDayTag};
