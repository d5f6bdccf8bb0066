//! Commit engine: applies slots and proposals to the calendar and task
//! stores.
//!
//! Writes run with a deadline and bounded retries; only failures the
//! calendar store classifies as retryable are retried. Batch confirmation
//! is sequential with per-task isolation, so one failed placement never
//! rolls back or blocks its siblings.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::calendar::{BufferKind, CalendarEvent, EventDraft};
use crate::conflict::{detect_conflicts, has_error, Conflict};
use crate::error::{CalendarError, Result, SchedulingError};
use crate::proposal::{ProposalStatus, ScheduleProposal};
use crate::rules::UserSchedulingPreferences;
use crate::store::{CalendarStore, TaskStore};
use crate::task::{SyncStatus, Task};

/// Write-side knobs for the commit engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Deadline for a single store call, in seconds
    pub write_timeout_secs: u64,
    /// Retries after the first attempt, for retryable failures only
    pub max_retries: u32,
    /// First backoff delay; doubles per retry
    pub backoff_base_ms: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            write_timeout_secs: 10,
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

/// A placement that made it onto the calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPlacement {
    pub task_id: String,
    pub event_id: String,
    pub calendar_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Result of a direct schedule or reschedule call.
///
/// Blocking conflicts are an expected outcome, not an error: the caller
/// gets the conflict list back with `requires_approval` set and nothing
/// mutated, and may re-propose or force.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTaskResult {
    /// Present when a write happened
    pub placement: Option<ScheduledPlacement>,
    pub requires_approval: bool,
    pub conflicts: Vec<Conflict>,
}

/// A placement that failed; its task is marked `sync_status = Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedPlacement {
    pub task_id: String,
    pub error: String,
}

/// Outcome of confirming a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub proposal_id: String,
    pub status: ProposalStatus,
    pub scheduled: Vec<ScheduledPlacement>,
    pub failed: Vec<FailedPlacement>,
    /// Tasks whose entries were not approved and therefore not committed
    pub skipped: Vec<String>,
}

/// Which parts of a proposal the user approved.
#[derive(Debug, Clone, Default)]
pub struct ConfirmApprovals {
    /// Tasks to commit; `None` approves every entry
    pub task_ids: Option<Vec<String>>,
    /// Whether entries that displace another task's event may proceed
    pub displacements_approved: bool,
}

impl ConfirmApprovals {
    /// Approve every entry, displacements included.
    pub fn all() -> Self {
        Self {
            task_ids: None,
            displacements_approved: true,
        }
    }

    fn covers(&self, entry: &crate::proposal::ProposalEntry) -> bool {
        if entry.displacement.is_some() && !self.displacements_approved {
            return false;
        }
        match &self.task_ids {
            Some(ids) => ids.iter().any(|id| *id == entry.task_id),
            None => true,
        }
    }
}

/// Applies schedule decisions to the calendar and task stores.
pub struct CommitEngine<'a, C, T> {
    calendar: &'a C,
    tasks: &'a T,
    config: CommitConfig,
}

impl<'a, C: CalendarStore, T: TaskStore> CommitEngine<'a, C, T> {
    pub fn new(calendar: &'a C, tasks: &'a T) -> Self {
        Self {
            calendar,
            tasks,
            config: CommitConfig::default(),
        }
    }

    pub fn with_config(calendar: &'a C, tasks: &'a T, config: CommitConfig) -> Self {
        Self {
            calendar,
            tasks,
            config,
        }
    }

    /// Place one task at `[start, end)`; also reschedules, since a task
    /// that already holds an event is moved rather than duplicated.
    ///
    /// Blocking conflicts return `requires_approval` without writing
    /// unless `force` is set. Buffer events are written best effort; their
    /// failure does not fail the placement.
    pub async fn schedule_task(
        &self,
        task_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        events: &[CalendarEvent],
        prefs: &UserSchedulingPreferences,
        force: bool,
    ) -> Result<ScheduleTaskResult> {
        if start >= end {
            return Err(crate::error::ValidationError::InvalidTimeRange { start, end }.into());
        }
        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| SchedulingError::TaskNotFound(task_id.to_string()))?;

        let rule = task.task_type.and_then(|t| prefs.resolve_rule(t));
        let conflicts = detect_conflicts(
            &task,
            start,
            end,
            events,
            &prefs.protected_slots,
            &prefs.working_hours,
            rule,
        );
        if has_error(&conflicts) && !force {
            return Ok(ScheduleTaskResult {
                placement: None,
                requires_approval: true,
                conflicts,
            });
        }

        let calendar_id = prefs.calendar_for(rule).to_string();
        let placement = match self.write_placement(&task, &calendar_id, start, end).await {
            Ok(placement) => placement,
            Err(error) => {
                if let Err(save_error) = self
                    .tasks
                    .save_schedule(
                        task_id,
                        task.calendar_event_id.clone(),
                        task.calendar_id.clone(),
                        task.scheduled_start,
                        task.scheduled_end,
                        SyncStatus::Error,
                    )
                    .await
                {
                    warn!(task_id, %save_error, "could not record sync error");
                }
                return Err(error);
            }
        };

        // A reschedule leaves its old buffer events behind; sweep them
        // before writing the new ones.
        if let (Some(old_calendar), Some(old_start), Some(old_end)) =
            (&task.calendar_id, task.scheduled_start, task.scheduled_end)
        {
            if let Err(error) = self
                .purge_linked_events(
                    old_calendar,
                    &task.id,
                    old_start,
                    old_end,
                    Some(&placement.event_id),
                )
                .await
            {
                warn!(task_id, %error, "stale buffer cleanup failed");
            }
        }

        let (buffer_before, buffer_after) = match rule {
            Some(rule) => (rule.buffer_before, rule.buffer_after),
            None => (task.buffer_before, task.buffer_after),
        };
        self.write_buffers(&task, &calendar_id, start, end, buffer_before, buffer_after)
            .await;

        self.tasks
            .save_schedule(
                task_id,
                Some(placement.event_id.clone()),
                Some(calendar_id),
                Some(start),
                Some(end),
                SyncStatus::Synced,
            )
            .await?;
        info!(task_id, event_id = %placement.event_id, "task scheduled");
        Ok(ScheduleTaskResult {
            placement: Some(placement),
            requires_approval: false,
            conflicts,
        })
    }

    /// Remove a task's events from the calendar and clear its schedule.
    ///
    /// Idempotent: missing events are treated as already removed.
    pub async fn unschedule_task(&self, task_id: &str) -> Result<()> {
        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| SchedulingError::TaskNotFound(task_id.to_string()))?;

        if let (Some(calendar_id), Some(start), Some(end)) =
            (&task.calendar_id, task.scheduled_start, task.scheduled_end)
        {
            self.purge_linked_events(calendar_id, &task.id, start, end, None)
                .await?;
        }

        self.tasks
            .save_schedule(task_id, None, None, None, None, SyncStatus::Pending)
            .await?;
        info!(task_id, "task unscheduled");
        Ok(())
    }

    /// Confirm the approved entries of a proposal, entry by entry.
    ///
    /// Entries are committed sequentially in proposal order. Unapproved
    /// entries (and displacement entries without displacement consent) are
    /// skipped, not failed. A failed entry marks only its own task as
    /// errored, keeping its prior scheduling state; processing continues
    /// with the rest. The caller must not run more than one confirmation
    /// per user at a time; the engine does not serialize concurrent
    /// confirmations.
    pub async fn confirm_proposal(
        &self,
        proposal: &ScheduleProposal,
        prefs: &UserSchedulingPreferences,
        approvals: &ConfirmApprovals,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome> {
        proposal.ensure_fresh(now)?;

        let mut scheduled = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();

        for entry in &proposal.entries {
            if !approvals.covers(entry) {
                skipped.push(entry.task_id.clone());
                continue;
            }
            let result = self.commit_entry(entry, prefs).await;
            match result {
                Ok(placement) => scheduled.push(placement),
                Err(error) => {
                    warn!(task_id = %entry.task_id, %error, "placement failed");
                    self.mark_sync_error(&entry.task_id).await;
                    failed.push(FailedPlacement {
                        task_id: entry.task_id.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        let status = if scheduled.len() == proposal.entries.len() {
            ProposalStatus::Confirmed
        } else if scheduled.is_empty() {
            ProposalStatus::Cancelled
        } else {
            ProposalStatus::PartiallyConfirmed
        };
        Ok(ConfirmOutcome {
            proposal_id: proposal.id.clone(),
            status,
            scheduled,
            failed,
            skipped,
        })
    }

    /// Record `sync_status = Error` while keeping the task's current
    /// scheduling fields; a failure never clears a live event link.
    async fn mark_sync_error(&self, task_id: &str) {
        // Best effort; the original failure is what matters.
        let prior = match self.tasks.get_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(error) => {
                warn!(task_id, %error, "could not read task to record sync error");
                return;
            }
        };
        if let Err(save_error) = self
            .tasks
            .save_schedule(
                task_id,
                prior.calendar_event_id.clone(),
                prior.calendar_id.clone(),
                prior.scheduled_start,
                prior.scheduled_end,
                SyncStatus::Error,
            )
            .await
        {
            warn!(task_id, %save_error, "could not record sync error");
        }
    }

    async fn commit_entry(
        &self,
        entry: &crate::proposal::ProposalEntry,
        prefs: &UserSchedulingPreferences,
    ) -> Result<ScheduledPlacement> {
        let task = self
            .tasks
            .get_task(&entry.task_id)
            .await?
            .ok_or_else(|| SchedulingError::TaskNotFound(entry.task_id.clone()))?;

        // Displacement moves first and is verified before the new event is
        // created, so a failed move leaves the calendar untouched.
        if let Some(displacement) = &entry.displacement {
            let moved = self
                .with_retry(|| {
                    self.calendar.move_event(
                        &displacement.calendar_id,
                        &displacement.event_id,
                        displacement.to_start,
                        displacement.to_end,
                    )
                })
                .await?;
            if moved.start != displacement.to_start || moved.end != displacement.to_end {
                return Err(SchedulingError::Custom(format!(
                    "displaced event {} did not land at the requested time",
                    displacement.event_id
                )));
            }
            self.tasks
                .save_schedule(
                    &displacement.task_id,
                    Some(displacement.event_id.clone()),
                    Some(displacement.calendar_id.clone()),
                    Some(displacement.to_start),
                    Some(displacement.to_end),
                    SyncStatus::Synced,
                )
                .await?;
        }

        let placement = self
            .write_placement(&task, &entry.calendar_id, entry.start, entry.end)
            .await?;

        let rule = task.task_type.and_then(|t| prefs.resolve_rule(t));
        let (buffer_before, buffer_after) = match rule {
            Some(rule) => (rule.buffer_before, rule.buffer_after),
            None => (task.buffer_before, task.buffer_after),
        };
        self.write_buffers(
            &task,
            &entry.calendar_id,
            entry.start,
            entry.end,
            buffer_before,
            buffer_after,
        )
        .await;

        self.tasks
            .save_schedule(
                &entry.task_id,
                Some(placement.event_id.clone()),
                Some(entry.calendar_id.clone()),
                Some(entry.start),
                Some(entry.end),
                SyncStatus::Synced,
            )
            .await?;
        Ok(placement)
    }

    /// Create the task's event, or move the one it already holds.
    async fn write_placement(
        &self,
        task: &Task,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ScheduledPlacement> {
        let event = if let (Some(event_id), Some(existing_calendar)) =
            (&task.calendar_event_id, &task.calendar_id)
        {
            if existing_calendar == calendar_id {
                self.with_retry(|| self.calendar.move_event(calendar_id, event_id, start, end))
                    .await?
            } else {
                // Changing calendars: drop the old event, create fresh.
                self.delete_tolerating_gone(existing_calendar, event_id)
                    .await?;
                let draft =
                    EventDraft::for_task(calendar_id, task.title.clone(), start, end, &task.id);
                self.with_retry(|| self.calendar.create_event(&draft)).await?
            }
        } else {
            let draft = EventDraft::for_task(calendar_id, task.title.clone(), start, end, &task.id);
            self.with_retry(|| self.calendar.create_event(&draft)).await?
        };

        Ok(ScheduledPlacement {
            task_id: task.id.clone(),
            event_id: event.id,
            calendar_id: calendar_id.to_string(),
            start,
            end,
        })
    }

    /// Best-effort buffer events around a placement.
    async fn write_buffers(
        &self,
        task: &Task,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        buffer_before: i64,
        buffer_after: i64,
    ) {
        for (minutes, kind, buf_start, buf_end) in [
            (
                buffer_before,
                BufferKind::Before,
                start - ChronoDuration::minutes(buffer_before),
                start,
            ),
            (
                buffer_after,
                BufferKind::After,
                end,
                end + ChronoDuration::minutes(buffer_after),
            ),
        ] {
            if minutes <= 0 {
                continue;
            }
            let draft = EventDraft::buffer(calendar_id, &task.id, kind, buf_start, buf_end);
            if let Err(error) = self.with_retry(|| self.calendar.create_event(&draft)).await {
                warn!(task_id = %task.id, %error, "buffer event not created");
            }
        }
    }

    /// Delete every event linked to `task_id` near its scheduled window.
    async fn purge_linked_events(
        &self,
        calendar_id: &str,
        task_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        keep_event_id: Option<&str>,
    ) -> Result<()> {
        // Widened so buffer events on either side are included.
        let from = start - ChronoDuration::hours(2);
        let to = end + ChronoDuration::hours(2);
        let events = self
            .with_retry(|| self.calendar.list_events(calendar_id, from, to))
            .await?;
        for event in events {
            if event.task_id.as_deref() == Some(task_id) && Some(event.id.as_str()) != keep_event_id
            {
                self.delete_tolerating_gone(calendar_id, &event.id).await?;
            }
        }
        Ok(())
    }

    async fn delete_tolerating_gone(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        match self
            .with_retry(|| self.calendar.delete_event(calendar_id, event_id))
            .await
        {
            Ok(()) | Err(CalendarError::Gone(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Run a store call under the configured deadline, retrying retryable
    /// failures with exponential backoff.
    async fn with_retry<V, F, Fut>(&self, mut op: F) -> Result<V, CalendarError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V, CalendarError>>,
    {
        let deadline = Duration::from_secs(self.config.write_timeout_secs);
        let mut backoff = Duration::from_millis(self.config.backoff_base_ms);
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(deadline, op()).await {
                Ok(result) => result,
                Err(_) => Err(CalendarError::Timeout {
                    timeout_secs: self.config.write_timeout_secs,
                }),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(%error, attempt, "calendar write failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{ProposalEntry, ProposalStatus};
    use crate::rules::{ClockRange, WorkingHours};
    use crate::store::{MemoryCalendarStore, MemoryTaskStore};
    use chrono::TimeZone;

    fn prefs() -> UserSchedulingPreferences {
        UserSchedulingPreferences {
            default_calendar_id: "primary".into(),
            preferred_calendar_id: None,
            working_hours: WorkingHours::weekdays(ClockRange::parse("09:00", "17:00").unwrap()),
            rules: vec![],
            protected_slots: vec![],
            default_buffer_before: 0,
            default_buffer_after: 0,
            keep_slots_free_for_calls: false,
            timezone: "UTC".into(),
            auto_schedule: false,
            prefer_contiguous_blocks: false,
        }
    }

    fn fast_config() -> CommitConfig {
        CommitConfig {
            write_timeout_secs: 5,
            max_retries: 2,
            backoff_base_ms: 1,
        }
    }

    fn monday_at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, 0, 0).unwrap()
    }

    fn entry(task_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ProposalEntry {
        ProposalEntry {
            task_id: task_id.to_string(),
            title: format!("Task {}", task_id),
            start,
            end,
            calendar_id: "primary".into(),
            score: 80.0,
            reasoning: String::new(),
            alternatives: vec![],
            recommended_index: 0,
            displacement: None,
            requires_approval: false,
        }
    }

    fn proposal(entries: Vec<ProposalEntry>, now: DateTime<Utc>) -> ScheduleProposal {
        let summary = crate::proposal::ProposalSummary {
            total_tasks: entries.len(),
            schedulable_tasks: entries.len(),
            conflicted_tasks: 0,
            total_minutes: entries.iter().map(|e| (e.end - e.start).num_minutes()).sum(),
        };
        ScheduleProposal {
            id: "prop-1".into(),
            status: ProposalStatus::Pending,
            entries,
            skipped: vec![],
            summary,
            created_at: now,
            expires_at: now + ChronoDuration::minutes(30),
        }
    }

    #[tokio::test]
    async fn schedule_creates_and_links() {
        let calendar = MemoryCalendarStore::new();
        let tasks = MemoryTaskStore::with_tasks(vec![Task::new("t1", "Write report")]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        let result = engine
            .schedule_task("t1", monday_at(9), monday_at(10), &[], &prefs(), false)
            .await
            .unwrap();
        assert!(!result.requires_approval);
        let placement = result.placement.unwrap();

        let task = tasks.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.calendar_event_id.as_deref(), Some(placement.event_id.as_str()));
        assert_eq!(task.sync_status, SyncStatus::Synced);
        assert_eq!(calendar.events().len(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let calendar = MemoryCalendarStore::new();
        calendar.fail_next(CalendarError::Transient("503".into()));
        let tasks = MemoryTaskStore::with_tasks(vec![Task::new("t1", "Work")]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        let result = engine
            .schedule_task("t1", monday_at(9), monday_at(10), &[], &prefs(), false)
            .await
            .unwrap();
        assert!(result.placement.is_some());
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calendar = MemoryCalendarStore::new();
        calendar.fail_next(CalendarError::AuthenticationRequired);
        let tasks = MemoryTaskStore::with_tasks(vec![Task::new("t1", "Work")]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        let result = engine
            .schedule_task("t1", monday_at(9), monday_at(10), &[], &prefs(), false)
            .await;
        assert!(result.is_err());
        // The single queued failure consumed the only attempt.
        assert!(calendar.events().is_empty());
    }

    #[tokio::test]
    async fn blocking_conflict_rejected_unless_forced() {
        let busy = CalendarEvent {
            id: "ev1".into(),
            calendar_id: "primary".into(),
            title: "Standup".into(),
            start: monday_at(9),
            end: monday_at(10),
            all_day: false,
            status: crate::calendar::EventStatus::Confirmed,
            task_id: None,
            buffer: None,
            recurring_event_id: None,
        };
        let calendar = MemoryCalendarStore::new();
        let tasks = MemoryTaskStore::with_tasks(vec![Task::new("t1", "Work")]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());
        let events = [busy];

        let rejected = engine
            .schedule_task("t1", monday_at(9), monday_at(10), &events, &prefs(), false)
            .await
            .unwrap();
        assert!(rejected.requires_approval);
        assert!(rejected.placement.is_none());
        assert!(rejected
            .conflicts
            .iter()
            .any(|c| c.kind == crate::conflict::ConflictKind::Overlap));
        // Nothing was written.
        assert!(calendar.events().is_empty());

        let forced = engine
            .schedule_task("t1", monday_at(9), monday_at(10), &events, &prefs(), true)
            .await
            .unwrap();
        assert!(forced.placement.is_some());
    }

    #[tokio::test]
    async fn unknown_task_is_reported() {
        let calendar = MemoryCalendarStore::new();
        let tasks = MemoryTaskStore::new();
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());
        let result = engine
            .schedule_task("missing", monday_at(9), monday_at(10), &[], &prefs(), false)
            .await;
        assert!(matches!(result, Err(SchedulingError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn confirm_isolates_failures_per_task() {
        let calendar = MemoryCalendarStore::new();
        let tasks = MemoryTaskStore::with_tasks(vec![
            Task::new("a", "Task a"),
            Task::new("b", "Task b"),
        ]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        // First create fails permanently, second succeeds.
        calendar.fail_next(CalendarError::AuthenticationRequired);
        let now = monday_at(8);
        let p = proposal(
            vec![
                entry("a", monday_at(9), monday_at(10)),
                entry("b", monday_at(10), monday_at(11)),
            ],
            now,
        );

        let outcome = engine
            .confirm_proposal(&p, &prefs(), &ConfirmApprovals::all(), now)
            .await
            .unwrap();
        assert_eq!(outcome.status, ProposalStatus::PartiallyConfirmed);
        assert_eq!(outcome.scheduled.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].task_id, "a");

        let failed_task = tasks.get_task("a").await.unwrap().unwrap();
        assert_eq!(failed_task.sync_status, SyncStatus::Error);
        let ok_task = tasks.get_task("b").await.unwrap().unwrap();
        assert_eq!(ok_task.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn confirm_failure_keeps_prior_schedule() {
        let old_event = CalendarEvent {
            id: "ev-old".into(),
            calendar_id: "primary".into(),
            title: "Task a".into(),
            start: monday_at(13),
            end: monday_at(14),
            all_day: false,
            status: crate::calendar::EventStatus::Confirmed,
            task_id: Some("a".into()),
            buffer: None,
            recurring_event_id: None,
        };
        let calendar = MemoryCalendarStore::with_events(vec![old_event]);
        let tasks = MemoryTaskStore::with_tasks(vec![{
            let mut t = Task::new("a", "Task a");
            t.calendar_event_id = Some("ev-old".into());
            t.calendar_id = Some("primary".into());
            t.scheduled_start = Some(monday_at(13));
            t.scheduled_end = Some(monday_at(14));
            t.sync_status = SyncStatus::Synced;
            t
        }]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        calendar.fail_next(CalendarError::AuthenticationRequired);
        let now = monday_at(8);
        let p = proposal(vec![entry("a", monday_at(9), monday_at(10))], now);
        let outcome = engine
            .confirm_proposal(&p, &prefs(), &ConfirmApprovals::all(), now)
            .await
            .unwrap();
        assert_eq!(outcome.failed.len(), 1);

        // The old event link survives; only the sync status flips.
        let task = tasks.get_task("a").await.unwrap().unwrap();
        assert_eq!(task.calendar_event_id.as_deref(), Some("ev-old"));
        assert_eq!(task.calendar_id.as_deref(), Some("primary"));
        assert_eq!(task.scheduled_start, Some(monday_at(13)));
        assert_eq!(task.scheduled_end, Some(monday_at(14)));
        assert_eq!(task.sync_status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn confirm_commits_only_approved_entries() {
        let calendar = MemoryCalendarStore::new();
        let tasks = MemoryTaskStore::with_tasks(vec![
            Task::new("a", "Task a"),
            Task::new("b", "Task b"),
        ]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        let now = monday_at(8);
        let p = proposal(
            vec![
                entry("a", monday_at(9), monday_at(10)),
                entry("b", monday_at(10), monday_at(11)),
            ],
            now,
        );
        let approvals = ConfirmApprovals {
            task_ids: Some(vec!["a".into()]),
            displacements_approved: false,
        };
        let outcome = engine
            .confirm_proposal(&p, &prefs(), &approvals, now)
            .await
            .unwrap();

        assert_eq!(outcome.status, ProposalStatus::PartiallyConfirmed);
        assert_eq!(outcome.scheduled.len(), 1);
        assert_eq!(outcome.scheduled[0].task_id, "a");
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.skipped, vec!["b".to_string()]);
        // The skipped task was never touched.
        let untouched = tasks.get_task("b").await.unwrap().unwrap();
        assert!(!untouched.is_scheduled());
        assert_eq!(calendar.events().len(), 1);
    }

    #[tokio::test]
    async fn displacement_needs_explicit_consent() {
        let calendar = MemoryCalendarStore::new();
        let tasks = MemoryTaskStore::with_tasks(vec![
            Task::new("urgent", "Urgent"),
            Task::new("low", "Low"),
        ]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        let now = monday_at(8);
        let mut e = entry("urgent", monday_at(9), monday_at(10));
        e.displacement = Some(crate::proposal::Displacement {
            event_id: "ev-low".into(),
            calendar_id: "primary".into(),
            task_id: "low".into(),
            from_start: monday_at(9),
            from_end: monday_at(10),
            to_start: monday_at(14),
            to_end: monday_at(15),
            reason: "makes room for 'Urgent'".into(),
        });
        let approvals = ConfirmApprovals {
            task_ids: None,
            displacements_approved: false,
        };
        let outcome = engine
            .confirm_proposal(&proposal(vec![e], now), &prefs(), &approvals, now)
            .await
            .unwrap();

        assert_eq!(outcome.status, ProposalStatus::Cancelled);
        assert_eq!(outcome.skipped, vec!["urgent".to_string()]);
        assert!(calendar.events().is_empty());
    }

    #[tokio::test]
    async fn expired_proposal_is_rejected() {
        let calendar = MemoryCalendarStore::new();
        let tasks = MemoryTaskStore::with_tasks(vec![Task::new("a", "Task a")]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        let created = monday_at(8);
        let p = proposal(vec![entry("a", monday_at(9), monday_at(10))], created);
        let later = created + ChronoDuration::hours(1);

        let result = engine
            .confirm_proposal(&p, &prefs(), &ConfirmApprovals::all(), later)
            .await;
        assert!(matches!(result, Err(SchedulingError::StaleProposal { .. })));
        assert!(calendar.events().is_empty());
    }

    #[tokio::test]
    async fn displacement_moves_before_creating() {
        let low_event = CalendarEvent {
            id: "ev-low".into(),
            calendar_id: "primary".into(),
            title: "Low".into(),
            start: monday_at(9),
            end: monday_at(10),
            all_day: false,
            status: crate::calendar::EventStatus::Confirmed,
            task_id: Some("low".into()),
            buffer: None,
            recurring_event_id: None,
        };
        let calendar = MemoryCalendarStore::with_events(vec![low_event]);
        let tasks = MemoryTaskStore::with_tasks(vec![
            Task::new("urgent", "Urgent"),
            Task::new("low", "Low"),
        ]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        let now = monday_at(8);
        let mut e = entry("urgent", monday_at(9), monday_at(10));
        e.displacement = Some(crate::proposal::Displacement {
            event_id: "ev-low".into(),
            calendar_id: "primary".into(),
            task_id: "low".into(),
            from_start: monday_at(9),
            from_end: monday_at(10),
            to_start: monday_at(14),
            to_end: monday_at(15),
            reason: "makes room for 'Urgent'".into(),
        });
        let outcome = engine
            .confirm_proposal(&proposal(vec![e], now), &prefs(), &ConfirmApprovals::all(), now)
            .await
            .unwrap();

        assert_eq!(outcome.status, ProposalStatus::Confirmed);
        let events = calendar.events();
        let moved = events.iter().find(|ev| ev.id == "ev-low").unwrap();
        assert_eq!(moved.start, monday_at(14));
        let low_task = tasks.get_task("low").await.unwrap().unwrap();
        assert_eq!(low_task.scheduled_start, Some(monday_at(14)));
        assert_eq!(low_task.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn unschedule_removes_linked_events() {
        let calendar = MemoryCalendarStore::new();
        let tasks = MemoryTaskStore::with_tasks(vec![{
            let mut t = Task::new("t1", "Work");
            t.buffer_after = 10;
            t
        }]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        engine
            .schedule_task("t1", monday_at(9), monday_at(10), &[], &prefs(), false)
            .await
            .unwrap();
        // Main event plus the after-buffer.
        assert_eq!(calendar.events().len(), 2);

        engine.unschedule_task("t1").await.unwrap();
        assert!(calendar.events().is_empty());
        let task = tasks.get_task("t1").await.unwrap().unwrap();
        assert!(!task.is_scheduled());
        assert_eq!(task.sync_status, SyncStatus::Pending);

        // Idempotent: a second unschedule is a no-op, not an error.
        engine.unschedule_task("t1").await.unwrap();
    }

    #[tokio::test]
    async fn reschedule_moves_and_sweeps_old_buffers() {
        let calendar = MemoryCalendarStore::new();
        let tasks = MemoryTaskStore::with_tasks(vec![{
            let mut t = Task::new("t1", "Work");
            t.buffer_before = 10;
            t
        }]);
        let engine = CommitEngine::with_config(&calendar, &tasks, fast_config());

        engine
            .schedule_task("t1", monday_at(9), monday_at(10), &[], &prefs(), false)
            .await
            .unwrap();
        assert_eq!(calendar.events().len(), 2);

        engine
            .schedule_task("t1", monday_at(14), monday_at(15), &[], &prefs(), false)
            .await
            .unwrap();
        // Still one main event plus one buffer, both at the new slot.
        let events = calendar.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.start >= monday_at(13)));
        let task = tasks.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.scheduled_start, Some(monday_at(14)));
    }
}
