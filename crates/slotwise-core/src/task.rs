//! Task model with the scheduling extension fields mutated by the commit
//! engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of work a task represents; drives rule selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DeepWork,
    Coding,
    Call,
    Meeting,
    Personal,
    Admin,
    Health,
    Other,
}

/// Rough time-of-day preference used when no rule covers the task type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDayTag {
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDayTag {
    /// Canonical hour window for the tag (start inclusive, end exclusive).
    pub fn hour_window(&self) -> (u32, u32) {
        match self {
            TimeOfDayTag::Morning => (6, 12),
            TimeOfDayTag::Afternoon => (12, 17),
            TimeOfDayTag::Evening => (17, 22),
        }
    }
}

/// Calendar synchronization state of a task.
///
/// `Pending` exists only transiently between request submission and the
/// store response; timeouts and failures must land on `Error`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Error,
    Orphaned,
}

/// A schedulable task.
///
/// The scheduling extension fields (`calendar_event_id`, `scheduled_start`,
/// `scheduled_end`, `sync_status`, buffers) are owned by the task store and
/// only mutated through the commit engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Task title
    pub title: String,
    /// Optional longer description
    pub description: Option<String>,
    /// Priority 0-100, higher schedules first
    pub priority: Option<i32>,
    /// Optional due date
    pub due_at: Option<DateTime<Utc>>,
    /// Optional time-of-day preference when no rule applies
    pub time_of_day: Option<TimeOfDayTag>,
    /// Estimated duration in minutes
    pub duration_minutes: Option<i64>,
    /// Completed flag
    pub completed: bool,
    /// Archived flag; archived tasks are never scheduled
    pub archived: bool,
    /// Urgent tasks may override protected slots that allow it
    pub urgent: bool,
    /// Kind of work, used to pick the authoritative scheduling rule
    pub task_type: Option<TaskType>,
    /// Linked calendar event, set once scheduled
    pub calendar_event_id: Option<String>,
    /// Calendar holding the linked event
    pub calendar_id: Option<String>,
    /// Committed slot start
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Committed slot end
    pub scheduled_end: Option<DateTime<Utc>>,
    /// Calendar synchronization state
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Buffer minutes reserved before the task
    #[serde(default)]
    pub buffer_before: i64,
    /// Buffer minutes reserved after the task
    #[serde(default)]
    pub buffer_after: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Minimal task with defaults for everything optional.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            priority: None,
            due_at: None,
            time_of_day: None,
            duration_minutes: None,
            completed: false,
            archived: false,
            urgent: false,
            task_type: None,
            calendar_event_id: None,
            calendar_id: None,
            scheduled_start: None,
            scheduled_end: None,
            sync_status: SyncStatus::Pending,
            buffer_before: 0,
            buffer_after: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Effective priority with the neutral default applied.
    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(50)
    }

    /// Whether the task currently holds a committed slot.
    pub fn is_scheduled(&self) -> bool {
        self.calendar_event_id.is_some()
            && self.scheduled_start.is_some()
            && self.scheduled_end.is_some()
    }

    /// Whether the task should be considered for scheduling at all.
    pub fn is_schedulable(&self) -> bool {
        !self.completed && !self.archived
    }

    /// Invariant: `sync_status == Synced` requires a linked event.
    pub fn sync_state_consistent(&self) -> bool {
        self.sync_status != SyncStatus::Synced || self.calendar_event_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_defaults() {
        let task = Task::new("t1", "Write report");
        assert_eq!(task.effective_priority(), 50);
        assert!(!task.is_scheduled());
        assert!(task.is_schedulable());
        assert_eq!(task.sync_status, SyncStatus::Pending);
        assert!(task.sync_state_consistent());
    }

    #[test]
    fn synced_without_event_is_inconsistent() {
        let mut task = Task::new("t1", "Write report");
        task.sync_status = SyncStatus::Synced;
        assert!(!task.sync_state_consistent());
        task.calendar_event_id = Some("ev-1".into());
        assert!(task.sync_state_consistent());
    }

    #[test]
    fn task_type_round_trips_snake_case() {
        let json = serde_json::to_string(&TaskType::DeepWork).unwrap();
        assert_eq!(json, "\"deep_work\"");
        let decoded: TaskType = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, TaskType::DeepWork);
    }

    #[test]
    fn time_of_day_windows() {
        assert_eq!(TimeOfDayTag::Morning.hour_window(), (6, 12));
        assert_eq!(TimeOfDayTag::Evening.hour_window(), (17, 22));
    }
}
