//! Storage ports for calendars and tasks.
//!
//! The commit engine talks to these traits only; the Google adapter and the
//! in-memory test doubles live behind them.

pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::calendar::{CalendarEvent, EventDraft, EventStatus};
use crate::error::CalendarError;
use crate::task::{SyncStatus, Task};

/// External calendar operations the engine needs.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Events intersecting `[from, to)` on one calendar.
    async fn list_events(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    async fn get_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<CalendarEvent, CalendarError>;

    async fn create_event(&self, draft: &EventDraft) -> Result<CalendarEvent, CalendarError>;

    /// Move an existing event to a new interval.
    async fn move_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent, CalendarError>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str)
        -> Result<(), CalendarError>;
}

/// Task persistence operations the engine needs.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, CalendarError>;

    /// Persist the scheduling extension fields of a task.
    async fn save_schedule(
        &self,
        task_id: &str,
        calendar_event_id: Option<String>,
        calendar_id: Option<String>,
        scheduled_start: Option<DateTime<Utc>>,
        scheduled_end: Option<DateTime<Utc>>,
        sync_status: SyncStatus,
    ) -> Result<(), CalendarError>;
}

/// In-memory calendar store for tests and the snapshot-driven CLI.
///
/// Failures can be queued to exercise retry and isolation behavior.
#[derive(Default)]
pub struct MemoryCalendarStore {
    inner: Mutex<MemoryCalendarInner>,
}

#[derive(Default)]
struct MemoryCalendarInner {
    events: Vec<CalendarEvent>,
    queued_failures: Vec<CalendarError>,
    next_id: u64,
}

impl MemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            inner: Mutex::new(MemoryCalendarInner {
                events,
                queued_failures: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Queue an error to be returned by the next mutating call.
    pub fn fail_next(&self, error: CalendarError) {
        self.lock().queued_failures.push(error);
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryCalendarInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take_failure(inner: &mut MemoryCalendarInner) -> Option<CalendarError> {
        if inner.queued_failures.is_empty() {
            None
        } else {
            Some(inner.queued_failures.remove(0))
        }
    }
}

#[async_trait]
impl CalendarStore for MemoryCalendarStore {
    async fn list_events(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let inner = self.lock();
        Ok(inner
            .events
            .iter()
            .filter(|e| e.calendar_id == calendar_id && e.start < to && e.end > from)
            .cloned()
            .collect())
    }

    async fn get_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<CalendarEvent, CalendarError> {
        let inner = self.lock();
        inner
            .events
            .iter()
            .find(|e| e.calendar_id == calendar_id && e.id == event_id)
            .cloned()
            .ok_or_else(|| CalendarError::Gone(format!("event {} not found", event_id)))
    }

    async fn create_event(&self, draft: &EventDraft) -> Result<CalendarEvent, CalendarError> {
        let mut inner = self.lock();
        if let Some(error) = Self::take_failure(&mut inner) {
            return Err(error);
        }
        inner.next_id += 1;
        let event = CalendarEvent {
            id: format!("ev-{}", inner.next_id),
            calendar_id: draft.calendar_id.clone(),
            title: draft.title.clone(),
            start: draft.start,
            end: draft.end,
            all_day: false,
            status: EventStatus::Confirmed,
            task_id: draft.task_id.clone(),
            buffer: draft.buffer,
            recurring_event_id: None,
        };
        inner.events.push(event.clone());
        Ok(event)
    }

    async fn move_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent, CalendarError> {
        let mut inner = self.lock();
        if let Some(error) = Self::take_failure(&mut inner) {
            return Err(error);
        }
        let event = inner
            .events
            .iter_mut()
            .find(|e| e.calendar_id == calendar_id && e.id == event_id)
            .ok_or_else(|| CalendarError::Gone(format!("event {} not found", event_id)))?;
        event.start = start;
        event.end = end;
        Ok(event.clone())
    }

    async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        let mut inner = self.lock();
        if let Some(error) = Self::take_failure(&mut inner) {
            return Err(error);
        }
        let before = inner.events.len();
        inner
            .events
            .retain(|e| !(e.calendar_id == calendar_id && e.id == event_id));
        if inner.events.len() == before {
            return Err(CalendarError::Gone(format!("event {} not found", event_id)));
        }
        Ok(())
    }
}

/// In-memory task store.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<String, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks.into_iter().map(|t| (t.id.clone(), t)).collect()),
        }
    }

    pub fn insert(&self, task: Task) {
        self.lock().insert(task.id.clone(), task);
    }

    pub fn snapshot(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.lock().values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Task>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, CalendarError> {
        Ok(self.lock().get(task_id).cloned())
    }

    async fn save_schedule(
        &self,
        task_id: &str,
        calendar_event_id: Option<String>,
        calendar_id: Option<String>,
        scheduled_start: Option<DateTime<Utc>>,
        scheduled_end: Option<DateTime<Utc>>,
        sync_status: SyncStatus,
    ) -> Result<(), CalendarError> {
        let mut tasks = self.lock();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| CalendarError::Api(format!("task {} not found", task_id)))?;
        task.calendar_event_id = calendar_event_id;
        task.calendar_id = calendar_id;
        task.scheduled_start = scheduled_start;
        task.scheduled_end = scheduled_end;
        task.sync_status = sync_status;
        task.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft(start_hour: u32) -> EventDraft {
        EventDraft::for_task(
            "primary",
            "Focus block",
            Utc.with_ymd_and_hms(2025, 6, 2, start_hour, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 2, start_hour + 1, 0, 0).unwrap(),
            "t1",
        )
    }

    #[tokio::test]
    async fn memory_calendar_crud() {
        let store = MemoryCalendarStore::new();
        let created = store.create_event(&draft(10)).await.unwrap();
        assert_eq!(created.task_id.as_deref(), Some("t1"));

        let listed = store
            .list_events(
                "primary",
                Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let moved = store
            .move_event(
                "primary",
                &created.id,
                Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 6, 2, 15, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(moved.start, Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap());

        store.delete_event("primary", &created.id).await.unwrap();
        assert!(store.events().is_empty());
        assert!(matches!(
            store.get_event("primary", &created.id).await,
            Err(CalendarError::Gone(_))
        ));
    }

    #[tokio::test]
    async fn queued_failure_fires_once() {
        let store = MemoryCalendarStore::new();
        store.fail_next(CalendarError::Transient("flaky".into()));
        assert!(store.create_event(&draft(10)).await.is_err());
        assert!(store.create_event(&draft(11)).await.is_ok());
    }

    #[tokio::test]
    async fn task_store_saves_schedule() {
        let store = MemoryTaskStore::with_tasks(vec![Task::new("t1", "Work")]);
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        store
            .save_schedule(
                "t1",
                Some("ev-1".into()),
                Some("primary".into()),
                Some(start),
                Some(start + chrono::Duration::hours(1)),
                SyncStatus::Synced,
            )
            .await
            .unwrap();
        let task = store.get_task("t1").await.unwrap().unwrap();
        assert!(task.is_scheduled());
        assert_eq!(task.sync_status, SyncStatus::Synced);
        assert!(task.sync_state_consistent());
    }
}
