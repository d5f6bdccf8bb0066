//! Mirror of external calendar event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External event status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Marks an event as reserved buffer time around a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    Before,
    After,
}

/// An event as read from (or written to) the external calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    pub status: EventStatus,
    /// Link back to the task that produced this event
    pub task_id: Option<String>,
    /// Present when the event is reserved buffer time
    pub buffer: Option<BufferKind>,
    /// Recurring series this instance belongs to
    pub recurring_event_id: Option<String>,
}

impl CalendarEvent {
    /// Whether the event occupies calendar time. Only cancellation frees
    /// the slot; tentative events still block it.
    pub fn is_busy(&self) -> bool {
        self.status != EventStatus::Cancelled
    }

    /// Whether the event intersects `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }

    /// Whether the event covers any part of the given UTC date.
    pub fn covers_date(&self, date: chrono::NaiveDate) -> bool {
        self.start.date_naive() <= date && self.end.date_naive() >= date
    }
}

/// Payload for creating or moving an event on the external calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub calendar_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub task_id: Option<String>,
    pub buffer: Option<BufferKind>,
}

impl EventDraft {
    pub fn for_task(
        calendar_id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            title: title.into(),
            start,
            end,
            task_id: Some(task_id.into()),
            buffer: None,
        }
    }

    pub fn buffer(
        calendar_id: impl Into<String>,
        task_id: impl Into<String>,
        kind: BufferKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let label = match kind {
            BufferKind::Before => "Buffer (before)",
            BufferKind::After => "Buffer (after)",
        };
        Self {
            calendar_id: calendar_id.into(),
            title: label.to_string(),
            start,
            end,
            task_id: Some(task_id.into()),
            buffer: Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(status: EventStatus) -> CalendarEvent {
        CalendarEvent {
            id: "ev1".into(),
            calendar_id: "primary".into(),
            title: "Standup".into(),
            start: Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap(),
            all_day: false,
            status,
            task_id: None,
            buffer: None,
            recurring_event_id: None,
        }
    }

    #[test]
    fn cancelled_events_are_free() {
        assert!(event(EventStatus::Confirmed).is_busy());
        assert!(event(EventStatus::Tentative).is_busy());
        assert!(!event(EventStatus::Cancelled).is_busy());
    }

    #[test]
    fn overlap_is_half_open() {
        let ev = event(EventStatus::Confirmed);
        let eleven = Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        assert!(!ev.overlaps(eleven, noon));
        let half_ten = Utc.with_ymd_and_hms(2025, 6, 2, 10, 30, 0).unwrap();
        assert!(ev.overlaps(half_ten, noon));
    }
}
