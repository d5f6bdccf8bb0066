//! Conflict detection shared by the suggestion generator and the commit
//! engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarEvent;
use crate::rules::{weekday_index, ProtectedSlot, SchedulingRule, WorkingHours};
use crate::task::Task;

/// What kind of constraint a slot violates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Overlap,
    Buffer,
    RuleViolation,
    ProtectedSlot,
    OutsideHours,
}

/// How hard the violation is.
///
/// `Error` excludes a slot from suggestions and blocks non-forced writes;
/// `Info` and `Warning` only reduce the score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A detected constraint violation for a candidate slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub message: String,
    /// Suggested way out, when one exists
    pub resolution: Option<String>,
    /// Event that caused the conflict, when one did
    pub conflicting_event_id: Option<String>,
}

impl Conflict {
    fn new(kind: ConflictKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            resolution: None,
            conflicting_event_id: None,
        }
    }

    fn with_event(mut self, event_id: impl Into<String>) -> Self {
        self.conflicting_event_id = Some(event_id.into());
        self
    }

    fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }
}

/// Whether any conflict in the list is blocking.
pub fn has_error(conflicts: &[Conflict]) -> bool {
    conflicts.iter().any(|c| c.severity == Severity::Error)
}

/// Detect every conflict for placing `task` at `[start, end)`.
///
/// Buffers from the applied rule (or the task's own buffer fields) are
/// checked against the same event set; a buffer that does not fit produces
/// a warning rather than an exclusion, matching how buffer feasibility only
/// dents the score.
pub fn detect_conflicts(
    task: &Task,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    events: &[CalendarEvent],
    protected_slots: &[ProtectedSlot],
    working_hours: &WorkingHours,
    rule: Option<&SchedulingRule>,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for event in events.iter().filter(|e| e.is_busy()) {
        // The task's own current event never conflicts with its new slot.
        if event.task_id.as_deref() == Some(task.id.as_str()) {
            continue;
        }
        if event.all_day && event.covers_date(start.date_naive()) {
            conflicts.push(
                Conflict::new(
                    ConflictKind::Overlap,
                    Severity::Error,
                    format!("All-day event '{}' occupies this date", event.title),
                )
                .with_event(&event.id),
            );
        } else if !event.all_day && event.overlaps(start, end) {
            conflicts.push(
                Conflict::new(
                    ConflictKind::Overlap,
                    Severity::Error,
                    format!("Overlaps existing event '{}'", event.title),
                )
                .with_event(&event.id)
                .with_resolution("pick another slot or displace the event"),
            );
        }
    }

    for slot in protected_slots.iter().filter(|p| p.blocks(start, end)) {
        if task.urgent && slot.allow_override_for_urgent {
            conflicts.push(Conflict::new(
                ConflictKind::ProtectedSlot,
                Severity::Warning,
                format!("Urgent task overrides protected slot '{}'", slot.name),
            ));
        } else {
            conflicts.push(
                Conflict::new(
                    ConflictKind::ProtectedSlot,
                    Severity::Error,
                    format!("Falls inside protected slot '{}'", slot.name),
                )
                .with_resolution("pick a slot outside the protected window"),
            );
        }
    }

    match working_hours.for_weekday(weekday_index(start)) {
        Some(hours) => {
            let span = (end - start).num_minutes();
            if hours.overlap_minutes(start, end) < span {
                conflicts.push(Conflict::new(
                    ConflictKind::OutsideHours,
                    Severity::Error,
                    "Extends outside working hours".to_string(),
                ));
            }
        }
        None => {
            conflicts.push(Conflict::new(
                ConflictKind::OutsideHours,
                Severity::Error,
                "Falls on a non-working day".to_string(),
            ));
        }
    }

    if let Some(rule) = rule {
        let day_ok = rule.preferred_days.contains(&weekday_index(start));
        let time_ok = rule.preferred_time.contains(start);
        if !day_ok || !time_ok {
            conflicts.push(Conflict::new(
                ConflictKind::RuleViolation,
                Severity::Info,
                format!(
                    "Outside preferred window {}-{} for this task type",
                    rule.preferred_time.start, rule.preferred_time.end
                ),
            ));
        }
    }

    let (buffer_before, buffer_after) = match rule {
        Some(rule) => (rule.buffer_before, rule.buffer_after),
        None => (task.buffer_before, task.buffer_after),
    };
    for (minutes, label, range) in [
        (
            buffer_before,
            "before",
            (start - Duration::minutes(buffer_before), start),
        ),
        (
            buffer_after,
            "after",
            (end, end + Duration::minutes(buffer_after)),
        ),
    ] {
        if minutes <= 0 {
            continue;
        }
        let (buf_start, buf_end) = range;
        let blocked = events.iter().any(|e| {
            e.is_busy()
                && !e.all_day
                && e.task_id.as_deref() != Some(task.id.as_str())
                && e.overlaps(buf_start, buf_end)
        });
        if blocked {
            conflicts.push(Conflict::new(
                ConflictKind::Buffer,
                Severity::Warning,
                format!("{}-minute buffer {} the task does not fit", minutes, label),
            ));
        }
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::EventStatus;
    use crate::rules::ClockRange;
    use crate::task::Task;
    use chrono::TimeZone;

    fn nine_to_five() -> WorkingHours {
        WorkingHours::weekdays(ClockRange::parse("09:00", "17:00").unwrap())
    }

    fn event_at(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            calendar_id: "primary".into(),
            title: format!("Event {}", id),
            start,
            end,
            all_day: false,
            status: EventStatus::Confirmed,
            task_id: None,
            buffer: None,
            recurring_event_id: None,
        }
    }

    fn monday_at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, 0, 0).unwrap()
    }

    #[test]
    fn overlap_is_an_error() {
        let task = Task::new("t1", "Work");
        let ev = event_at("ev1", monday_at(10), monday_at(11));
        let conflicts = detect_conflicts(
            &task,
            monday_at(10),
            monday_at(11),
            &[ev],
            &[],
            &nine_to_five(),
            None,
        );
        assert!(has_error(&conflicts));
        assert!(conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::Overlap
                && c.conflicting_event_id.as_deref() == Some("ev1")));
    }

    #[test]
    fn own_event_does_not_conflict() {
        let task = Task::new("t1", "Work");
        let mut ev = event_at("ev1", monday_at(10), monday_at(11));
        ev.task_id = Some("t1".into());
        let conflicts = detect_conflicts(
            &task,
            monday_at(10),
            monday_at(11),
            &[ev],
            &[],
            &nine_to_five(),
            None,
        );
        assert!(!has_error(&conflicts));
    }

    #[test]
    fn urgent_override_downgrades_protected_slot() {
        let slot = ProtectedSlot {
            id: "p1".into(),
            name: "Focus".into(),
            days_of_week: vec![1],
            window: ClockRange::parse("10:00", "12:00").unwrap(),
            enabled: true,
            allow_override_for_urgent: true,
        };
        let mut task = Task::new("t1", "Work");
        let conflicts = detect_conflicts(
            &task,
            monday_at(10),
            monday_at(11),
            &[],
            std::slice::from_ref(&slot),
            &nine_to_five(),
            None,
        );
        assert!(has_error(&conflicts));

        task.urgent = true;
        let conflicts = detect_conflicts(
            &task,
            monday_at(10),
            monday_at(11),
            &[],
            std::slice::from_ref(&slot),
            &nine_to_five(),
            None,
        );
        assert!(!has_error(&conflicts));
        assert!(conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::ProtectedSlot && c.severity == Severity::Warning));
    }

    #[test]
    fn outside_working_hours_is_an_error() {
        let task = Task::new("t1", "Work");
        let conflicts = detect_conflicts(
            &task,
            monday_at(18),
            monday_at(19),
            &[],
            &[],
            &nine_to_five(),
            None,
        );
        assert!(has_error(&conflicts));
        assert!(conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::OutsideHours));
    }

    #[test]
    fn blocked_buffer_is_a_warning() {
        let task = Task::new("t1", "Work");
        let rule = SchedulingRule {
            id: "r1".into(),
            task_type: crate::task::TaskType::DeepWork,
            enabled: true,
            preferred_time: ClockRange::parse("09:00", "17:00").unwrap(),
            preferred_days: vec![1],
            default_duration_minutes: 60,
            buffer_before: 15,
            buffer_after: 15,
            calendar_id: None,
            updated_at: Utc::now(),
        };
        // Event right before the candidate slot blocks the before-buffer.
        let ev = event_at("ev1", monday_at(10), monday_at(11));
        let conflicts = detect_conflicts(
            &task,
            monday_at(11),
            monday_at(12),
            &[ev],
            &[],
            &nine_to_five(),
            Some(&rule),
        );
        assert!(!has_error(&conflicts));
        assert!(conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::Buffer && c.severity == Severity::Warning));
    }
}
