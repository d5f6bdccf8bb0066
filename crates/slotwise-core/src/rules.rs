//! Scheduling rules, protected slots, working hours, and user preferences.
//!
//! HH:mm wall-clock values are parsed into [`TimeOfDay`] at the boundary;
//! the engine never reasons about serialized time strings internally.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::task::TaskType;

/// A wall-clock time of day (HH:mm).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidTimeOfDay(format!(
                "{:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Minutes since midnight.
    pub fn minutes_from_midnight(&self) -> i64 {
        self.hour as i64 * 60 + self.minute as i64
    }

    /// Anchor this wall-clock time onto the date of `day`.
    pub fn on_date(&self, day: DateTime<Utc>) -> DateTime<Utc> {
        day.with_hour(self.hour)
            .and_then(|d| d.with_minute(self.minute))
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_nanosecond(0))
            .expect("validated HH:mm always maps onto a date")
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTimeOfDay(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        TimeOfDay::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A wall-clock interval with `start < end`.
///
/// Deserialization routes through [`ClockRange::new`] so serialized input
/// cannot smuggle in an inverted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl<'de> Deserialize<'de> for ClockRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            start: TimeOfDay,
            end: TimeOfDay,
        }
        let raw = Raw::deserialize(deserializer)?;
        ClockRange::new(raw.start, raw.end).map_err(serde::de::Error::custom)
    }
}

impl ClockRange {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidClockRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a ("HH:mm", "HH:mm") pair.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        Self::new(start.parse()?, end.parse()?)
    }

    /// Span in minutes.
    pub fn span_minutes(&self) -> i64 {
        self.end.minutes_from_midnight() - self.start.minutes_from_midnight()
    }

    /// Whether an instant's wall-clock time falls inside the range.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let minutes = at.hour() as i64 * 60 + at.minute() as i64;
        minutes >= self.start.minutes_from_midnight() && minutes < self.end.minutes_from_midnight()
    }

    /// Overlap in minutes between this range anchored on the interval's date
    /// and the interval `[start, end)`.
    pub fn overlap_minutes(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
        let range_start = self.start.on_date(start);
        let range_end = self.end.on_date(start);
        let overlap_start = start.max(range_start);
        let overlap_end = end.min(range_end);
        (overlap_end - overlap_start).num_minutes().max(0)
    }
}

/// Validate a days-of-week set: non-empty subset of {0..6}, 0 = Sunday.
fn validate_days(days: &[u8], field: &str) -> Result<(), ValidationError> {
    if days.is_empty() {
        return Err(ValidationError::InvalidDaySet {
            field: field.to_string(),
            message: "at least one day required".to_string(),
        });
    }
    if let Some(bad) = days.iter().find(|d| **d > 6) {
        return Err(ValidationError::InvalidDaySet {
            field: field.to_string(),
            message: format!("day {} outside 0..=6", bad),
        });
    }
    Ok(())
}

/// Weekday index of an instant, 0 = Sunday.
pub fn weekday_index(at: DateTime<Utc>) -> u8 {
    at.weekday().num_days_from_sunday() as u8
}

/// Per-task-type scheduling preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingRule {
    pub id: String,
    pub task_type: TaskType,
    pub enabled: bool,
    /// Preferred wall-clock window for this kind of work
    pub preferred_time: ClockRange,
    /// Preferred days, 0 = Sunday
    pub preferred_days: Vec<u8>,
    /// Duration to assume when the task has no estimate (5-480)
    pub default_duration_minutes: i64,
    /// Reserved minutes before the task (0-60)
    pub buffer_before: i64,
    /// Reserved minutes after the task (0-60)
    pub buffer_after: i64,
    /// Calendar to place events on, overriding the user default
    pub calendar_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SchedulingRule {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_days(&self.preferred_days, "preferred_days")?;
        if !(5..=480).contains(&self.default_duration_minutes) {
            return Err(ValidationError::OutOfRange {
                field: "default_duration_minutes".to_string(),
                message: format!("{} outside 5..=480", self.default_duration_minutes),
            });
        }
        for (field, value) in [
            ("buffer_before", self.buffer_before),
            ("buffer_after", self.buffer_after),
        ] {
            if !(0..=60).contains(&value) {
                return Err(ValidationError::OutOfRange {
                    field: field.to_string(),
                    message: format!("{} outside 0..=60", value),
                });
            }
        }
        Ok(())
    }

    /// Whether the instant falls on a preferred day and inside the
    /// preferred window.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.preferred_days.contains(&weekday_index(at)) && self.preferred_time.contains(at)
    }
}

/// Recurring window the suggestion generator must avoid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedSlot {
    pub id: String,
    pub name: String,
    /// Days this window applies to, 0 = Sunday
    pub days_of_week: Vec<u8>,
    pub window: ClockRange,
    pub enabled: bool,
    /// Urgent tasks may be placed here anyway
    #[serde(default)]
    pub allow_override_for_urgent: bool,
}

impl ProtectedSlot {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_days(&self.days_of_week, "days_of_week")
    }

    /// Whether the interval `[start, end)` intersects this window.
    pub fn blocks(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.enabled
            && self.days_of_week.contains(&weekday_index(start))
            && self.window.overlap_minutes(start, end) > 0
    }
}

/// Working hours per weekday; days without an entry are non-working.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkingHours {
    /// Index 0 = Sunday .. 6 = Saturday
    pub days: [Option<ClockRange>; 7],
}

impl WorkingHours {
    /// Monday-Friday at the given range.
    pub fn weekdays(range: ClockRange) -> Self {
        let mut days: [Option<ClockRange>; 7] = Default::default();
        for day in 1..=5 {
            days[day] = Some(range);
        }
        Self { days }
    }

    pub fn for_weekday(&self, weekday: u8) -> Option<&ClockRange> {
        self.days.get(weekday as usize).and_then(|d| d.as_ref())
    }
}

/// Per-user scheduling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSchedulingPreferences {
    /// Calendar used when neither the call nor the rule names one
    pub default_calendar_id: String,
    /// Calendar preferred for new events when present
    #[serde(default)]
    pub preferred_calendar_id: Option<String>,
    pub working_hours: WorkingHours,
    pub rules: Vec<SchedulingRule>,
    pub protected_slots: Vec<ProtectedSlot>,
    /// Fallback buffers when no rule covers the task type
    #[serde(default)]
    pub default_buffer_before: i64,
    #[serde(default)]
    pub default_buffer_after: i64,
    /// Keep short free slots open for incoming calls
    #[serde(default)]
    pub keep_slots_free_for_calls: bool,
    /// IANA timezone name the HH:mm preferences are expressed in
    pub timezone: String,
    #[serde(default)]
    pub auto_schedule: bool,
    /// Prefer placing work adjacent to blocks of the same type
    #[serde(default)]
    pub prefer_contiguous_blocks: bool,
}

impl UserSchedulingPreferences {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for rule in &self.rules {
            rule.validate()?;
        }
        for slot in &self.protected_slots {
            slot.validate()?;
        }
        Ok(())
    }

    /// Resolve the authoritative rule for a task type.
    ///
    /// More than one enabled rule may exist per type; the most recently
    /// updated one wins, ties broken by id so resolution is deterministic.
    pub fn resolve_rule(&self, task_type: TaskType) -> Option<&SchedulingRule> {
        self.rules
            .iter()
            .filter(|r| r.enabled && r.task_type == task_type)
            .max_by(|a, b| {
                a.updated_at
                    .cmp(&b.updated_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
    }

    /// Calendar to write a task's events to.
    pub fn calendar_for<'a>(&'a self, rule: Option<&'a SchedulingRule>) -> &'a str {
        rule.and_then(|r| r.calendar_id.as_deref())
            .or(self.preferred_calendar_id.as_deref())
            .unwrap_or(&self.default_calendar_id)
    }
}
