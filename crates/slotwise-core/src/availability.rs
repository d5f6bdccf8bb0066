//! Free/busy availability computed from calendar events, protected slots,
//! and working hours.
//!
//! Pure and side-effect free: identical inputs always produce identical
//! windows. Callers that want memoization use [`AvailabilityCache`], keyed
//! by an explicit request fingerprint -- never ambient state.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::calendar::CalendarEvent;
use crate::error::ValidationError;
use crate::rules::{weekday_index, ProtectedSlot, WorkingHours};

/// A contiguous time interval with an availability flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, available: bool) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self {
            start,
            end,
            available,
        })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// All slots for one date plus free/busy aggregates.
///
/// Derived, never persisted; recomputed from inputs on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
    pub total_free_minutes: i64,
    pub total_busy_minutes: i64,
}

impl AvailabilityWindow {
    /// Working-hours span covered by this window.
    pub fn working_minutes(&self) -> i64 {
        self.total_free_minutes + self.total_busy_minutes
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::OutOfRange {
                field: "date_range".to_string(),
                message: format!("start {} after end {}", start, end),
            });
        }
        Ok(Self { start, end })
    }

    /// Single-day range.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

/// Compute availability windows for each date in `range`.
///
/// Slots tile the working-hours portion of each day at `granularity_minutes`
/// with no gaps or overlaps; a trailing slot shorter than the granularity is
/// emitted when the working span is not an exact multiple. A slot is busy
/// when any part of it intersects a non-cancelled event, falls inside an
/// enabled protected slot on a matching weekday, or the whole date is
/// covered by an all-day event. Days without working hours yield an empty
/// window.
pub fn compute_availability(
    events: &[CalendarEvent],
    protected_slots: &[ProtectedSlot],
    working_hours: &WorkingHours,
    range: DateRange,
    granularity_minutes: i64,
) -> Result<Vec<AvailabilityWindow>, ValidationError> {
    if !(5..=480).contains(&granularity_minutes) {
        return Err(ValidationError::OutOfRange {
            field: "granularity_minutes".to_string(),
            message: format!("{} outside 5..=480", granularity_minutes),
        });
    }

    let busy_events: Vec<&CalendarEvent> = events.iter().filter(|e| e.is_busy()).collect();

    let mut windows = Vec::new();
    for date in range.iter_days() {
        windows.push(compute_day(
            &busy_events,
            protected_slots,
            working_hours,
            date,
            granularity_minutes,
        ));
    }
    Ok(windows)
}

fn compute_day(
    busy_events: &[&CalendarEvent],
    protected_slots: &[ProtectedSlot],
    working_hours: &WorkingHours,
    date: NaiveDate,
    granularity_minutes: i64,
) -> AvailabilityWindow {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists for every date")
        .and_utc();
    let weekday = weekday_index(midnight);

    let Some(hours) = working_hours.for_weekday(weekday) else {
        return AvailabilityWindow {
            date,
            slots: Vec::new(),
            total_free_minutes: 0,
            total_busy_minutes: 0,
        };
    };

    let day_start = hours.start.on_date(midnight);
    let day_end = hours.end.on_date(midnight);

    let all_day_blocked = busy_events
        .iter()
        .any(|e| e.all_day && e.covers_date(date));

    let mut slots = Vec::new();
    let mut free = 0;
    let mut busy = 0;
    let mut cursor = day_start;

    while cursor < day_end {
        let slot_end = (cursor + Duration::minutes(granularity_minutes)).min(day_end);
        let available = !all_day_blocked
            && !busy_events.iter().any(|e| !e.all_day && e.overlaps(cursor, slot_end))
            && !protected_slots.iter().any(|p| p.blocks(cursor, slot_end));

        let minutes = (slot_end - cursor).num_minutes();
        if available {
            free += minutes;
        } else {
            busy += minutes;
        }
        slots.push(TimeSlot {
            start: cursor,
            end: slot_end,
            available,
        });
        cursor = slot_end;
    }

    AvailabilityWindow {
        date,
        slots,
        total_free_minutes: free,
        total_busy_minutes: busy,
    }
}

/// Stable fingerprint of an availability request, for explicit memoization.
pub fn availability_fingerprint(
    events: &[CalendarEvent],
    protected_slots: &[ProtectedSlot],
    working_hours: &WorkingHours,
    range: DateRange,
    granularity_minutes: i64,
) -> String {
    let mut hasher = Sha256::new();
    // serde_json preserves struct field order, so the digest is stable for
    // identical inputs.
    let payload = serde_json::json!({
        "events": events,
        "protected": protected_slots,
        "working_hours": working_hours,
        "range": range,
        "granularity": granularity_minutes,
    });
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Caller-owned memoization of availability results.
#[derive(Debug, Default)]
pub struct AvailabilityCache {
    entries: HashMap<String, Vec<AvailabilityWindow>>,
}

impl AvailabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute availability, reusing a previous result for an identical
    /// request fingerprint.
    pub fn get_or_compute(
        &mut self,
        events: &[CalendarEvent],
        protected_slots: &[ProtectedSlot],
        working_hours: &WorkingHours,
        range: DateRange,
        granularity_minutes: i64,
    ) -> Result<&[AvailabilityWindow], ValidationError> {
        let key = availability_fingerprint(
            events,
            protected_slots,
            working_hours,
            range,
            granularity_minutes,
        );
        if !self.entries.contains_key(&key) {
            let computed = compute_availability(
                events,
                protected_slots,
                working_hours,
                range,
                granularity_minutes,
            )?;
            self.entries.insert(key.clone(), computed);
        }
        Ok(self.entries.get(&key).expect("inserted above"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
