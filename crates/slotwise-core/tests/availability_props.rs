//! Property tests for availability tiling.

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use slotwise_core::availability::{compute_availability, DateRange};
use slotwise_core::calendar::{CalendarEvent, EventStatus};
use slotwise_core::rules::{ClockRange, TimeOfDay, WorkingHours};

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

fn event(start_min: i64, duration_min: i64) -> CalendarEvent {
    let base = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
    CalendarEvent {
        id: format!("ev-{}-{}", start_min, duration_min),
        calendar_id: "primary".into(),
        title: "Event".into(),
        start: base + chrono::Duration::minutes(start_min),
        end: base + chrono::Duration::minutes(start_min + duration_min),
        all_day: false,
        status: EventStatus::Confirmed,
        task_id: None,
        buffer: None,
        recurring_event_id: None,
    }
}

fn hours(start_min: u32, end_min: u32) -> WorkingHours {
    let start = TimeOfDay::new(start_min / 60, start_min % 60).unwrap();
    let end = TimeOfDay::new(end_min / 60, end_min % 60).unwrap();
    WorkingHours::weekdays(ClockRange::new(start, end).unwrap())
}

proptest! {
    /// Slots always tile the working span exactly, whatever the inputs.
    #[test]
    fn slots_partition_working_hours(
        start_min in 0u32..720,
        span in 60u32..720,
        granularity in 5i64..180,
        events in proptest::collection::vec((0i64..1440, 15i64..240), 0..6),
    ) {
        let end_min = (start_min + span).min(1439);
        prop_assume!(end_min > start_min);
        let wh = hours(start_min, end_min);
        let events: Vec<CalendarEvent> =
            events.into_iter().map(|(s, d)| event(s, d)).collect();

        let windows = compute_availability(
            &events,
            &[],
            &wh,
            DateRange::day(monday()),
            granularity,
        ).unwrap();
        let day = &windows[0];

        // Contiguous tiling from working start to working end.
        let mut expected = day.slots.first().map(|s| s.start);
        for slot in &day.slots {
            prop_assert_eq!(Some(slot.start), expected);
            prop_assert!(slot.start < slot.end);
            expected = Some(slot.end);
        }

        // Aggregates match the tiled span.
        let span_minutes = (end_min - start_min) as i64;
        prop_assert_eq!(day.working_minutes(), span_minutes);
        let summed: i64 = day.slots.iter().map(|s| s.duration_minutes()).sum();
        prop_assert_eq!(summed, span_minutes);

        // Every slot except the last is exactly one granule.
        for slot in day.slots.iter().rev().skip(1) {
            prop_assert_eq!(slot.duration_minutes(), granularity);
        }
    }

    /// Busy never decreases when an event is added.
    #[test]
    fn adding_events_never_frees_time(
        base_events in proptest::collection::vec((480i64..1020, 15i64..120), 0..4),
        extra in (480i64..1020, 15i64..120),
        granularity in 5i64..120,
    ) {
        let wh = hours(9 * 60, 17 * 60);
        let base: Vec<CalendarEvent> =
            base_events.into_iter().map(|(s, d)| event(s, d)).collect();
        let mut extended = base.clone();
        extended.push(event(extra.0, extra.1));

        let before = compute_availability(&base, &[], &wh, DateRange::day(monday()), granularity)
            .unwrap();
        let after =
            compute_availability(&extended, &[], &wh, DateRange::day(monday()), granularity)
                .unwrap();

        prop_assert!(after[0].total_busy_minutes >= before[0].total_busy_minutes);
        prop_assert!(after[0].total_free_minutes <= before[0].total_free_minutes);
    }

    /// The computation is a pure function of its inputs.
    #[test]
    fn recomputation_is_stable(
        events in proptest::collection::vec((0i64..1440, 15i64..240), 0..6),
        granularity in 5i64..180,
    ) {
        let wh = hours(9 * 60, 17 * 60);
        let events: Vec<CalendarEvent> =
            events.into_iter().map(|(s, d)| event(s, d)).collect();
        let range = DateRange::day(monday());

        let a = compute_availability(&events, &[], &wh, range, granularity).unwrap();
        let b = compute_availability(&events, &[], &wh, range, granularity).unwrap();
        prop_assert_eq!(a, b);
    }
}
