//! Ranked slot suggestions for a single task.
//!
//! Availability is computed without protected slots so that urgent tasks
//! can still land inside overridable windows; protected-slot handling
//! happens in conflict detection, where the override policy lives.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::{compute_availability, DateRange, TimeSlot};
use crate::calendar::CalendarEvent;
use crate::conflict::{detect_conflicts, has_error, Conflict};
use crate::error::Result;
use crate::rules::{SchedulingRule, UserSchedulingPreferences};
use crate::scoring::{ScoreContext, ScoringEngine, TypedBlock};
use crate::task::Task;

/// Duration assumed when neither the task nor a rule provides one.
pub const DEFAULT_DURATION_MINUTES: i64 = 30;

/// Inputs for one suggestion run.
#[derive(Debug, Clone)]
pub struct SuggestRequest<'a> {
    pub task: &'a Task,
    pub events: &'a [CalendarEvent],
    pub prefs: &'a UserSchedulingPreferences,
    pub range: DateRange,
    pub granularity_minutes: i64,
    /// Maximum number of suggestions returned
    pub limit: usize,
    /// Scheduled same-type blocks, for the contiguity factor
    pub typed_blocks: &'a [TypedBlock],
    /// Candidates starting before this instant are discarded
    pub now: DateTime<Utc>,
}

/// One ranked candidate slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub task_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub score: f64,
    pub reasoning: String,
    /// Rule that governed duration, buffers, and scoring, when one applied
    pub applied_rule_id: Option<String>,
    /// Non-blocking conflicts the user should know about
    pub conflicts: Vec<Conflict>,
}

/// Generates ranked suggestions from availability, rules, and scoring.
pub struct SuggestionGenerator {
    scoring: ScoringEngine,
}

impl SuggestionGenerator {
    pub fn new() -> Self {
        Self {
            scoring: ScoringEngine::new(),
        }
    }

    pub fn with_engine(scoring: ScoringEngine) -> Self {
        Self { scoring }
    }

    /// Duration to schedule for a task, in minutes.
    pub fn duration_for(task: &Task, rule: Option<&SchedulingRule>) -> i64 {
        task.duration_minutes
            .or(rule.map(|r| r.default_duration_minutes))
            .unwrap_or(DEFAULT_DURATION_MINUTES)
    }

    /// Produce up to `limit` suggestions, best first.
    ///
    /// An empty result means no viable slot exists in the range; that is a
    /// normal outcome, not an error. Completed and archived tasks always
    /// yield an empty result.
    pub fn suggest(&self, req: &SuggestRequest<'_>) -> Result<Vec<Suggestion>> {
        if !req.task.is_schedulable() || req.limit == 0 {
            return Ok(Vec::new());
        }

        let rule = req
            .task
            .task_type
            .and_then(|t| req.prefs.resolve_rule(t));
        let duration = Duration::minutes(Self::duration_for(req.task, rule));

        // Protected slots deliberately omitted here; see module doc.
        let windows = compute_availability(
            req.events,
            &[],
            &req.prefs.working_hours,
            req.range,
            req.granularity_minutes,
        )?;

        let (buffer_before, buffer_after) = match rule {
            Some(rule) => (rule.buffer_before, rule.buffer_after),
            None => (req.task.buffer_before, req.task.buffer_after),
        };

        let mut suggestions = Vec::new();
        for window in &windows {
            for run in free_runs(&window.slots) {
                let mut start = run.0;
                while start + duration <= run.1 {
                    if start >= req.now {
                        let end = start + duration;
                        let conflicts = detect_conflicts(
                            req.task,
                            start,
                            end,
                            req.events,
                            &req.prefs.protected_slots,
                            &req.prefs.working_hours,
                            rule,
                        );
                        if !has_error(&conflicts) {
                            let ctx = ScoreContext {
                                task: req.task,
                                start,
                                end,
                                rule,
                                buffer_before,
                                buffer_after,
                                buffer_before_fits: buffer_fits(
                                    req.task,
                                    req.events,
                                    start - Duration::minutes(buffer_before),
                                    start,
                                ),
                                buffer_after_fits: buffer_fits(
                                    req.task,
                                    req.events,
                                    end,
                                    end + Duration::minutes(buffer_after),
                                ),
                                typed_blocks: req.typed_blocks,
                                prefer_contiguous: req.prefs.prefer_contiguous_blocks,
                                now: req.now,
                            };
                            let scored = self.scoring.score_slot(&ctx, &conflicts);
                            suggestions.push(Suggestion {
                                task_id: req.task.id.clone(),
                                start,
                                end,
                                score: scored.score,
                                reasoning: scored.reasoning,
                                applied_rule_id: rule.map(|r| r.id.clone()),
                                conflicts,
                            });
                        }
                    }
                    start += Duration::minutes(req.granularity_minutes);
                }
            }
        }

        // Best score first; earlier start breaks ties so ranking is stable.
        suggestions.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.start.cmp(&b.start))
        });
        suggestions.truncate(req.limit);
        Ok(suggestions)
    }
}

impl Default for SuggestionGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge consecutive available slots into contiguous free intervals.
fn free_runs(slots: &[TimeSlot]) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut runs = Vec::new();
    let mut current: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
    for slot in slots {
        if slot.available {
            current = match current {
                Some((start, _)) => Some((start, slot.end)),
                None => Some((slot.start, slot.end)),
            };
        } else if let Some(run) = current.take() {
            runs.push(run);
        }
    }
    if let Some(run) = current {
        runs.push(run);
    }
    runs
}

/// Whether a buffer interval is clear of other busy timed events.
fn buffer_fits(
    task: &Task,
    events: &[CalendarEvent],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    if start >= end {
        return true;
    }
    !events.iter().any(|e| {
        e.is_busy()
            && !e.all_day
            && e.task_id.as_deref() != Some(task.id.as_str())
            && e.overlaps(start, end)
    })
}
