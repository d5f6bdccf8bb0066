//! Weighted slot scoring engine.
//!
//! Each factor is a named pure function over the scoring context; the
//! engine walks an ordered factor table so every factor can be unit tested
//! in isolation and the breakdown stays explainable. Scores are
//! deterministic: no randomness and no wall clock beyond the explicit `now`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::conflict::{Conflict, Severity};
use crate::rules::SchedulingRule;
use crate::task::{Task, TaskType};

/// One scored factor in the breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringFactor {
    /// Factor name
    pub name: String,
    /// Weight assigned to the factor
    pub weight: f64,
    /// Raw factor value (0-100)
    pub value: f64,
    /// Human-readable explanation of the value
    pub description: String,
}

impl ScoringFactor {
    /// Weighted contribution to the final score.
    pub fn contribution(&self) -> f64 {
        self.weight * self.value / 100.0
    }
}

/// Weights per factor; must sum to 100 so the final score stays in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub rule_match: f64,
    pub time_of_day: f64,
    pub buffer_fit: f64,
    pub contiguity: f64,
}

impl FactorWeights {
    pub fn balanced() -> Self {
        Self {
            rule_match: 40.0,
            time_of_day: 20.0,
            buffer_fit: 20.0,
            contiguity: 20.0,
        }
    }

    pub fn sum(&self) -> f64 {
        self.rule_match + self.time_of_day + self.buffer_fit + self.contiguity
    }

    /// Scale weights so they sum to 100.
    pub fn normalize(&mut self) {
        let sum = self.sum();
        if sum > 0.0 {
            let scale = 100.0 / sum;
            self.rule_match *= scale;
            self.time_of_day *= scale;
            self.buffer_fit *= scale;
            self.contiguity *= scale;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, weight) in [
            ("rule_match", self.rule_match),
            ("time_of_day", self.time_of_day),
            ("buffer_fit", self.buffer_fit),
            ("contiguity", self.contiguity),
        ] {
            if !(0.0..=100.0).contains(&weight) {
                return Err(format!("weight '{}' outside [0, 100]: {}", name, weight));
            }
        }
        if (self.sum() - 100.0).abs() > 1e-6 {
            return Err(format!("weights must sum to 100, got {}", self.sum()));
        }
        Ok(())
    }
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self::balanced()
    }
}

/// A committed or recommended block of typed work, used by the contiguity
/// factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypedBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub task_type: TaskType,
}

/// Everything a factor may look at when scoring one candidate slot.
#[derive(Debug, Clone)]
pub struct ScoreContext<'a> {
    pub task: &'a Task,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Authoritative rule for the task type, when one exists
    pub rule: Option<&'a SchedulingRule>,
    /// Buffers that would be reserved around the slot
    pub buffer_before: i64,
    pub buffer_after: i64,
    /// Whether the buffers fit without touching other events
    pub buffer_before_fits: bool,
    pub buffer_after_fits: bool,
    /// Scheduled blocks with a known task type, for contiguity
    pub typed_blocks: &'a [TypedBlock],
    /// Whether the user prefers contiguous same-type blocks
    pub prefer_contiguous: bool,
    /// Explicit clock; factors never read the wall clock themselves
    pub now: DateTime<Utc>,
}

/// Score plus explanation for one candidate slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotScore {
    /// Final score, clamped to [0, 100]
    pub score: f64,
    /// Short human-readable summary of the strongest factors
    pub reasoning: String,
    pub factors: Vec<ScoringFactor>,
}

type FactorFn = fn(&ScoreContext) -> (f64, String);

/// Ordered factor table: (name, weight selector, pure function).
const FACTOR_TABLE: [(&str, fn(&FactorWeights) -> f64, FactorFn); 4] = [
    ("rule_match", |w| w.rule_match, rule_match),
    ("time_of_day", |w| w.time_of_day, time_of_day),
    ("buffer_fit", |w| w.buffer_fit, buffer_fit),
    ("contiguity", |w| w.contiguity, contiguity),
];

/// Score reduction per non-blocking conflict.
const WARNING_PENALTY: f64 = 10.0;
const INFO_PENALTY: f64 = 3.0;

/// Weighted slot scoring engine.
pub struct ScoringEngine {
    weights: FactorWeights,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self {
            weights: FactorWeights::default(),
        }
    }

    pub fn with_weights(weights: FactorWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &FactorWeights {
        &self.weights
    }

    /// Score one candidate slot.
    ///
    /// Non-blocking conflicts reduce the score; callers exclude
    /// error-severity slots before ranking.
    pub fn score_slot(&self, ctx: &ScoreContext, conflicts: &[Conflict]) -> SlotScore {
        let mut factors = Vec::with_capacity(FACTOR_TABLE.len());
        let mut total = 0.0;
        for (name, weight_of, factor_fn) in FACTOR_TABLE {
            let (value, description) = factor_fn(ctx);
            let factor = ScoringFactor {
                name: name.to_string(),
                weight: weight_of(&self.weights),
                value: value.clamp(0.0, 100.0),
                description,
            };
            total += factor.contribution();
            factors.push(factor);
        }

        for conflict in conflicts {
            total -= match conflict.severity {
                Severity::Warning => WARNING_PENALTY,
                Severity::Info => INFO_PENALTY,
                Severity::Error => 0.0, // excluded upstream, not re-penalized
            };
        }

        let score = total.clamp(0.0, 100.0);
        let reasoning = build_reasoning(&factors, conflicts);
        SlotScore {
            score,
            reasoning,
            factors,
        }
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Summarize the two strongest factors plus any conflict notes.
fn build_reasoning(factors: &[ScoringFactor], conflicts: &[Conflict]) -> String {
    let mut ranked: Vec<&ScoringFactor> = factors.iter().collect();
    ranked.sort_by(|a, b| {
        b.contribution()
            .partial_cmp(&a.contribution())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut parts: Vec<String> = ranked
        .iter()
        .take(2)
        .map(|f| f.description.clone())
        .collect();
    for conflict in conflicts {
        if conflict.severity != Severity::Error {
            parts.push(conflict.message.clone());
        }
    }
    parts.join("; ")
}

/// Match against the task-type rule's preferred days and time window.
fn rule_match(ctx: &ScoreContext) -> (f64, String) {
    let Some(rule) = ctx.rule else {
        return (50.0, "no scheduling rule for this task type".to_string());
    };
    let day_ok = rule
        .preferred_days
        .contains(&crate::rules::weekday_index(ctx.start));
    let span = (ctx.end - ctx.start).num_minutes().max(1);
    let overlap = rule.preferred_time.overlap_minutes(ctx.start, ctx.end);
    let time_fraction = overlap as f64 / span as f64;

    let value = if day_ok { 40.0 } else { 0.0 } + time_fraction * 60.0;
    let description = match (day_ok, time_fraction >= 1.0) {
        (true, true) => format!(
            "inside preferred window {}-{}",
            rule.preferred_time.start, rule.preferred_time.end
        ),
        (true, false) => "preferred day, partially in preferred window".to_string(),
        (false, _) => "outside preferred days".to_string(),
    };
    (value, description)
}

/// Distance from the task's time-of-day tag when no rule applies.
fn time_of_day(ctx: &ScoreContext) -> (f64, String) {
    if ctx.rule.is_some() {
        return (50.0, "rule present, tag not consulted".to_string());
    }
    let Some(tag) = ctx.task.time_of_day else {
        return (50.0, "no time-of-day preference".to_string());
    };

    let midpoint = ctx.start + Duration::minutes((ctx.end - ctx.start).num_minutes() / 2);
    let hour = chrono::Timelike::hour(&midpoint) as i64;
    let (lo, hi) = tag.hour_window();
    let (lo, hi) = (lo as i64, hi as i64);

    if (lo..hi).contains(&hour) {
        return (100.0, format!("matches {:?} preference", tag).to_lowercase());
    }
    let distance = if hour < lo { lo - hour } else { hour - hi + 1 };
    let value = (100.0 - distance as f64 * 25.0).max(0.0);
    (
        value,
        format!("{} hour(s) from preferred time of day", distance),
    )
}

/// Whether the required buffers fit cleanly around the slot.
fn buffer_fit(ctx: &ScoreContext) -> (f64, String) {
    if ctx.buffer_before <= 0 && ctx.buffer_after <= 0 {
        return (100.0, "no buffers required".to_string());
    }
    match (ctx.buffer_before_fits, ctx.buffer_after_fits) {
        (true, true) => (100.0, "buffers fit cleanly".to_string()),
        (true, false) | (false, true) => (50.0, "one buffer is squeezed".to_string()),
        (false, false) => (0.0, "buffers collide with existing events".to_string()),
    }
}

/// Bonus for sitting adjacent to a same-type block when the user prefers
/// contiguous work.
fn contiguity(ctx: &ScoreContext) -> (f64, String) {
    if !ctx.prefer_contiguous {
        return (50.0, "contiguity not preferred".to_string());
    }
    let Some(task_type) = ctx.task.task_type else {
        return (50.0, "task has no type for contiguity".to_string());
    };
    let adjacent = ctx
        .typed_blocks
        .iter()
        .any(|b| b.task_type == task_type && (b.end == ctx.start || b.start == ctx.end));
    if adjacent {
        (100.0, "adjacent to a same-type block".to_string())
    } else {
        (40.0, "no adjacent same-type block".to_string())
    }
}
