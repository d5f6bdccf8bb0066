//! Batch schedule proposals.
//!
//! A proposal is a reviewable plan: placements for a batch of tasks,
//! displacements of lower-priority work where an urgent task had no free
//! slot, and a TTL after which the plan must be rebuilt because the
//! calendar may have moved underneath it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::availability::DateRange;
use crate::calendar::{BufferKind, CalendarEvent, EventStatus};
use crate::error::{Result, SchedulingError};
use crate::rules::UserSchedulingPreferences;
use crate::scoring::TypedBlock;
use crate::suggest::{SuggestRequest, Suggestion, SuggestionGenerator};
use crate::task::Task;

/// Minutes a proposal stays valid after creation.
pub const DEFAULT_TTL_MINUTES: i64 = 30;

/// Ranked alternatives kept per task in a proposal.
const ALTERNATIVES_PER_TASK: usize = 3;

/// Lifecycle of a proposal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Confirmed,
    PartiallyConfirmed,
    Expired,
    Cancelled,
}

/// Moving one linked event out of the way for a higher-priority task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Displacement {
    pub event_id: String,
    /// Calendar the displaced event lives on
    pub calendar_id: String,
    pub task_id: String,
    pub from_start: DateTime<Utc>,
    pub from_end: DateTime<Utc>,
    pub to_start: DateTime<Utc>,
    pub to_end: DateTime<Utc>,
    /// Human-readable justification shown to the user
    pub reason: String,
}

/// One planned placement within a proposal.
///
/// `start`/`end` mirror the recommended alternative so consumers do not
/// need to index into the ranked list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalEntry {
    pub task_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub calendar_id: String,
    pub score: f64,
    pub reasoning: String,
    /// Ranked candidate slots, best first
    pub alternatives: Vec<Suggestion>,
    /// Index of the recommended alternative
    pub recommended_index: usize,
    /// Set when this placement requires moving another task's event
    pub displacement: Option<Displacement>,
    /// A placement with warnings needs explicit user approval
    pub requires_approval: bool,
}

/// A task the builder could not place, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedTask {
    pub task_id: String,
    pub reason: String,
}

/// Aggregate counts over a proposal.
///
/// Invariant: `schedulable_tasks + conflicted_tasks == total_tasks`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalSummary {
    pub total_tasks: usize,
    pub schedulable_tasks: usize,
    pub conflicted_tasks: usize,
    /// Sum of recommended slot durations
    pub total_minutes: i64,
}

/// A reviewable batch plan with an expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleProposal {
    pub id: String,
    pub status: ProposalStatus,
    pub entries: Vec<ProposalEntry>,
    pub skipped: Vec<SkippedTask>,
    pub summary: ProposalSummary,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ScheduleProposal {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Reject work against an expired proposal.
    pub fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<()> {
        if self.is_expired(now) {
            return Err(SchedulingError::StaleProposal {
                proposal_id: self.id.clone(),
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }
}

/// Inputs for building one proposal.
#[derive(Debug, Clone)]
pub struct ProposeRequest<'a> {
    /// Tasks to place, any order; the builder sorts by priority
    pub tasks: &'a [Task],
    /// Full task list, used to resolve events linked to other tasks
    pub all_tasks: &'a [Task],
    pub events: &'a [CalendarEvent],
    pub prefs: &'a UserSchedulingPreferences,
    pub range: DateRange,
    pub granularity_minutes: i64,
    pub ttl_minutes: i64,
    pub now: DateTime<Utc>,
}

/// Builds batch proposals on top of the suggestion generator.
pub struct ProposalBuilder {
    generator: SuggestionGenerator,
}

impl ProposalBuilder {
    pub fn new() -> Self {
        Self {
            generator: SuggestionGenerator::new(),
        }
    }

    pub fn with_generator(generator: SuggestionGenerator) -> Self {
        Self { generator }
    }

    /// Build a proposal for the batch.
    ///
    /// Tasks are placed highest priority first, each placement becoming a
    /// synthetic busy event so later tasks cannot be planned on top of it.
    /// An urgent task with no free slot may displace an event linked to a
    /// lower-priority task; unlinked external events are never displaced.
    pub fn build(&self, req: &ProposeRequest<'_>) -> Result<ScheduleProposal> {
        let mut batch: Vec<&Task> = req.tasks.iter().filter(|t| t.is_schedulable()).collect();
        batch.sort_by(|a, b| {
            b.effective_priority()
                .cmp(&a.effective_priority())
                .then_with(|| match (a.due_at, b.due_at) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        let mut working_events = req.events.to_vec();
        let mut typed_blocks = typed_blocks_from(req.events, req.all_tasks);

        for task in batch {
            match self.place(task, &working_events, &typed_blocks, req)? {
                Some(entry) => {
                    if let Some(displacement) = &entry.displacement {
                        apply_displacement(&mut working_events, displacement);
                    }
                    working_events.push(planned_event(&entry));
                    // The claimed slot's buffer region leaves the pool too,
                    // so later tasks cannot be planned inside it.
                    let rule = task.task_type.and_then(|t| req.prefs.resolve_rule(t));
                    let (buffer_before, buffer_after) = match rule {
                        Some(rule) => (rule.buffer_before, rule.buffer_after),
                        None => (task.buffer_before, task.buffer_after),
                    };
                    working_events.extend(planned_buffer_events(
                        &entry,
                        buffer_before,
                        buffer_after,
                    ));
                    if let Some(task_type) = task.task_type {
                        typed_blocks.push(TypedBlock {
                            start: entry.start,
                            end: entry.end,
                            task_type,
                        });
                    }
                    entries.push(entry);
                }
                None => skipped.push(SkippedTask {
                    task_id: task.id.clone(),
                    reason: "no viable slot in the requested range".to_string(),
                }),
            }
        }

        let summary = ProposalSummary {
            total_tasks: entries.len() + skipped.len(),
            schedulable_tasks: entries.len(),
            conflicted_tasks: skipped.len(),
            total_minutes: entries
                .iter()
                .map(|e| (e.end - e.start).num_minutes())
                .sum(),
        };
        Ok(ScheduleProposal {
            id: Uuid::new_v4().to_string(),
            status: ProposalStatus::Pending,
            entries,
            skipped,
            summary,
            created_at: req.now,
            expires_at: req.now + Duration::minutes(req.ttl_minutes.max(1)),
        })
    }

    /// Place a single task, trying displacement for urgent tasks when the
    /// calendar as-is has no room.
    fn place(
        &self,
        task: &Task,
        events: &[CalendarEvent],
        typed_blocks: &[TypedBlock],
        req: &ProposeRequest<'_>,
    ) -> Result<Option<ProposalEntry>> {
        if let Some(entry) = self.place_direct(task, events, typed_blocks, req, None)? {
            return Ok(Some(entry));
        }
        if !task.urgent {
            return Ok(None);
        }
        self.place_by_displacing(task, events, typed_blocks, req)
    }

    fn place_direct(
        &self,
        task: &Task,
        events: &[CalendarEvent],
        typed_blocks: &[TypedBlock],
        req: &ProposeRequest<'_>,
        displacement: Option<Displacement>,
    ) -> Result<Option<ProposalEntry>> {
        let alternatives = self.generator.suggest(&SuggestRequest {
            task,
            events,
            prefs: req.prefs,
            range: req.range,
            granularity_minutes: req.granularity_minutes,
            limit: ALTERNATIVES_PER_TASK,
            typed_blocks,
            now: req.now,
        })?;
        let Some(recommended) = alternatives.first().cloned() else {
            return Ok(None);
        };

        let rule = task.task_type.and_then(|t| req.prefs.resolve_rule(t));
        let requires_approval =
            !recommended.conflicts.is_empty() || displacement.is_some();
        Ok(Some(ProposalEntry {
            task_id: task.id.clone(),
            title: task.title.clone(),
            start: recommended.start,
            end: recommended.end,
            calendar_id: req.prefs.calendar_for(rule).to_string(),
            score: recommended.score,
            reasoning: recommended.reasoning,
            alternatives,
            recommended_index: 0,
            displacement,
            requires_approval,
        }))
    }

    /// Try to free a slot by moving one lower-priority linked event.
    fn place_by_displacing(
        &self,
        task: &Task,
        events: &[CalendarEvent],
        typed_blocks: &[TypedBlock],
        req: &ProposeRequest<'_>,
    ) -> Result<Option<ProposalEntry>> {
        let mut candidates: Vec<(&CalendarEvent, &Task)> = events
            .iter()
            .filter(|e| {
                e.is_busy() && !e.all_day && e.buffer.is_none() && e.recurring_event_id.is_none()
            })
            .filter_map(|e| {
                let owner_id = e.task_id.as_deref()?;
                let owner = find_task(req, owner_id)?;
                (owner.effective_priority() < task.effective_priority()).then_some((e, owner))
            })
            .collect();
        // Cheapest displacement first.
        candidates.sort_by_key(|(_, owner)| owner.effective_priority());

        for (event, owner) in candidates {
            let remaining: Vec<CalendarEvent> = events
                .iter()
                .filter(|e| e.id != event.id)
                .cloned()
                .collect();

            let Some(urgent_slot) = self
                .generator
                .suggest(&SuggestRequest {
                    task,
                    events: &remaining,
                    prefs: req.prefs,
                    range: req.range,
                    granularity_minutes: req.granularity_minutes,
                    limit: 1,
                    typed_blocks,
                    now: req.now,
                })?
                .into_iter()
                .next()
            else {
                continue;
            };

            // The displaced task needs a new home in the same plan.
            let mut after_placement = remaining.clone();
            after_placement.push(CalendarEvent {
                id: format!("planned-{}", task.id),
                calendar_id: req.prefs.default_calendar_id.clone(),
                title: task.title.clone(),
                start: urgent_slot.start,
                end: urgent_slot.end,
                all_day: false,
                status: EventStatus::Confirmed,
                task_id: Some(task.id.clone()),
                buffer: None,
                recurring_event_id: None,
            });
            let Some(new_home) = self
                .generator
                .suggest(&SuggestRequest {
                    task: owner,
                    events: &after_placement,
                    prefs: req.prefs,
                    range: req.range,
                    granularity_minutes: req.granularity_minutes,
                    limit: 1,
                    typed_blocks,
                    now: req.now,
                })?
                .into_iter()
                .next()
            else {
                continue;
            };

            let displacement = Displacement {
                event_id: event.id.clone(),
                calendar_id: event.calendar_id.clone(),
                task_id: owner.id.clone(),
                from_start: event.start,
                from_end: event.end,
                to_start: new_home.start,
                to_end: new_home.end,
                reason: format!(
                    "moves '{}' to make room for higher-priority task '{}'",
                    event.title, task.title
                ),
            };
            return self.place_direct(task, &remaining, typed_blocks, req, Some(displacement));
        }
        Ok(None)
    }
}

impl Default for ProposalBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn find_task<'a>(req: &ProposeRequest<'a>, id: &str) -> Option<&'a Task> {
    req.all_tasks
        .iter()
        .chain(req.tasks.iter())
        .find(|t| t.id == id)
}

/// Typed blocks from events already linked to typed tasks.
pub fn typed_blocks_from(events: &[CalendarEvent], tasks: &[Task]) -> Vec<TypedBlock> {
    events
        .iter()
        .filter(|e| e.is_busy() && !e.all_day && e.buffer.is_none())
        .filter_map(|e| {
            let owner_id = e.task_id.as_deref()?;
            let task_type = tasks.iter().find(|t| t.id == owner_id)?.task_type?;
            Some(TypedBlock {
                start: e.start,
                end: e.end,
                task_type,
            })
        })
        .collect()
}

fn planned_buffer_events(
    entry: &ProposalEntry,
    buffer_before: i64,
    buffer_after: i64,
) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    for (minutes, kind, start, end) in [
        (
            buffer_before,
            BufferKind::Before,
            entry.start - Duration::minutes(buffer_before),
            entry.start,
        ),
        (
            buffer_after,
            BufferKind::After,
            entry.end,
            entry.end + Duration::minutes(buffer_after),
        ),
    ] {
        if minutes <= 0 {
            continue;
        }
        events.push(CalendarEvent {
            id: format!("planned-buffer-{}-{:?}", entry.task_id, kind),
            calendar_id: entry.calendar_id.clone(),
            title: format!("Buffer for '{}'", entry.title),
            start,
            end,
            all_day: false,
            status: EventStatus::Confirmed,
            task_id: Some(entry.task_id.clone()),
            buffer: Some(kind),
            recurring_event_id: None,
        });
    }
    events
}

fn planned_event(entry: &ProposalEntry) -> CalendarEvent {
    CalendarEvent {
        id: format!("planned-{}", entry.task_id),
        calendar_id: entry.calendar_id.clone(),
        title: entry.title.clone(),
        start: entry.start,
        end: entry.end,
        all_day: false,
        status: EventStatus::Confirmed,
        task_id: Some(entry.task_id.clone()),
        buffer: None,
        recurring_event_id: None,
    }
}

fn apply_displacement(events: &mut [CalendarEvent], displacement: &Displacement) {
    if let Some(event) = events.iter_mut().find(|e| e.id == displacement.event_id) {
        event.start = displacement.to_start;
        event.end = displacement.to_end;
    }
}
