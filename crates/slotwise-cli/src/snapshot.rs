//! Snapshot file the CLI operates on.
//!
//! One JSON document holding tasks, mirrored calendar events, scheduling
//! preferences, and any pending proposals. Commands read it, act through
//! the in-memory stores, and write the updated state back.

use std::path::Path;

use serde::{Deserialize, Serialize};
use slotwise_core::{
    CalendarEvent, MemoryCalendarStore, MemoryTaskStore, ScheduleProposal, Task,
    UserSchedulingPreferences,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub preferences: UserSchedulingPreferences,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub events: Vec<CalendarEvent>,
    #[serde(default)]
    pub proposals: Vec<ScheduleProposal>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read snapshot {}: {}", path.display(), e))?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        snapshot.preferences.validate()?;
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| format!("cannot write snapshot {}: {}", path.display(), e))?;
        Ok(())
    }

    pub fn task(&self, task_id: &str) -> Result<&Task, Box<dyn std::error::Error>> {
        self.tasks
            .iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| format!("task '{}' not in snapshot", task_id).into())
    }

    pub fn proposal(&self, proposal_id: &str) -> Result<&ScheduleProposal, Box<dyn std::error::Error>> {
        self.proposals
            .iter()
            .find(|p| p.id == proposal_id)
            .ok_or_else(|| format!("proposal '{}' not in snapshot", proposal_id).into())
    }

    /// In-memory stores seeded from this snapshot.
    pub fn stores(&self) -> (MemoryCalendarStore, MemoryTaskStore) {
        (
            MemoryCalendarStore::with_events(self.events.clone()),
            MemoryTaskStore::with_tasks(self.tasks.clone()),
        )
    }

    /// Fold store state back into the snapshot after a commit operation.
    pub fn absorb(&mut self, calendar: &MemoryCalendarStore, tasks: &MemoryTaskStore) {
        self.events = calendar.events();
        self.tasks = tasks.snapshot();
    }
}
