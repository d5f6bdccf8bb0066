use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use slotwise_core::CommitEngine;

use crate::snapshot::Snapshot;

#[derive(Args)]
pub struct ScheduleArgs {
    /// Snapshot file
    #[arg(long)]
    pub data: PathBuf,
    /// Task to place
    #[arg(long)]
    pub task: String,
    /// Slot start (RFC 3339)
    #[arg(long)]
    pub start: DateTime<Utc>,
    /// Slot end (RFC 3339)
    #[arg(long)]
    pub end: DateTime<Utc>,
    /// Write even when the slot has blocking conflicts
    #[arg(long)]
    pub force: bool,
}

pub async fn run(args: ScheduleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut snapshot = Snapshot::load(&args.data)?;
    snapshot.task(&args.task)?;

    let (calendar, tasks) = snapshot.stores();
    let engine = CommitEngine::new(&calendar, &tasks);
    let result = engine
        .schedule_task(
            &args.task,
            args.start,
            args.end,
            &snapshot.events,
            &snapshot.preferences,
            args.force,
        )
        .await?;

    if result.requires_approval {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Err("slot has blocking conflicts; re-run with --force to override".into());
    }

    snapshot.absorb(&calendar, &tasks);
    snapshot.save(&args.data)?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
