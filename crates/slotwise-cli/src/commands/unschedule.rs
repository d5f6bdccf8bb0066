use std::path::PathBuf;

use clap::Args;
use slotwise_core::CommitEngine;

use crate::snapshot::Snapshot;

#[derive(Args)]
pub struct UnscheduleArgs {
    /// Snapshot file
    #[arg(long)]
    pub data: PathBuf,
    /// Task to unschedule
    #[arg(long)]
    pub task: String,
}

pub async fn run(args: UnscheduleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut snapshot = Snapshot::load(&args.data)?;
    snapshot.task(&args.task)?;

    let (calendar, tasks) = snapshot.stores();
    let engine = CommitEngine::new(&calendar, &tasks);
    engine.unschedule_task(&args.task).await?;

    snapshot.absorb(&calendar, &tasks);
    snapshot.save(&args.data)?;

    println!("task {} unscheduled", args.task);
    Ok(())
}
