use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use slotwise_core::{DateRange, ProposalBuilder, ProposeRequest, Task};

use crate::snapshot::Snapshot;

#[derive(Args)]
pub struct ProposeArgs {
    /// Snapshot file
    #[arg(long)]
    pub data: PathBuf,
    /// Task to include; repeat for a batch. Defaults to every
    /// unscheduled schedulable task.
    #[arg(long = "task")]
    pub tasks: Vec<String>,
    /// First date (YYYY-MM-DD)
    #[arg(long)]
    pub from: NaiveDate,
    /// Last date, inclusive
    #[arg(long)]
    pub to: NaiveDate,
    /// Slot size in minutes
    #[arg(long, default_value_t = 30)]
    pub granularity: i64,
    /// Minutes the proposal stays valid
    #[arg(long, default_value_t = 30)]
    pub ttl: i64,
    /// Clock override (RFC 3339), for reproducible output
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,
}

pub fn run(args: ProposeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut snapshot = Snapshot::load(&args.data)?;

    let batch: Vec<Task> = if args.tasks.is_empty() {
        snapshot
            .tasks
            .iter()
            .filter(|t| t.is_schedulable() && !t.is_scheduled())
            .cloned()
            .collect()
    } else {
        args.tasks
            .iter()
            .map(|id| snapshot.task(id).map(Task::clone))
            .collect::<Result<_, _>>()?
    };
    if batch.is_empty() {
        return Err("no schedulable tasks to propose for".into());
    }

    let proposal = ProposalBuilder::new().build(&ProposeRequest {
        tasks: &batch,
        all_tasks: &snapshot.tasks,
        events: &snapshot.events,
        prefs: &snapshot.preferences,
        range: DateRange::new(args.from, args.to)?,
        granularity_minutes: args.granularity,
        ttl_minutes: args.ttl,
        now: args.now.unwrap_or_else(Utc::now),
    })?;

    println!("{}", serde_json::to_string_pretty(&proposal)?);
    snapshot.proposals.push(proposal);
    snapshot.save(&args.data)?;
    Ok(())
}
