use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use slotwise_core::{typed_blocks_from, DateRange, SuggestRequest, SuggestionGenerator};

use crate::snapshot::Snapshot;

#[derive(Args)]
pub struct SuggestArgs {
    /// Snapshot file
    #[arg(long)]
    pub data: PathBuf,
    /// Task to find slots for
    #[arg(long)]
    pub task: String,
    /// First date (YYYY-MM-DD)
    #[arg(long)]
    pub from: NaiveDate,
    /// Last date, inclusive
    #[arg(long)]
    pub to: NaiveDate,
    /// Slot size in minutes
    #[arg(long, default_value_t = 30)]
    pub granularity: i64,
    /// Maximum number of suggestions
    #[arg(long, default_value_t = 3)]
    pub limit: usize,
    /// Clock override (RFC 3339), for reproducible output
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,
}

pub fn run(args: SuggestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = Snapshot::load(&args.data)?;
    let task = snapshot.task(&args.task)?;
    let typed_blocks = typed_blocks_from(&snapshot.events, &snapshot.tasks);

    let suggestions = SuggestionGenerator::new().suggest(&SuggestRequest {
        task,
        events: &snapshot.events,
        prefs: &snapshot.preferences,
        range: DateRange::new(args.from, args.to)?,
        granularity_minutes: args.granularity,
        limit: args.limit,
        typed_blocks: &typed_blocks,
        now: args.now.unwrap_or_else(Utc::now),
    })?;

    println!("{}", serde_json::to_string_pretty(&suggestions)?);
    Ok(())
}
