use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;
use slotwise_core::{compute_availability, DateRange};

use crate::snapshot::Snapshot;

#[derive(Args)]
pub struct AvailabilityArgs {
    /// Snapshot file
    #[arg(long)]
    pub data: PathBuf,
    /// First date (YYYY-MM-DD)
    #[arg(long)]
    pub from: NaiveDate,
    /// Last date, inclusive
    #[arg(long)]
    pub to: NaiveDate,
    /// Slot size in minutes
    #[arg(long, default_value_t = 30)]
    pub granularity: i64,
}

pub fn run(args: AvailabilityArgs) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = Snapshot::load(&args.data)?;
    let range = DateRange::new(args.from, args.to)?;
    let windows = compute_availability(
        &snapshot.events,
        &snapshot.preferences.protected_slots,
        &snapshot.preferences.working_hours,
        range,
        args.granularity,
    )?;
    println!("{}", serde_json::to_string_pretty(&windows)?);
    Ok(())
}
