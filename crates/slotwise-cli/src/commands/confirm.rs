use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use slotwise_core::{CommitEngine, ConfirmApprovals};

use crate::snapshot::Snapshot;

#[derive(Args)]
pub struct ConfirmArgs {
    /// Snapshot file
    #[arg(long)]
    pub data: PathBuf,
    /// Proposal to confirm
    #[arg(long)]
    pub proposal: String,
    /// Commit only these tasks (repeatable); omit to approve all
    #[arg(long = "approve")]
    pub approve: Vec<String>,
    /// Allow entries that move another task's event
    #[arg(long)]
    pub approve_displacements: bool,
    /// Clock override (RFC 3339), for reproducible output
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,
}

pub async fn run(args: ConfirmArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut snapshot = Snapshot::load(&args.data)?;
    let proposal = snapshot.proposal(&args.proposal)?.clone();
    let now = args.now.unwrap_or_else(Utc::now);

    let approvals = ConfirmApprovals {
        task_ids: (!args.approve.is_empty()).then(|| args.approve.clone()),
        displacements_approved: args.approve_displacements,
    };

    let (calendar, tasks) = snapshot.stores();
    let engine = CommitEngine::new(&calendar, &tasks);
    let outcome = engine
        .confirm_proposal(&proposal, &snapshot.preferences, &approvals, now)
        .await?;

    snapshot.absorb(&calendar, &tasks);
    if let Some(stored) = snapshot.proposals.iter_mut().find(|p| p.id == proposal.id) {
        stored.status = outcome.status;
    }
    snapshot.save(&args.data)?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
