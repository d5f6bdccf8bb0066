use clap::{Parser, Subcommand};

mod commands;
mod snapshot;

#[derive(Parser)]
#[command(name = "slotwise-cli", version, about = "Slotwise scheduling CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Free/busy availability for a date range
    Availability(commands::availability::AvailabilityArgs),
    /// Ranked slot suggestions for one task
    Suggest(commands::suggest::SuggestArgs),
    /// Build a batch schedule proposal
    Propose(commands::propose::ProposeArgs),
    /// Confirm a previously built proposal
    Confirm(commands::confirm::ConfirmArgs),
    /// Place one task at an explicit slot
    Schedule(commands::schedule::ScheduleArgs),
    /// Remove a task's events and clear its schedule
    Unschedule(commands::unschedule::UnscheduleArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Availability(args) => commands::availability::run(args),
        Commands::Suggest(args) => commands::suggest::run(args),
        Commands::Propose(args) => commands::propose::run(args),
        Commands::Confirm(args) => commands::confirm::run(args).await,
        Commands::Schedule(args) => commands::schedule::run(args).await,
        Commands::Unschedule(args) => commands::unschedule::run(args).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
