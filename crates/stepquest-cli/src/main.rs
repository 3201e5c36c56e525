use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "stepquest-cli", version, about = "Stepquest CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lifetime step and mission totals
    Stats(commands::stats::StatsArgs),
    /// Completed missions, most recent first
    History(commands::history::HistoryArgs),
    /// Delete lifetime stats and mission history
    Reset(commands::reset::ResetArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Move local progress into another database
    Merge(commands::merge::MergeArgs),
    /// Walk a simulated mission against the local database
    Simulate(commands::simulate::SimulateArgs),
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Stats(args) => commands::stats::run(args),
        Commands::History(args) => commands::history::run(args),
        Commands::Reset(args) => commands::reset::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Merge(args) => commands::merge::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
