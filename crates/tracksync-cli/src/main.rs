mod commands;
mod logging;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tracksync",
    version,
    about = "Incremental asset syncer with commit-after-send checkpoints"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a syncer until interrupted
    Run {
        /// Path to syncer YAML file
        syncer: PathBuf,
        /// Run a single cycle and exit
        #[arg(long, conflicts_with = "max_cycles")]
        once: bool,
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Validate syncer configuration, adapter and tracking store
    Check {
        /// Path to syncer YAML file
        syncer: PathBuf,
    },
    /// Show the persisted cursor, recent cycles and asset states
    Status {
        /// Path to syncer YAML file
        syncer: PathBuf,
        /// List every asset still being tracked
        #[arg(long)]
        active: bool,
        /// Number of recent cycles to show
        #[arg(long, default_value_t = 5)]
        cycles: usize,
    },
    /// List available adapters
    Adapters,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            syncer,
            once,
            max_cycles,
        } => commands::run::execute(&syncer, once, max_cycles).await,
        Commands::Check { syncer } => commands::check::execute(&syncer).await,
        Commands::Status {
            syncer,
            active,
            cycles,
        } => commands::status::execute(&syncer, active, cycles),
        Commands::Adapters => {
            commands::adapters::execute();
            Ok(())
        }
    }
}
