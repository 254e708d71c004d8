mod workflows;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// package-builder - build native OS packages inside disposable containers
#[derive(Parser)]
#[command(name = "package-builder")]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Directory holding profiles.json and user script templates
    #[arg(long, global = true)]
    profiles_dir: Option<PathBuf>,

    /// Continue a batch after a failed build
    #[arg(long, global = true)]
    keep_going: bool,

    /// Collect artifacts even when the build script exits unsuccessfully
    #[arg(long, global = true)]
    ignore_script_exit: bool,

    /// Do not forward build machine output to the log
    #[arg(long, global = true)]
    quiet_machine: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every section of a batch file in order
    Batch {
        /// Path to the TOML batch file
        file: PathBuf,
    },

    /// Run a single build described by flags
    Manual(workflows::ManualArgs),

    /// List the available build profiles
    Profiles,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .init();

    let options = workflows::RunOptions::from_cli(&cli);
    match cli.command {
        Commands::Batch { file } => workflows::run_batch_file(&file, &options),
        Commands::Manual(args) => workflows::run_manual(args, &options),
        Commands::Profiles => workflows::list_profiles(&options),
    }
}
