//! Stackvisor CLI - bring an Ethereum node stack up and down.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stackvisor::descriptor::DEFAULT_DESCRIPTOR;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackvisor")]
#[command(about = "Supervise an execution/consensus node stack")]
#[command(version)]
struct Cli {
    /// Deployment descriptor
    #[arg(short, long, global = true, default_value = DEFAULT_DESCRIPTOR)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the secret and run the deployment until a termination signal
    Up,

    /// Stop a running deployment
    Down {
        /// Also remove the shared secret file
        #[arg(long)]
        purge_secret: bool,
    },

    /// Print the last status report
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the descriptor and print the start order
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Up => commands::up::run(&cli.config).await,
        Commands::Down { purge_secret } => commands::down::run(&cli.config, purge_secret).await,
        Commands::Status { json } => commands::status::run(&cli.config, json),
        Commands::Check => commands::check::run(&cli.config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, label = e.as_label(), "stackvisor failed");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
