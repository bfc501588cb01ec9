//! Tributary CLI
//!
//! Runs and inspects multi-source ingestion projects.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

/// Tributary - multi-source data ingestion and reconciliation
#[derive(Parser)]
#[command(name = "tributary")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory or tributary.yaml path
    #[arg(short, long, default_value = ".")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every configured source into the store
    Run {
        /// Ingest a specific source only
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Validate the project configuration and all source descriptors
    Validate,

    /// List configured sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Run { source } => {
            commands::run::run(&cli.config, source.as_deref()).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
        Commands::Sources => {
            commands::sources::run(&cli.config).await?;
        }
    }

    Ok(())
}
