//! Shipline CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shipline")]
#[command(about = "Provision and run container release pipelines", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a deployment file and print the provisioning order
    Validate {
        /// Path to the deployment file
        #[arg(env = "SHIPLINE_FILE", default_value = "shipline.kdl")]
        file: PathBuf,
    },
    /// Show the provisioning waves and the stage layout
    Plan {
        /// Path to the deployment file
        #[arg(env = "SHIPLINE_FILE", default_value = "shipline.kdl")]
        file: PathBuf,
    },
    /// Provision against the in-memory platform
    Apply {
        /// Path to the deployment file
        #[arg(env = "SHIPLINE_FILE", default_value = "shipline.kdl")]
        file: PathBuf,
        /// Simulate a push of this tag and run the pipeline
        #[arg(long)]
        push: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Validate { file } => {
            commands::validate(&file)?;
        }
        Commands::Plan { file } => {
            commands::plan(&file)?;
        }
        Commands::Apply { file, push } => {
            commands::apply::apply(&file, push).await?;
        }
    }

    Ok(())
}
