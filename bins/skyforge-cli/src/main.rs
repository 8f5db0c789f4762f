mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skyforge-cli")]
#[command(about = "SkyForge CLI - Run code through the execution cascade and inspect sandbox images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file (local sandbox first, then cloud fallbacks)
    Run {
        /// Language identifier (e.g., python, go, rust)
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        file: PathBuf,

        /// Wall-clock limit for the local sandbox (defaults to EXECUTION_TIMEOUT_MS)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Show which sandbox images are present on the local Docker daemon
    Status,

    /// List supported languages and how each one is executed
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            language,
            file,
            timeout_ms,
        } => {
            let exit_code = commands::run_file(&language, &file, timeout_ms).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Commands::Status => {
            let ready = commands::image_status().await?;
            if !ready {
                std::process::exit(1);
            }
        }
        Commands::Languages => {
            commands::list_languages();
        }
    }

    Ok(())
}
