//! Coursework CLI entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coursework", version, about = "Submit coursework from the command line")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// The assignment a submission goes to.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Course id
    #[arg(long)]
    pub course: String,
    /// Assignment id
    #[arg(long)]
    pub assignment: String,
    /// Comment attached to the submission
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a text entry
    Text {
        #[command(flatten)]
        target: Target,
        /// Submission body
        body: String,
    },
    /// Submit a URL
    Url {
        #[command(flatten)]
        target: Target,
        /// URL to submit
        url: String,
    },
    /// Upload files and submit them
    Files {
        #[command(flatten)]
        target: Target,
        /// Replace same-named files instead of renaming
        #[arg(long)]
        overwrite: bool,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show recorded submissions
    Status {
        /// Submission id (all submissions when omitted)
        id: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so results on stdout stay parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    }
    .with_env_overrides();
    tracing::debug!(base_url = %config.base_url, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, cli.command))
}
