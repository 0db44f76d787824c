//! CLI commands.

mod capture;
mod failures;
mod flush;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use plfm_telemetry::ConfigDir;

use crate::output::OutputFormat;

/// vt telemetry - deliver and inspect CLI error telemetry.
#[derive(Debug, Parser)]
#[command(name = "vt-telemetry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Configuration directory (defaults to the platform config directory).
    #[arg(long, global = true, env = "VT_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deliver an error batch file (run detached by the CLI).
    Flush(flush::FlushCommand),

    /// Show when a store last flushed successfully.
    Status(status::StatusCommand),

    /// List failure artifacts left by failed flushes.
    Failures(failures::FailuresCommand),

    /// Queue an error message for background delivery.
    Capture(capture::CaptureCommand),
}

impl Cli {
    /// Run the command, returning the process exit status.
    pub async fn run(self) -> Result<u8> {
        let config_dir = match self.config_dir {
            Some(dir) => ConfigDir::new(dir),
            None => ConfigDir::discover()?,
        };

        let ctx = CommandContext {
            config_dir,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Flush(cmd) => cmd.run(ctx).await,
            Commands::Status(cmd) => cmd.run(ctx).await.map(|()| 0),
            Commands::Failures(cmd) => cmd.run(ctx).map(|()| 0),
            Commands::Capture(cmd) => cmd.run(ctx).map(|()| 0),
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config_dir: ConfigDir,
    pub format: OutputFormat,
}
