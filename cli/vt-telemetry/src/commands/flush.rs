//! The flush worker entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use plfm_telemetry::{FlushArgs, FlushWorker};

use super::CommandContext;

/// Deliver one error batch and record the result.
#[derive(Debug, Args)]
pub struct FlushCommand {
    /// Store identifier the flush is recorded under.
    pub(super) store_id: String,

    /// Batch file written by the CLI. Deleted once read.
    pub(super) batch_file: PathBuf,
}

impl FlushCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<u8> {
        let worker = FlushWorker::new(ctx.config_dir);
        let args = FlushArgs {
            store_id: self.store_id,
            batch_path: self.batch_file,
        };

        let outcome = worker
            .run_with_ambient_session(&args)
            .await
            .context("failed to record flush failure")?;

        Ok(outcome.exit_code())
    }
}
