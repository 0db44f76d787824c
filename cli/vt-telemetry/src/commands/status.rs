//! Last-flush status for a store.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use plfm_telemetry::LocalErrorStore;
use serde::Serialize;

use crate::output::{print_json, OutputFormat};

use super::CommandContext;

/// Show the last successful flush of a store.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Store identifier.
    store_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    store_id: String,
    last_remote_flush: Option<DateTime<Utc>>,
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let store = LocalErrorStore::open(&ctx.config_dir, &self.store_id).await?;
        let view = StatusView {
            store_id: self.store_id,
            last_remote_flush: store.last_remote_flush().await?,
        };

        match ctx.format {
            OutputFormat::Json => print_json(&view),
            OutputFormat::Table => {
                let last = view
                    .last_remote_flush
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".dimmed().to_string());
                println!("{:<20} {}", "Store:".bold(), view.store_id);
                println!("{:<20} {}", "Last remote flush:".bold(), last);
            }
        }

        Ok(())
    }
}
