//! Failure artifact listing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use plfm_telemetry::{list_artifacts, FailureArtifact};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{display_option, print_output};

use super::CommandContext;

/// List failure artifacts.
#[derive(Debug, Args)]
pub struct FailuresCommand {}

#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub(super) struct FailureView {
    #[tabled(rename = "Kind")]
    kind: String,

    #[tabled(rename = "Store", display = "display_option")]
    store_id: Option<String>,

    #[tabled(rename = "Failed", display = "display_time")]
    failed_at: Option<DateTime<Utc>>,

    #[tabled(rename = "Errors", display = "display_option")]
    error_count: Option<usize>,

    #[tabled(rename = "Path", display = "display_path")]
    path: PathBuf,
}

fn display_time(at: &Option<DateTime<Utc>>) -> String {
    at.map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

impl FailureView {
    fn load(path: PathBuf) -> Self {
        match FailureArtifact::read(&path) {
            Ok(artifact) => Self {
                kind: artifact.error.kind,
                store_id: Some(artifact.store_id),
                failed_at: Some(artifact.failed_at),
                error_count: artifact.errors.map(|e| e.len()),
                path,
            },
            Err(_) => Self {
                kind: "unreadable".to_string(),
                store_id: None,
                failed_at: None,
                error_count: None,
                path,
            },
        }
    }
}

impl FailuresCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let prefix = ctx.config_dir.errors_prefix();
        let views: Vec<FailureView> = list_artifacts(&prefix)
            .with_context(|| format!("Failed to list artifacts under {:?}", prefix))?
            .into_iter()
            .map(FailureView::load)
            .collect();

        print_output(&views, ctx.format);
        Ok(())
    }
}
