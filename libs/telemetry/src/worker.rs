//! Flush worker: the detached process that delivers one error batch.
//!
//! A run moves through `Start -> ReadBatch -> Report -> RecordFlush` and
//! ends either flushed or failed. The batch file is deleted as soon as it
//! has been read, before any delivery attempt; the flush time is recorded
//! only after delivery succeeded. Any failure is written to exactly one
//! failure artifact.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::artifact::FailureArtifact;
use crate::error::{ArtifactError, TelemetryError};
use crate::record::ErrorBatch;
use crate::reporter::Reporter;
use crate::session::ConfigDir;
use crate::store::LocalErrorStore;

/// Where a worker run was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushStage {
    Start,
    ReadBatch,
    Report,
    RecordFlush,
}

impl FlushStage {
    /// Name used in logs; matches the serialized form in artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ReadBatch => "read_batch",
            Self::Report => "report",
            Self::RecordFlush => "record_flush",
        }
    }
}

/// Positional worker inputs.
#[derive(Debug, Clone)]
pub struct FlushArgs {
    pub store_id: String,
    pub batch_path: PathBuf,
}

/// Terminal state of a run.
#[derive(Debug)]
pub enum FlushOutcome {
    Flushed {
        error_count: usize,
        flushed_at: DateTime<Utc>,
    },
    Failed {
        artifact: PathBuf,
        error: TelemetryError,
    },
}

impl FlushOutcome {
    pub fn is_flushed(&self) -> bool {
        matches!(self, Self::Flushed { .. })
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Flushed { .. } => 0,
            Self::Failed { .. } => 1,
        }
    }
}

/// Runs flushes against one config directory.
#[derive(Debug, Clone)]
pub struct FlushWorker {
    config_dir: ConfigDir,
    errors_prefix: PathBuf,
}

impl FlushWorker {
    pub fn new(config_dir: ConfigDir) -> Self {
        let errors_prefix = config_dir.errors_prefix();
        Self {
            config_dir,
            errors_prefix,
        }
    }

    pub fn errors_prefix(&self) -> &std::path::Path {
        &self.errors_prefix
    }

    /// Flush using the reporter resolved from the ambient session.
    pub async fn run_with_ambient_session(
        &self,
        args: &FlushArgs,
    ) -> Result<FlushOutcome, ArtifactError> {
        let dir = self.config_dir.clone();
        self.run(args, move || Reporter::get_reporter(&dir)).await
    }

    /// Run one flush.
    ///
    /// Every [`TelemetryError`] is turned into a failure artifact and a
    /// [`FlushOutcome::Failed`]. Only a failure to write that artifact is
    /// returned as `Err`.
    pub async fn run<F>(
        &self,
        args: &FlushArgs,
        make_reporter: F,
    ) -> Result<FlushOutcome, ArtifactError>
    where
        F: FnOnce() -> Result<Reporter, TelemetryError>,
    {
        let mut stage = FlushStage::Start;
        let mut batch = None;

        match self.flush(args, make_reporter, &mut stage, &mut batch).await {
            Ok((error_count, flushed_at)) => {
                info!(
                    store_id = %args.store_id,
                    error_count,
                    flushed_at = %flushed_at,
                    "Flushed error batch"
                );
                Ok(FlushOutcome::Flushed {
                    error_count,
                    flushed_at,
                })
            }
            Err(err) => {
                error!(
                    store_id = %args.store_id,
                    stage = stage.as_str(),
                    kind = err.kind(),
                    error = %err,
                    "Flush failed"
                );

                let artifact = FailureArtifact {
                    failed_at: Utc::now(),
                    store_id: args.store_id.clone(),
                    batch_path: args.batch_path.clone(),
                    stage,
                    error: (&err).into(),
                    errors: batch.map(|b: ErrorBatch| b.errors),
                };
                let path = artifact.write(&self.errors_prefix).await?;
                info!(artifact = %path.display(), "Wrote failure artifact");

                Ok(FlushOutcome::Failed {
                    artifact: path,
                    error: err,
                })
            }
        }
    }

    async fn flush<F>(
        &self,
        args: &FlushArgs,
        make_reporter: F,
        stage: &mut FlushStage,
        slot: &mut Option<ErrorBatch>,
    ) -> Result<(usize, DateTime<Utc>), TelemetryError>
    where
        F: FnOnce() -> Result<Reporter, TelemetryError>,
    {
        let store = LocalErrorStore::open(&self.config_dir, &args.store_id).await?;

        *stage = FlushStage::ReadBatch;
        let batch = slot.insert(ErrorBatch::read(&args.batch_path).await?);
        tokio::fs::remove_file(&args.batch_path)
            .await
            .map_err(|e| TelemetryError::storage("removing batch file", &args.batch_path, e))?;
        debug!(
            path = %args.batch_path.display(),
            error_count = batch.errors.len(),
            "Consumed error batch"
        );

        *stage = FlushStage::Report;
        let reporter = make_reporter()?;
        reporter.report_errors(&batch.errors).await?;

        *stage = FlushStage::RecordFlush;
        let flushed_at = Utc::now();
        store.set_last_remote_flush(flushed_at).await?;

        Ok((batch.errors.len(), flushed_at))
    }
}
