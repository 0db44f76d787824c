//! Foreground side of the pipeline: collect errors during a CLI run, then
//! hand them to a detached flush worker at exit.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TelemetryError;
use crate::record::{ErrorBatch, ErrorRecord};
use crate::session::write_private;

/// How to launch the flush worker.
///
/// The worker is invoked as `<program> <args...> <store_id> <batch_path>`.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    /// `<program> flush <store_id> <batch_path>`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![OsString::from("flush")],
        }
    }

    /// Re-invoke the running executable's `flush` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Replace the arguments placed before the store id and batch path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self, store_id: &str, batch_path: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(store_id)
            .arg(batch_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group, so a Ctrl+C aimed at the CLI does not reach it.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command
    }
}

/// A worker that was started and left running.
#[derive(Debug, Clone)]
pub struct SpawnedFlush {
    pub pid: u32,
    pub batch_path: PathBuf,
}

/// Accumulates errors for one CLI invocation.
#[derive(Debug, Clone)]
pub struct ErrorCollector {
    store_id: String,
    batch_dir: PathBuf,
    errors: Vec<ErrorRecord>,
}

impl ErrorCollector {
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            batch_dir: std::env::temp_dir(),
            errors: Vec::new(),
        }
    }

    /// Directory for batch handoff files (defaults to the system temp dir).
    pub fn with_batch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.batch_dir = dir.into();
        self
    }

    pub fn register(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    /// Capture `err` and its sources.
    pub fn register_error(&mut self, err: &(dyn std::error::Error + 'static)) {
        self.register(ErrorRecord::from_error(err));
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Write the collected errors to a fresh batch file.
    pub fn write_batch(&self) -> Result<PathBuf, TelemetryError> {
        let path = self
            .batch_dir
            .join(format!("vt-telemetry-{}.json", Uuid::new_v4().simple()));
        let batch = ErrorBatch::new(self.errors.clone());
        let bytes = serde_json::to_vec(&batch)
            .map_err(|e| TelemetryError::storage("serializing batch", &path, e))?;

        write_private(&path, &bytes)
            .map_err(|e| TelemetryError::storage("writing batch", &path, e))?;

        Ok(path)
    }

    /// Hand the collected errors to a detached worker and return at once.
    ///
    /// Nothing is written or spawned when no errors were collected. The
    /// worker's exit status is never observed.
    pub fn flush(self, worker: &WorkerCommand) -> Result<Option<SpawnedFlush>, TelemetryError> {
        if self.is_empty() {
            debug!(store_id = %self.store_id, "No errors to flush");
            return Ok(None);
        }

        let batch_path = self.write_batch()?;

        match worker.command(&self.store_id, &batch_path).spawn() {
            Ok(child) => {
                let pid = child.id();
                info!(
                    store_id = %self.store_id,
                    pid,
                    error_count = self.errors.len(),
                    "Spawned telemetry flush worker"
                );
                Ok(Some(SpawnedFlush { pid, batch_path }))
            }
            Err(e) => {
                let _ = std::fs::remove_file(&batch_path);
                Err(TelemetryError::Spawn(e))
            }
        }
    }
}
