//! Error taxonomy for the telemetry pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while capturing, storing, or delivering error telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The batch file is missing, unreadable, or not valid JSON.
    #[error("failed to read error batch at {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    /// No usable session (account, workspace, token) could be resolved.
    #[error("no authenticated session: {0}")]
    Auth(String),

    /// Every delivery attempt to the remote endpoint failed.
    #[error("telemetry delivery failed after {attempts} attempt(s): {last_error}")]
    RemoteDelivery { attempts: u32, last_error: String },

    /// The local store could not be read or written.
    #[error("telemetry store error while {operation} at {path:?}: {message}")]
    Storage {
        operation: &'static str,
        path: PathBuf,
        message: String,
    },

    /// The flush worker process could not be started.
    #[error("failed to spawn flush worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl TelemetryError {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn storage(
        operation: &'static str,
        path: impl Into<PathBuf>,
        message: impl ToString,
    ) -> Self {
        Self::Storage {
            operation,
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Stable identifier recorded in failure artifacts and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Auth(_) => "auth",
            Self::RemoteDelivery { .. } => "remote_delivery",
            Self::Storage { .. } => "storage",
            Self::Spawn(_) => "spawn",
        }
    }
}

/// The failure artifact itself could not be written. There is no fallback
/// past this point; callers let it terminate the process.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to create errors directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write failure artifact {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize failure artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}
