//! Failure artifacts: the last-resort record of a flush that did not make it.
//!
//! Artifacts are never cleaned up automatically.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{ArtifactError, TelemetryError};
use crate::record::ErrorRecord;
use crate::worker::FlushStage;

/// Why the flush failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub kind: String,
    pub message: String,
}

impl From<&TelemetryError> for FailureCause {
    fn from(err: &TelemetryError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Contents of one artifact file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureArtifact {
    pub failed_at: DateTime<Utc>,
    pub store_id: String,
    pub batch_path: PathBuf,
    /// Stage the worker was in when it failed.
    pub stage: FlushStage,
    pub error: FailureCause,
    /// The batch, when it was read before the failure.
    pub errors: Option<Vec<ErrorRecord>>,
}

impl FailureArtifact {
    /// Write to a fresh `<prefix>-<random>.json`, creating the directory.
    pub async fn write(&self, prefix: &Path) -> Result<PathBuf, ArtifactError> {
        let path = artifact_path(prefix);
        let bytes = serde_json::to_vec(self)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ArtifactError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| ArtifactError::Write {
                path: path.clone(),
                source,
            })?;
        file.write_all(&bytes)
            .await
            .map_err(|source| ArtifactError::Write {
                path: path.clone(),
                source,
            })?;
        file.sync_all()
            .await
            .map_err(|source| ArtifactError::Write {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// `<prefix>-<16 hex chars>.json`
pub fn artifact_path(prefix: &Path) -> PathBuf {
    let suffix = hex::encode(rand::random::<[u8; 8]>());
    let mut name = prefix
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("flush"));
    name.push(format!("-{suffix}.json"));
    prefix.with_file_name(name)
}

/// Artifact files under `prefix`, oldest name first.
pub fn list_artifacts(prefix: &Path) -> std::io::Result<Vec<PathBuf>> {
    let Some(dir) = prefix.parent() else {
        return Ok(Vec::new());
    };
    let stem = prefix
        .file_name()
        .map(|n| format!("{}-", n.to_string_lossy()))
        .unwrap_or_else(|| "flush-".to_string());

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&stem) && name.ends_with(".json") {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> FailureArtifact {
        FailureArtifact {
            failed_at: Utc::now(),
            store_id: "cli".to_string(),
            batch_path: PathBuf::from("/tmp/batch.json"),
            stage: FlushStage::Report,
            error: FailureCause {
                kind: "remote_delivery".to_string(),
                message: "timed out".to_string(),
            },
            errors: Some(vec![ErrorRecord::new(json!({"message": "x"}))]),
        }
    }

    #[test]
    fn test_artifact_path_shape() {
        let path = artifact_path(Path::new("/cfg/errors/flush"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        assert_eq!(path.parent().unwrap(), Path::new("/cfg/errors"));
        assert!(name.starts_with("flush-"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "flush-".len() + 16 + ".json".len());
    }

    #[test]
    fn test_artifact_paths_are_unique() {
        let prefix = Path::new("/cfg/errors/flush");
        assert_ne!(artifact_path(prefix), artifact_path(prefix));
    }

    #[tokio::test]
    async fn test_write_creates_directory_and_lists() {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = tmp.path().join("errors").join("flush");

        let written = sample().write(&prefix).await.unwrap();
        let listed = list_artifacts(&prefix).unwrap();
        assert_eq!(listed, vec![written.clone()]);

        let raw = std::fs::read_to_string(&written).unwrap();
        assert!(raw.contains(r#"{"message":"x"}"#));
        assert!(raw.contains(r#""stage":"report""#));

        let back = FailureArtifact::read(&written).unwrap();
        assert_eq!(back.error.kind, "remote_delivery");
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = tmp.path().join("nowhere").join("flush");
        assert!(list_artifacts(&prefix).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwritable_directory_is_artifact_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("errors");
        std::fs::write(&blocker, "a file, not a directory").unwrap();

        let err = sample().write(&blocker.join("flush")).await.unwrap_err();
        assert!(matches!(err, ArtifactError::CreateDir { .. }));
    }
}
