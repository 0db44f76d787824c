//! Local error store: per-identifier bookkeeping of remote flush progress.
//!
//! Each store identifier owns one small JSON file under the config
//! directory. Writes go through a sibling temp file and a rename, so a
//! crash mid-write leaves the previous record intact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::TelemetryError;
use crate::session::ConfigDir;

/// Persisted store record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStoreState {
    /// Epoch milliseconds of the last successful remote flush.
    pub last_remote_flush: i64,
}

/// Handle on one store file.
#[derive(Debug, Clone)]
pub struct LocalErrorStore {
    store_id: String,
    path: PathBuf,
}

impl LocalErrorStore {
    /// Open the store for `store_id`. Nothing is created on disk until the
    /// first write.
    pub async fn open(dir: &ConfigDir, store_id: &str) -> Result<Self, TelemetryError> {
        let store_dir = dir.store_dir();
        validate_store_id(store_id, &store_dir)?;

        Ok(Self {
            store_id: store_id.to_string(),
            path: store_dir.join(format!("{store_id}.json")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time of the last successful flush, or `None` if there never was one.
    pub async fn last_remote_flush(&self) -> Result<Option<DateTime<Utc>>, TelemetryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TelemetryError::storage("reading store", &self.path, e)),
        };

        let state: LocalStoreState = serde_json::from_slice(&bytes)
            .map_err(|e| TelemetryError::storage("parsing store", &self.path, e))?;

        DateTime::from_timestamp_millis(state.last_remote_flush)
            .map(Some)
            .ok_or_else(|| {
                TelemetryError::storage(
                    "parsing store",
                    &self.path,
                    format!("timestamp out of range: {}", state.last_remote_flush),
                )
            })
    }

    /// Overwrite the last-flush time. Durable once this returns.
    pub async fn set_last_remote_flush(&self, at: DateTime<Utc>) -> Result<(), TelemetryError> {
        let state = LocalStoreState {
            last_remote_flush: at.timestamp_millis(),
        };
        let bytes = serde_json::to_vec(&state)
            .map_err(|e| TelemetryError::storage("serializing store", &self.path, e))?;

        if let Some(store_dir) = self.path.parent() {
            tokio::fs::create_dir_all(store_dir)
                .await
                .map_err(|e| TelemetryError::storage("creating store directory", store_dir, e))?;
        }

        let tmp = self.path.with_file_name(format!(
            ".{}.{}.tmp",
            self.store_id,
            hex::encode(rand::random::<[u8; 4]>())
        ));

        if let Err(e) = write_synced(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(TelemetryError::storage("writing store", &tmp, e));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(TelemetryError::storage("replacing store", &self.path, e));
        }

        debug!(
            store_id = %self.store_id,
            last_remote_flush = state.last_remote_flush,
            "Recorded remote flush"
        );
        Ok(())
    }

    /// Whether a caller should flush again: never flushed, or at least
    /// `interval` has passed since the last flush.
    pub async fn is_flush_due(
        &self,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, TelemetryError> {
        Ok(match self.last_remote_flush().await? {
            None => true,
            Some(last) => now - last >= interval,
        })
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn validate_store_id(store_id: &str, store_dir: &Path) -> Result<(), TelemetryError> {
    let valid = !store_id.is_empty()
        && store_id != "."
        && store_id != ".."
        && !store_id.contains(['/', '\\'])
        && !store_id.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(TelemetryError::storage(
            "opening store",
            store_dir,
            format!("invalid store identifier {store_id:?}"),
        ))
    }
}
