//! Error records and the batch file handed from the CLI to the flush worker.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::TelemetryError;

/// One captured error.
///
/// The pipeline treats records as opaque JSON: whatever the collector
/// registered is what the remote endpoint receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorRecord(Value);

impl ErrorRecord {
    /// Wrap an arbitrary JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Capture a Rust error together with its chain of sources.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self(json!({
            "id": Uuid::new_v4(),
            "message": err.to_string(),
            "causes": causes,
            "timestamp": Utc::now(),
            "context": {},
        }))
    }

    /// Attach a piece of contextual metadata under `context`.
    ///
    /// Records that are not JSON objects are returned unchanged.
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.0 {
            let context = map
                .entry("context")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(context) = context {
                context.insert(key.to_string(), value.into());
            }
        }
        self
    }

    /// The record's `message` field, if it has one.
    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for ErrorRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Ordered errors from one CLI run, persisted as `{"errors": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBatch {
    pub errors: Vec<ErrorRecord>,
}

impl ErrorBatch {
    pub fn new(errors: Vec<ErrorRecord>) -> Self {
        Self { errors }
    }

    /// Read and parse a batch file.
    pub async fn read(path: &Path) -> Result<Self, TelemetryError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TelemetryError::parse(path, e))?;

        serde_json::from_slice(&bytes).map_err(|e| TelemetryError::parse(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn test_from_error_captures_source_chain() {
        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "manifest missing",
        ));
        let record = ErrorRecord::from_error(&err);

        assert_eq!(record.message(), Some("outer failure"));
        assert_eq!(record.as_value()["causes"], json!(["manifest missing"]));
        assert!(record.as_value()["id"].is_string());
    }

    #[test]
    fn test_with_context_adds_metadata() {
        let record = ErrorRecord::new(json!({"message": "x"}))
            .with_context("command", "apps list")
            .with_context("exit_code", 1);

        assert_eq!(record.as_value()["context"]["command"], "apps list");
        assert_eq!(record.as_value()["context"]["exit_code"], 1);
    }

    #[test]
    fn test_with_context_ignores_non_objects() {
        let record = ErrorRecord::new(json!("plain")).with_context("k", "v");
        assert_eq!(record.as_value(), &json!("plain"));
    }

    #[test]
    fn test_batch_wire_format() {
        let batch = ErrorBatch::new(vec![ErrorRecord::new(json!({"message": "x"}))]);
        let json = serde_json::to_string(&batch).unwrap();
        assert_eq!(json, r#"{"errors":[{"message":"x"}]}"#);
    }

    #[tokio::test]
    async fn test_read_rejects_missing_errors_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(&path, r#"{"other": []}"#).unwrap();

        let err = ErrorBatch::read(&path).await.unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ErrorBatch::read(&dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "parse");
    }
}
