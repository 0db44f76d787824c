//! Queue an error for background delivery.

use anyhow::{Context, Result};
use clap::Args;
use plfm_telemetry::{ErrorCollector, ErrorRecord, WorkerCommand};
use serde_json::json;

use crate::output::print_info;

use super::CommandContext;

/// Record an error message and hand it to a detached flush worker.
#[derive(Debug, Args)]
pub struct CaptureCommand {
    /// Store identifier the flush is recorded under.
    store_id: String,

    /// Error message.
    message: String,

    /// Extra context as key=value (repeatable).
    #[arg(long = "context", value_parser = parse_key_value)]
    context: Vec<(String, String)>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}

impl CaptureCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let mut record = ErrorRecord::new(json!({ "message": self.message }));
        for (key, value) in self.context {
            record = record.with_context(&key, value);
        }

        let mut collector = ErrorCollector::new(self.store_id);
        collector.register(record);

        // Pass the config dir through so the worker reads the same state.
        let worker = WorkerCommand::current_exe()
            .context("Failed to locate the vt-telemetry executable")?
            .with_args([
                "--config-dir".into(),
                ctx.config_dir.root().as_os_str().to_os_string(),
                "flush".into(),
            ]);

        if let Some(spawned) = collector.flush(&worker)? {
            print_info(&format!("Queued error for delivery (worker pid {})", spawned.pid));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("command=apps list").unwrap(),
            ("command".to_string(), "apps list".to_string())
        );
        assert!(parse_key_value("no-equals").is_err());
    }
}
