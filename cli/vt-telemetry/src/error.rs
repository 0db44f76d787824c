//! Error display for the CLI.

use colored::Colorize;
use plfm_telemetry::{ArtifactError, TelemetryError};

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(telemetry_err) = err.downcast_ref::<TelemetryError>() {
        match telemetry_err {
            TelemetryError::Auth(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `vt auth login` and select an account.".yellow()
                );
            }
            TelemetryError::Storage { path, .. } => {
                eprintln!(
                    "\n{}",
                    format!("Hint: Check permissions on {}.", path.display()).yellow()
                );
            }
            _ => {}
        }
    } else if err.downcast_ref::<ArtifactError>().is_some() {
        eprintln!(
            "\n{}",
            "The failed batch could not be preserved on disk.".yellow()
        );
    }
}
