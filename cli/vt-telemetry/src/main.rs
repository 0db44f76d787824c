//! vt-telemetry - error telemetry worker for the vt CLI
//!
//! `vt-telemetry flush <store-id> <batch-file>` is spawned detached by the
//! CLI at exit. The remaining commands inspect local telemetry state.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod error;
mod output;

use commands::Cli;

/// Log filter for this binary; falls back to `RUST_LOG`, then `warn`.
const LOG_ENV: &str = "VT_TELEMETRY_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env(LOG_ENV)
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    match cli.run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error::print_error(&e);
            ExitCode::FAILURE
        }
    }
}
