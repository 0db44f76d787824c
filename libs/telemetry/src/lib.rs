//! Error telemetry for the vt CLI.
//!
//! Errors captured during a CLI invocation are written to a handoff file and
//! delivered by a short-lived, detached worker process, so the foreground
//! command never waits on the network.
//!
//! ## Components
//!
//! - **Collector** ([`ErrorCollector`]): accumulates errors and spawns the worker
//! - **Local store** ([`LocalErrorStore`]): last successful flush per store id
//! - **Client** ([`RemoteTelemetryClient`]): delivery with retries and timeouts
//! - **Reporter** ([`Reporter`]): a client bound to the current session
//! - **Worker** ([`FlushWorker`]): read batch, delete it, report, record flush;
//!   on failure write a [`FailureArtifact`]

pub mod artifact;
pub mod client;
pub mod collector;
pub mod error;
pub mod record;
pub mod reporter;
pub mod session;
pub mod store;
pub mod worker;

pub use artifact::{list_artifacts, FailureArtifact, FailureCause};
pub use client::{BackoffPolicy, ClientConfig, RemoteTelemetryClient, TelemetrySink};
pub use collector::{ErrorCollector, SpawnedFlush, WorkerCommand};
pub use error::{ArtifactError, TelemetryError};
pub use record::{ErrorBatch, ErrorRecord};
pub use reporter::Reporter;
pub use session::{ConfigDir, Config, Credentials, SessionContext, SessionScope};
pub use store::{LocalErrorStore, LocalStoreState};
pub use worker::{FlushArgs, FlushOutcome, FlushStage, FlushWorker};
