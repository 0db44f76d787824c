//! Reporter: a telemetry client bound to a resolved session.

use std::sync::Arc;

use tracing::debug;

use crate::client::{ClientConfig, RemoteTelemetryClient, TelemetrySink};
use crate::error::TelemetryError;
use crate::record::ErrorRecord;
use crate::session::{ConfigDir, SessionContext};

/// Submits error batches on behalf of one account/workspace session.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

impl Reporter {
    /// Build a reporter from the ambient session with the default retry and
    /// timeout policy. Fails with [`TelemetryError::Auth`] when there is no
    /// usable session.
    pub fn get_reporter(dir: &ConfigDir) -> Result<Self, TelemetryError> {
        let session = SessionContext::resolve(dir)?;
        debug!(
            account = %session.account,
            workspace = %session.workspace,
            region = %session.region,
            "Resolved telemetry session"
        );
        Self::new(&session, ClientConfig::default())
    }

    /// Build a reporter for an explicit session.
    pub fn new(session: &SessionContext, config: ClientConfig) -> Result<Self, TelemetryError> {
        Ok(Self::with_sink(RemoteTelemetryClient::new(session, config)?))
    }

    /// Bind an arbitrary sink.
    pub fn with_sink(sink: impl TelemetrySink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Deliver `errors` unchanged.
    pub async fn report_errors(&self, errors: &[ErrorRecord]) -> Result<(), TelemetryError> {
        self.sink.report_errors(errors).await
    }
}
