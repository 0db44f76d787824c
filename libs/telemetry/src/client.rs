//! Remote telemetry client.
//!
//! Submits a batch of error records to the telemetry service. Every attempt
//! is bounded by the configured timeout; transient failures (timeouts,
//! connection errors, 5xx, 429, 408) are retried with exponential backoff
//! until `retries` attempts have been made.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT,
};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TelemetryError;
use crate::record::ErrorRecord;
use crate::session::SessionContext;

/// Total delivery attempts per batch.
pub const DEFAULT_RETRIES: u32 = 3;

/// Per-attempt request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

const REGION_HEADER: &str = "x-vt-region";

/// Anything that can accept a batch of error records.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn report_errors(&self, errors: &[ErrorRecord]) -> Result<(), TelemetryError>;
}

/// Exponential backoff between delivery attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the second attempt.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max: Duration::from_secs(5),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// No waiting between attempts.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Delay after the given zero-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt.min(30) as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter_range = delay * self.jitter.clamp(0.0, 1.0);
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;

        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// Retry and timeout policy for the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub retries: u32,

    /// Timeout applied to each attempt.
    pub timeout: Duration,

    pub backoff: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportRequest<'a> {
    errors: &'a [ErrorRecord],
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
enum AttemptError {
    Transient(String),
    Fatal(String),
}

/// HTTP client for the telemetry errors endpoint.
#[derive(Debug, Clone)]
pub struct RemoteTelemetryClient {
    client: reqwest::Client,
    url: String,
    config: ClientConfig,
}

impl RemoteTelemetryClient {
    /// Create a client authenticated as `session`.
    pub fn new(session: &SessionContext, config: ClientConfig) -> Result<Self, TelemetryError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", session.token))
                .map_err(|_| TelemetryError::Auth("invalid token format".to_string()))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&session.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("vt-telemetry")),
        );
        if let Ok(region) = HeaderValue::from_str(&session.region) {
            headers.insert(HeaderName::from_static(REGION_HEADER), region);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| TelemetryError::RemoteDelivery {
                attempts: 0,
                last_error: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            url: format!(
                "{}/{}/{}/telemetry/errors",
                session.endpoint.trim_end_matches('/'),
                session.account,
                session.workspace
            ),
            config,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn attempt(&self, request: &ReportRequest<'_>) -> Result<(), AttemptError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(describe_transport_error(&e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("telemetry endpoint returned {status}")
        } else {
            format!("telemetry endpoint returned {status}: {body}")
        };

        if is_transient(status) {
            Err(AttemptError::Transient(message))
        } else {
            Err(AttemptError::Fatal(message))
        }
    }
}

#[async_trait]
impl TelemetrySink for RemoteTelemetryClient {
    async fn report_errors(&self, errors: &[ErrorRecord]) -> Result<(), TelemetryError> {
        let request = ReportRequest { errors };
        let attempts = self.config.retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(&request).await {
                Ok(()) => {
                    debug!(
                        attempt,
                        error_count = errors.len(),
                        "Telemetry batch delivered"
                    );
                    return Ok(());
                }
                Err(AttemptError::Fatal(message)) => {
                    warn!(attempt, error = %message, "Telemetry batch rejected");
                    return Err(TelemetryError::RemoteDelivery {
                        attempts: attempt,
                        last_error: message,
                    });
                }
                Err(AttemptError::Transient(message)) => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %message,
                        "Telemetry delivery attempt failed"
                    );
                    last_error = message;
                    if attempt < attempts {
                        tokio::time::sleep(self.config.backoff.delay(attempt - 1)).await;
                    }
                }
            }
        }

        Err(TelemetryError::RemoteDelivery {
            attempts,
            last_error,
        })
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(endpoint: &str) -> SessionContext {
        SessionContext {
            account: "acme".to_string(),
            workspace: "dev".to_string(),
            token: "tok-123".to_string(),
            user_agent: "vt-telemetry/test".to_string(),
            region: "aws-us-east-1".to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    fn fast(retries: u32, timeout_ms: u64) -> ClientConfig {
        ClientConfig {
            retries,
            timeout: Duration::from_millis(timeout_ms),
            backoff: BackoffPolicy::none(),
        }
    }

    fn records() -> Vec<ErrorRecord> {
        vec![ErrorRecord::new(json!({"message": "x"}))]
    }

    #[test]
    fn test_default_policy() {
        let config = ClientConfig::default();
        assert_eq!(config.retries, 3);
        assert_eq!(config.timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_url_building() {
        let client = RemoteTelemetryClient::new(&session("http://t.test/"), fast(1, 100)).unwrap();
        assert_eq!(client.url(), "http://t.test/acme/dev/telemetry/errors");
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
            jitter: 0.0,
        };

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(10), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let policy = BackoffPolicy::default();
        for _ in 0..50 {
            let d = policy.delay(0);
            assert!(d >= Duration::from_millis(187) && d <= Duration::from_millis(313));
        }
    }

    #[tokio::test]
    async fn test_posts_batch_with_session_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/acme/dev/telemetry/errors"))
            .and(header("authorization", "Bearer tok-123"))
            .and(header("x-vt-region", "aws-us-east-1"))
            .and(header("user-agent", "vt-telemetry/test"))
            .and(body_json(json!({"errors": [{"message": "x"}]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteTelemetryClient::new(&session(&server.uri()), fast(3, 1_000)).unwrap();
        client.report_errors(&records()).await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteTelemetryClient::new(&session(&server.uri()), fast(3, 1_000)).unwrap();
        client.report_errors(&records()).await.unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_configured_attempts_on_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .expect(3)
            .mount(&server)
            .await;

        let client = RemoteTelemetryClient::new(&session(&server.uri()), fast(3, 150)).unwrap();

        let start = std::time::Instant::now();
        let err = client.report_errors(&records()).await.unwrap_err();
        let elapsed = start.elapsed();

        match err {
            TelemetryError::RemoteDelivery {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("timed out"), "{last_error}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(elapsed >= Duration::from_millis(450));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[rstest]
    #[case(400)]
    #[case(401)]
    #[case(404)]
    #[tokio::test]
    async fn test_client_errors_are_not_retried(#[case] status: u16) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteTelemetryClient::new(&session(&server.uri()), fast(3, 1_000)).unwrap();
        let err = client.report_errors(&records()).await.unwrap_err();

        match err {
            TelemetryError::RemoteDelivery {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 1);
                assert!(last_error.contains("nope"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_exhausts_attempts() {
        let client =
            RemoteTelemetryClient::new(&session("http://127.0.0.1:1"), fast(2, 500)).unwrap();

        let err = client.report_errors(&records()).await.unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::RemoteDelivery { attempts: 2, .. }
        ));
    }

    #[test]
    fn test_rejects_unprintable_token() {
        let mut bad = session("http://t.test");
        bad.token = "line\nbreak".to_string();

        let err = RemoteTelemetryClient::new(&bad, fast(1, 100)).unwrap_err();
        assert_eq!(err.kind(), "auth");
    }
}
