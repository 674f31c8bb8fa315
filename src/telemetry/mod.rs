//! Runtime telemetry client.
//!
//! Fetches per-class execution telemetry for a batch of units in one call.
//! Every failure is classified into a [`TelemetryStatus`]; nothing here
//! returns an error to the caller, so a scan always completes with static
//! findings when telemetry is unavailable.
//!
//! Retries follow an explicit state machine:
//!
//! ```text
//! Attempting(n) --success--------------------------> Succeeded
//!               --transient, n <= retry budget-----> Attempting(n + 1)
//!               --transient, budget exhausted------> Failed(api_error)
//!               --terminal (403, 4xx, bad body)----> Failed(status)
//! ```

mod transport;
mod types;

pub use transport::{HttpTransport, TelemetryTransport, TransportError, TransportResponse};
pub use types::{
    get_class_data, ClassRuntimeData, MethodRuntimeData, OrgConnection, QueryRuntimeData,
    TelemetryFetch, TelemetryReport, TelemetryRequest, TelemetryStatus, UnitCoverage,
    RUNTIME_API_PATH,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout and retry settings for the telemetry client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra attempts after the first, for transient failures only.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Default REST API version when the connection does not name one.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_api_version() -> String {
    "62.0".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            api_version: default_api_version(),
        }
    }
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Deterministic correlation id for an org and user pair.
pub fn correlation_id(org_id: &str, user_id: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", org_id, user_id).as_bytes());
    format!("apexscan-{}", &hex::encode(digest)[..16])
}

impl TelemetryRequest {
    /// Build a request for `classes` on behalf of an org and user.
    pub fn new(org_id: &str, user_id: &str, classes: Vec<String>) -> Self {
        Self {
            correlation_id: correlation_id(org_id, user_id),
            org_id: org_id.to_string(),
            classes,
        }
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Succeeded(TelemetryReport),
    /// Worth retrying: timeouts, connect errors, 5xx.
    Transient(String),
    /// Not worth retrying.
    Terminal(TelemetryStatus, String),
}

/// Retry state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    /// About to perform attempt number `attempt` (1-based).
    Attempting { attempt: u32 },
    Succeeded { report: TelemetryReport, attempts: u32 },
    Failed {
        status: TelemetryStatus,
        message: String,
        attempts: u32,
    },
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    /// Transition after an attempt. `retry_budget` is the number of extra
    /// attempts allowed after the first.
    pub fn advance(self, outcome: AttemptOutcome, retry_budget: u32) -> Self {
        let RetryState::Attempting { attempt } = self else {
            return self;
        };
        match outcome {
            AttemptOutcome::Succeeded(report) => RetryState::Succeeded {
                report,
                attempts: attempt,
            },
            AttemptOutcome::Transient(_) if attempt <= retry_budget => RetryState::Attempting {
                attempt: attempt + 1,
            },
            AttemptOutcome::Transient(message) => RetryState::Failed {
                status: TelemetryStatus::ApiError,
                message,
                attempts: attempt,
            },
            AttemptOutcome::Terminal(status, message) => RetryState::Failed {
                status,
                message,
                attempts: attempt,
            },
        }
    }
}

/// Classify the result of one transport call.
pub fn classify(result: Result<TransportResponse, TransportError>) -> AttemptOutcome {
    match result {
        Ok(response) if (200..300).contains(&response.status) => {
            match serde_json::from_str::<TelemetryReport>(&response.body) {
                Ok(report) => AttemptOutcome::Succeeded(report),
                Err(e) => AttemptOutcome::Terminal(
                    TelemetryStatus::ApiError,
                    TransportError::Decode(e.to_string()).to_string(),
                ),
            }
        }
        Ok(response) => classify_status(response.status, response.body),
        Err(TransportError::Http { status, body }) => classify_status(status, body),
        Err(e @ (TransportError::Timeout | TransportError::Connect(_))) => {
            AttemptOutcome::Transient(e.to_string())
        }
        Err(e @ (TransportError::Decode(_) | TransportError::Request(_))) => {
            AttemptOutcome::Terminal(TelemetryStatus::ApiError, e.to_string())
        }
    }
}

fn classify_status(status: u16, body: String) -> AttemptOutcome {
    let message = TransportError::Http { status, body }.to_string();
    match status {
        403 => AttemptOutcome::Terminal(TelemetryStatus::AccessDenied, message),
        500..=599 => AttemptOutcome::Transient(message),
        _ => AttemptOutcome::Terminal(TelemetryStatus::ApiError, message),
    }
}

/// Client for the runtime telemetry endpoint.
pub struct TelemetryClient<T: TelemetryTransport = HttpTransport> {
    transport: T,
    config: TelemetryConfig,
}

impl TelemetryClient<HttpTransport> {
    /// Create a client over HTTP.
    pub fn new(config: TelemetryConfig) -> Result<Self, TransportError> {
        Ok(Self::with_transport(HttpTransport::new()?, config))
    }
}

impl<T: TelemetryTransport> TelemetryClient<T> {
    pub fn with_transport(transport: T, config: TelemetryConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Fetch runtime data for every class in `request`.
    ///
    /// Completes within `timeout * (1 + retry_attempts)`.
    pub async fn fetch_runtime_data(
        &self,
        connection: Option<&OrgConnection>,
        request: &TelemetryRequest,
    ) -> TelemetryFetch {
        let Some(connection) = connection.filter(|c| c.is_usable()) else {
            debug!(
                correlation_id = %request.correlation_id,
                "no org connection, skipping telemetry fetch"
            );
            return TelemetryFetch::not_attempted(
                TelemetryStatus::NoConnection,
                request.correlation_id.clone(),
                None,
            );
        };

        let timeout = self.config.timeout();
        let budget = self.config.retry_attempts;
        let mut state = RetryState::start();

        while let RetryState::Attempting { attempt } = state {
            debug!(
                attempt,
                max_attempts = budget + 1,
                correlation_id = %request.correlation_id,
                classes = request.classes.len(),
                "requesting runtime telemetry"
            );

            let result = match tokio::time::timeout(
                timeout,
                self.transport.post(connection, request, timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };

            let outcome = classify(result);
            if let AttemptOutcome::Transient(message) = &outcome {
                warn!(attempt, error = %message, "telemetry attempt failed");
            }
            state = state.advance(outcome, budget);
        }

        match state {
            RetryState::Succeeded { report, attempts } => {
                info!(
                    attempts,
                    classes = report.classes.len(),
                    correlation_id = %request.correlation_id,
                    "runtime telemetry received"
                );
                TelemetryFetch {
                    status: TelemetryStatus::Success,
                    report: Some(report),
                    message: None,
                    attempts,
                    correlation_id: request.correlation_id.clone(),
                }
            }
            RetryState::Failed {
                status,
                message,
                attempts,
            } => {
                warn!(
                    %status,
                    attempts,
                    error = %message,
                    correlation_id = %request.correlation_id,
                    "runtime telemetry unavailable"
                );
                TelemetryFetch {
                    status,
                    report: None,
                    message: Some(message),
                    attempts,
                    correlation_id: request.correlation_id.clone(),
                }
            }
            RetryState::Attempting { .. } => TelemetryFetch::not_attempted(
                TelemetryStatus::ApiError,
                request.correlation_id.clone(),
                Some("retry loop ended without a verdict".to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of results, one per call.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<TransportResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TelemetryTransport for ScriptedTransport {
        async fn post(
            &self,
            _connection: &OrgConnection,
            _request: &TelemetryRequest,
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Request("script exhausted".into())))
        }
    }

    /// Never answers within the timeout on its first call.
    struct SlowFirstTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TelemetryTransport for SlowFirstTransport {
        async fn post(
            &self,
            _connection: &OrgConnection,
            _request: &TelemetryRequest,
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(ok(REPORT))
        }
    }

    const REPORT: &str = r#"{"classes": {"AccountService": {"className": "AccountService",
        "methods": [{"methodName": "load", "invocations": 5, "avgCpuTimeMs": 1.0}], "soqlQueries": []}}}"#;

    fn ok(body: &str) -> TransportResponse {
        TransportResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    fn status(code: u16) -> TransportResponse {
        TransportResponse {
            status: code,
            body: "error".to_string(),
        }
    }

    fn connection() -> OrgConnection {
        OrgConnection::new("https://acme.my.salesforce.com", "token", "62.0")
    }

    fn request() -> TelemetryRequest {
        TelemetryRequest::new("00D1", "0051", vec!["AccountService".into()])
    }

    fn client<T: TelemetryTransport>(transport: T) -> TelemetryClient<T> {
        TelemetryClient::with_transport(
            transport,
            TelemetryConfig {
                timeout_ms: 50,
                ..TelemetryConfig::default()
            },
        )
    }

    #[test]
    fn test_correlation_id_is_stable_per_pair() {
        let a = correlation_id("00D1", "0051");
        assert_eq!(a, correlation_id("00D1", "0051"));
        assert_ne!(a, correlation_id("00D1", "0052"));
        assert!(a.starts_with("apexscan-"));
        assert_eq!(a.len(), "apexscan-".len() + 16);
        assert_eq!(request().correlation_id, a);
    }

    #[test]
    fn test_state_machine_budget() {
        let transient = || AttemptOutcome::Transient("timeout".into());

        let state = RetryState::start().advance(transient(), 1);
        assert_eq!(state, RetryState::Attempting { attempt: 2 });
        let state = state.advance(transient(), 1);
        assert_eq!(
            state,
            RetryState::Failed {
                status: TelemetryStatus::ApiError,
                message: "timeout".into(),
                attempts: 2
            }
        );
        assert_eq!(state.clone().advance(transient(), 1), state);

        let denied = RetryState::start().advance(
            AttemptOutcome::Terminal(TelemetryStatus::AccessDenied, "HTTP 403".into()),
            5,
        );
        assert!(matches!(
            denied,
            RetryState::Failed {
                status: TelemetryStatus::AccessDenied,
                attempts: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_classify() {
        assert!(matches!(classify(Ok(ok(REPORT))), AttemptOutcome::Succeeded(_)));
        assert!(matches!(
            classify(Ok(status(403))),
            AttemptOutcome::Terminal(TelemetryStatus::AccessDenied, _)
        ));
        assert!(matches!(classify(Ok(status(502))), AttemptOutcome::Transient(_)));
        assert!(matches!(
            classify(Ok(status(404))),
            AttemptOutcome::Terminal(TelemetryStatus::ApiError, _)
        ));
        assert!(matches!(
            classify(Ok(ok("not json"))),
            AttemptOutcome::Terminal(TelemetryStatus::ApiError, _)
        ));
        assert!(matches!(
            classify(Err(TransportError::Connect("refused".into()))),
            AttemptOutcome::Transient(_)
        ));
    }

    #[tokio::test]
    async fn test_timeout_then_success() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Ok(ok(REPORT)),
            Ok(ok(r#"{"classes": {}}"#)),
        ]);
        let client = client(transport);
        let fetch = client.fetch_runtime_data(Some(&connection()), &request()).await;

        assert_eq!(fetch.status, TelemetryStatus::Success);
        assert_eq!(fetch.attempts, 2);
        assert!(fetch.runtime_for("AccountService").is_some());
        assert_eq!(client.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_slow_attempt_is_cut_off_and_retried() {
        let client = client(SlowFirstTransport {
            calls: AtomicU32::new(0),
        });
        let fetch = client.fetch_runtime_data(Some(&connection()), &request()).await;

        assert_eq!(fetch.status, TelemetryStatus::Success);
        assert_eq!(fetch.attempts, 2);
    }

    #[tokio::test]
    async fn test_access_denied_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(status(403)), Ok(ok(REPORT))]);
        let client = client(transport);
        let fetch = client.fetch_runtime_data(Some(&connection()), &request()).await;

        assert_eq!(fetch.status, TelemetryStatus::AccessDenied);
        assert_eq!(fetch.attempts, 1);
        assert!(fetch.report.is_none());
        assert_eq!(client.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_error() {
        let transport = ScriptedTransport::new(vec![
            Ok(status(500)),
            Err(TransportError::Timeout),
            Ok(TransportResponse {
                status: 503,
                body: "maintenance".into(),
            }),
            Ok(ok(REPORT)),
        ]);
        let client = client(transport);
        let fetch = client.fetch_runtime_data(Some(&connection()), &request()).await;

        assert_eq!(fetch.status, TelemetryStatus::ApiError);
        assert_eq!(fetch.attempts, 3);
        assert_eq!(fetch.message.as_deref(), Some("HTTP 503: maintenance"));
        assert_eq!(client.transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_connection_makes_no_call() {
        let transport = ScriptedTransport::new(vec![Ok(ok(REPORT))]);
        let client = client(transport);

        let fetch = client.fetch_runtime_data(None, &request()).await;
        assert_eq!(fetch.status, TelemetryStatus::NoConnection);
        assert_eq!(fetch.attempts, 0);

        let blank = OrgConnection::new("https://acme.my.salesforce.com", "", "62.0");
        let fetch = client.fetch_runtime_data(Some(&blank), &request()).await;
        assert_eq!(fetch.status, TelemetryStatus::NoConnection);
        assert_eq!(client.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let transport = ScriptedTransport::new(vec![Ok(status(400)), Ok(ok(REPORT))]);
        let client = client(transport);
        let fetch = client.fetch_runtime_data(Some(&connection()), &request()).await;

        assert_eq!(fetch.status, TelemetryStatus::ApiError);
        assert_eq!(fetch.attempts, 1);
    }
}
