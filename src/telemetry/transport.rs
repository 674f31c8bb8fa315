//! HTTP transport for telemetry requests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::{OrgConnection, TelemetryRequest};

/// Errors raised while performing one telemetry call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Raw response of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Performs a single POST of a telemetry request.
///
/// Implementations do not retry; the client owns the retry policy.
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn post(
        &self,
        connection: &OrgConnection,
        request: &TelemetryRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("apexscan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TelemetryTransport for HttpTransport {
    async fn post(
        &self,
        connection: &OrgConnection,
        request: &TelemetryRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .http
            .post(connection.endpoint())
            .bearer_auth(&connection.access_token)
            .json(request)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}
