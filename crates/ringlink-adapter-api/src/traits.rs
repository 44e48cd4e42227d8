//! Adapter traits

use async_trait::async_trait;
use chrono::NaiveDate;
use ringlink_api::{AccessToken, DisplayMessage, Endpoint};
use ringlink_util::day_string;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from an upstream fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Upstream rejected the token")]
    Unauthorized,

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Parse(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// One upstream request: an endpoint and an inclusive date range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub endpoint: Endpoint,
    pub token: AccessToken,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl SourceRequest {
    pub fn new(
        endpoint: Endpoint,
        token: AccessToken,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            endpoint,
            token,
            start_date,
            end_date,
        }
    }

    /// Request scoped to a single calendar day
    pub fn single_day(endpoint: Endpoint, token: AccessToken, day: NaiveDate) -> Self {
        Self::new(endpoint, token, day, day)
    }

    /// `(start_date, end_date)` as wire strings
    pub fn date_params(&self) -> (String, String) {
        (day_string(self.start_date), day_string(self.end_date))
    }
}

/// Upstream response envelope: `{"data": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl Envelope {
    pub fn new(data: Vec<serde_json::Value>) -> Self {
        Self { data }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Upstream data API
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Perform one request. Must resolve (success or error) in bounded time
    /// and must not retry internally.
    async fn fetch(&self, request: &SourceRequest) -> SourceResult<Envelope>;
}

/// Errors from the display transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("No display connected")]
    NotConnected,

    #[error("Display rejected message: {0}")]
    Rejected(String),

    #[error("Timed out waiting for acknowledgement")]
    AckTimeout,

    #[error("Connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Outbound channel to the display. One call is one delivery attempt.
#[async_trait]
pub trait DisplayTransport: Send + Sync {
    async fn send(&self, message: &DisplayMessage) -> TransportResult<()>;

    /// Whether a display is currently attached
    fn is_connected(&self) -> bool {
        true
    }
}
