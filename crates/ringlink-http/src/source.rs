use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use ringlink_adapter_api::{Envelope, MetricSource, SourceError, SourceRequest, SourceResult};
use ringlink_config::{UpstreamConfig, UpstreamMode};
use std::time::Duration;
use tracing::{debug, warn};

/// Response bodies longer than this are cut in log lines
const LOG_BODY_LIMIT: usize = 200;

/// reqwest-backed [`MetricSource`]
pub struct HttpSource {
    client: Client,
    mode: UpstreamMode,
    token_in_query: bool,
}

impl HttpSource {
    /// Build a source for the given upstream configuration
    pub fn new(config: &UpstreamConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("ringlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            mode: config.mode.clone(),
            token_in_query: config.token_in_query,
        })
    }

    /// URL and query parameters for one request
    fn target(&self, request: &SourceRequest) -> (String, Vec<(&'static str, String)>) {
        let (start, end) = request.date_params();

        match &self.mode {
            UpstreamMode::Proxy { proxy_url } => {
                let mut query = vec![
                    ("endpoint", request.endpoint.as_str().to_string()),
                    ("start_date", start),
                    ("end_date", end),
                ];
                if self.token_in_query {
                    query.push(("token", request.token.as_str().to_string()));
                }
                (proxy_url.clone(), query)
            }
            UpstreamMode::Direct { base_url } => (
                format!(
                    "{}/{}",
                    base_url.trim_end_matches('/'),
                    request.endpoint.as_str()
                ),
                vec![("start_date", start), ("end_date", end)],
            ),
        }
    }
}

#[async_trait]
impl MetricSource for HttpSource {
    async fn fetch(&self, request: &SourceRequest) -> SourceResult<Envelope> {
        let (url, query) = self.target(request);

        debug!(
            endpoint = %request.endpoint,
            start_date = %request.start_date,
            end_date = %request.end_date,
            "Fetching"
        );

        let response = self
            .client
            .get(&url)
            .query(&query)
            .bearer_auth(request.token.as_str())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!(endpoint = %request.endpoint, "Upstream rejected the access token");
            return Err(SourceError::Unauthorized);
        }
        if !status.is_success() {
            warn!(
                endpoint = %request.endpoint,
                status = status.as_u16(),
                body = %truncate(&body),
                "Upstream request failed"
            );
            return Err(SourceError::Status(status.as_u16()));
        }

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            warn!(endpoint = %request.endpoint, error = %e, "Malformed upstream response");
            SourceError::Parse(e.to_string())
        })?;

        debug!(
            endpoint = %request.endpoint,
            records = envelope.data.len(),
            "Fetched"
        );
        Ok(envelope)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else if e.is_decode() {
        SourceError::Parse(e.to_string())
    } else {
        SourceError::Network(e.to_string())
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(LOG_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
