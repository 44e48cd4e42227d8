//! Upstream side of the relay

use async_trait::async_trait;
use reqwest::Client;
use ringlink_api::Endpoint;
use std::time::Duration;
use tracing::debug;

use crate::{ProxyError, ProxyResult};

/// One relayed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub endpoint: Endpoint,
    pub token: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Status and body exactly as upstream returned them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn get(&self, request: &UpstreamRequest) -> ProxyResult<UpstreamResponse>;
}

/// reqwest-backed upstream at `<base_url>/<endpoint>`
pub struct HttpUpstream {
    client: Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ProxyResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ringlink-proxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProxyError::Upstream(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.as_str())
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get(&self, request: &UpstreamRequest) -> ProxyResult<UpstreamResponse> {
        let url = self.url_for(request.endpoint);

        let mut query = Vec::new();
        if let Some(start) = &request.start_date {
            query.push(("start_date", start.as_str()));
        }
        if let Some(end) = &request.end_date {
            query.push(("end_date", end.as_str()));
        }

        debug!(url = %url, ?query, "Proxying request");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .bearer_auth(&request.token)
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        Ok(UpstreamResponse { status, body })
    }
}
