//! Request handling, independent of the HTTP server

use ringlink_api::Endpoint;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, error, warn};
use url::form_urlencoded;

use crate::{Upstream, UpstreamRequest};

/// Sent on every response, preflight included
pub const CORS_HEADERS: [(&str, &str); 4] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "Content-Type, Authorization"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Content-Type", "application/json"),
];

/// The parts of an incoming request the relay looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayRequest {
    pub method: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    /// Raw `Authorization` header value
    pub authorization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: u16,
    pub body: String,
}

impl RelayResponse {
    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }).to_string(),
        }
    }
}

/// Answer one request
pub async fn handle(upstream: &dyn Upstream, request: &RelayRequest) -> RelayResponse {
    match request.method.as_str() {
        "OPTIONS" => {
            return RelayResponse {
                status: 200,
                body: String::new(),
            };
        }
        "GET" => {}
        other => {
            debug!(method = %other, "Rejecting method");
            return RelayResponse::error(405, "Method not allowed");
        }
    }

    let params = parse_query(request.query.as_deref().unwrap_or(""));
    let param = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();

    let token = request
        .authorization
        .as_deref()
        .and_then(bearer_token)
        .or_else(|| param("token"));

    let (Some(endpoint), Some(token)) = (param("endpoint"), token) else {
        return RelayResponse::error(400, "Missing required parameters: endpoint and token");
    };

    let Ok(endpoint) = endpoint.parse::<Endpoint>() else {
        warn!(endpoint = %endpoint, "Rejecting endpoint outside the allow-list");
        return RelayResponse::error(
            400,
            format!("Invalid endpoint. Allowed: {}", Endpoint::allowed_list()),
        );
    };

    let upstream_request = UpstreamRequest {
        endpoint,
        token,
        start_date: param("start_date"),
        end_date: param("end_date"),
    };

    match upstream.get(&upstream_request).await {
        Ok(response) => {
            debug!(endpoint = %endpoint, status = response.status, "Relayed");
            RelayResponse {
                status: response.status,
                body: response.body,
            }
        }
        Err(e) => {
            error!(endpoint = %endpoint, error = %e, "Proxy error");
            RelayResponse {
                status: 500,
                body: json!({
                    "error": "Internal server error",
                    "message": e.to_string(),
                })
                .to_string(),
            }
        }
    }
}

/// `Bearer <token>`, scheme case-insensitive
fn bearer_token(header: &str) -> Option<String> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Decode a form-encoded query; the first occurrence of a name wins
fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (name, value) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(name.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProxyError, ProxyResult, UpstreamResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingUpstream {
        calls: Mutex<Vec<UpstreamRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl Upstream for RecordingUpstream {
        async fn get(&self, request: &UpstreamRequest) -> ProxyResult<UpstreamResponse> {
            self.calls.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ProxyError::Upstream("connection refused".into()));
            }
            Ok(UpstreamResponse {
                status: 200,
                body: r#"{"data":[]}"#.into(),
            })
        }
    }

    fn get(query: &str) -> RelayRequest {
        RelayRequest {
            method: "GET".into(),
            query: Some(query.into()),
            authorization: None,
        }
    }

    fn error_text(response: &RelayResponse) -> String {
        let v: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        v["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn preflight_is_empty_200() {
        let upstream = RecordingUpstream::default();
        let request = RelayRequest {
            method: "OPTIONS".into(),
            ..Default::default()
        };
        let response = handle(&upstream, &request).await;
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn non_get_is_405() {
        let upstream = RecordingUpstream::default();
        let request = RelayRequest {
            method: "POST".into(),
            query: Some("endpoint=daily_sleep&token=t".into()),
            authorization: None,
        };
        let response = handle(&upstream, &request).await;
        assert_eq!(response.status, 405);
        assert_eq!(error_text(&response), "Method not allowed");
        assert!(upstream.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_parameters_is_400() {
        let upstream = RecordingUpstream::default();

        for query in ["", "endpoint=daily_sleep", "token=abc", "endpoint=&token=abc"] {
            let response = handle(&upstream, &get(query)).await;
            assert_eq!(response.status, 400, "query {:?}", query);
            assert_eq!(
                error_text(&response),
                "Missing required parameters: endpoint and token"
            );
        }
        assert!(upstream.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_endpoint_is_400_without_upstream_call() {
        let upstream = RecordingUpstream::default();
        let response = handle(&upstream, &get("endpoint=unknown_endpoint&token=abc")).await;

        assert_eq!(response.status, 400);
        let text = error_text(&response);
        assert!(text.starts_with("Invalid endpoint. Allowed: "));
        assert!(text.contains("daily_readiness"));
        assert!(text.contains("personal_info"));
        assert!(upstream.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn forwards_dates_and_token() {
        let upstream = RecordingUpstream::default();
        let response = handle(
            &upstream,
            &get("endpoint=daily_sleep&token=abc%2B1&start_date=2025-06-09&end_date=2025-06-10"),
        )
        .await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"data":[]}"#);
        assert_eq!(
            upstream.calls.lock().unwrap()[0],
            UpstreamRequest {
                endpoint: Endpoint::DailySleep,
                token: "abc+1".into(),
                start_date: Some("2025-06-09".into()),
                end_date: Some("2025-06-10".into()),
            }
        );
    }

    #[tokio::test]
    async fn header_token_takes_precedence() {
        let upstream = RecordingUpstream::default();
        let request = RelayRequest {
            method: "GET".into(),
            query: Some("endpoint=heartrate&token=from-query".into()),
            authorization: Some("Bearer from-header".into()),
        };
        handle(&upstream, &request).await;

        let calls = upstream.calls.lock().unwrap();
        assert_eq!(calls[0].token, "from-header");
        assert_eq!(calls[0].endpoint, Endpoint::HeartRate);
        assert_eq!(calls[0].start_date, None);
    }

    #[tokio::test]
    async fn header_token_alone_is_enough() {
        let upstream = RecordingUpstream::default();
        let request = RelayRequest {
            method: "GET".into(),
            query: Some("endpoint=personal_info".into()),
            authorization: Some("bearer xyz".into()),
        };
        let response = handle(&upstream, &request).await;
        assert_eq!(response.status, 200);
        assert_eq!(upstream.calls.lock().unwrap()[0].token, "xyz");
    }

    #[tokio::test]
    async fn upstream_failure_is_500_envelope() {
        let upstream = RecordingUpstream {
            fail: true,
            ..Default::default()
        };
        let response = handle(&upstream, &get("endpoint=daily_stress&token=abc")).await;

        assert_eq!(response.status, 500);
        let v: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(v["error"], "Internal server error");
        assert!(v["message"].as_str().unwrap().contains("connection refused"));
    }

    #[test]
    fn query_decoding() {
        let params = parse_query("endpoint=daily_sleep&token=a%20b+c&endpoint=heartrate&flag");
        assert_eq!(params["endpoint"], "daily_sleep");
        assert_eq!(params["token"], "a b c");
        assert_eq!(params["flag"], "");
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc".into()));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
