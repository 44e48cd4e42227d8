//! HTTP server for the relay

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, AUTHORIZATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::{handle, ProxyResult, RelayRequest, RelayResponse, Upstream, CORS_HEADERS};

pub struct ProxyServer {
    listener: TcpListener,
    upstream: Arc<dyn Upstream>,
}

impl ProxyServer {
    pub async fn bind(addr: SocketAddr, upstream: Arc<dyn Upstream>) -> ProxyResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, upstream })
    }

    pub fn local_addr(&self) -> ProxyResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails
    pub async fn serve(self) -> ProxyResult<()> {
        info!(addr = %self.local_addr()?, "Relay listening");

        loop {
            let (stream, remote) = self.listener.accept().await?;
            let io = TokioIo::new(stream);
            let upstream = self.upstream.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let upstream = upstream.clone();
                    async move { respond(upstream, req, remote).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await
                    && !e.is_incomplete_message()
                {
                    error!(remote = %remote, error = %e, "Connection error");
                }
            });
        }
    }
}

async fn respond(
    upstream: Arc<dyn Upstream>,
    req: Request<Incoming>,
    remote: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let relay = RelayRequest {
        method: req.method().as_str().to_string(),
        query: req.uri().query().map(str::to_string),
        authorization: req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    debug!(method = %relay.method, remote = %remote, "Received request");

    let response = handle(upstream.as_ref(), &relay).await;
    Ok(into_hyper(response))
}

fn into_hyper(relay: RelayResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(relay.body)));
    *response.status_mut() = StatusCode::from_u16(relay.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_carries_cors_headers() {
        let response = into_hyper(RelayResponse {
            status: 404,
            body: "{}".into(),
        });

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(
            headers["access-control-allow-headers"],
            "Content-Type, Authorization"
        );
        assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(headers["content-type"], "application/json");
    }
}
