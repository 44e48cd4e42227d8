//! CORS relay proxy for ringlink
//!
//! Clients that cannot make authenticated HTTPS calls themselves send
//! `GET ?endpoint=<name>&token=<token>&start_date=..&end_date=..` here; the
//! relay forwards the call upstream with a bearer header and hands back the
//! upstream status and body untouched, with permissive CORS headers.

mod handler;
mod server;
mod upstream;

pub use handler::*;
pub use server::*;
pub use upstream::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProxyResult<T> = Result<T, ProxyError>;
