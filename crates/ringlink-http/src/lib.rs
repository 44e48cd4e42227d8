//! HTTP metric source for ringlink
//!
//! Fetches upstream collections either through the CORS relay proxy
//! (`?endpoint=...`) or straight from the upstream API, depending on the
//! configured [`UpstreamMode`](ringlink_config::UpstreamMode).

mod source;

pub use source::*;
