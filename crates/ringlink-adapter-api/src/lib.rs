//! Adapter trait interfaces for ringlink
//!
//! The core talks to the outside world through two seams:
//! - [`MetricSource`]: the upstream data API (directly or through the relay proxy)
//! - [`DisplayTransport`]: the channel carrying flat messages to the display
//!
//! Mock implementations of both live here so every crate can test against them.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
