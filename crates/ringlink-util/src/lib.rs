//! Shared utilities for ringlink
//!
//! This crate provides:
//! - ID types (CycleId, ClientId)
//! - Time utilities (mock-able wall clock, local calendar dates)
//! - Error types
//! - Debug status throttling
//! - Default paths for socket, data, and config

mod error;
mod ids;
mod paths;
mod throttle;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use throttle::*;
pub use time::*;
