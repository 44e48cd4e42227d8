//! Shared types for ringlink
//!
//! This crate defines the data that flows through the bridge:
//! - Metric kinds, upstream endpoints and the access token
//! - Per-fetch readings and the aggregated payload of one fetch cycle
//! - The flat key-value message the display consumes
//! - Frames exchanged over the display link

mod display;
mod protocol;
mod types;

pub use display::*;
pub use protocol::*;
pub use types::*;

/// Current display-link protocol version
pub const API_VERSION: u32 = 1;
