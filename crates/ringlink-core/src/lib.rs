//! Core pipeline for ringlink
//!
//! This crate is the heart of ringlink, containing:
//! - Score cache (last known-good value per metric, per-metric freshness)
//! - Metric fetcher (today -> yesterday -> cache -> unavailable)
//! - Aggregator (concurrent fetch, single merge, stale cycle discard)
//! - Delivery queue (FIFO, one in flight, bounded retries)
//! - Debug status reporting and configuration state
//! - The bridge tying them together for the service loop

mod aggregator;
mod bridge;
mod cache;
mod delivery;
mod fetcher;
mod records;
mod scheduler;
mod state;
mod status;

pub use aggregator::*;
pub use bridge::*;
pub use cache::*;
pub use delivery::*;
pub use fetcher::*;
pub use records::extract;
pub use scheduler::*;
pub use state::*;
pub use status::*;
