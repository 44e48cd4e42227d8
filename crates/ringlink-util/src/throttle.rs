//! Debug status throttling
//!
//! Debug status strings are low-value chatter; sending every one of them
//! would saturate the display transport. The throttle collapses everything
//! offered inside one window into a single trailing send carrying the newest
//! text. A window opens at the first offer made while nothing is pending and
//! closes one window length later.

use std::time::{Duration, Instant};

/// What the caller should do after offering a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// A new window opened; flush at the given instant
    Schedule(Instant),
    /// Folded into the already pending message; a flush is already scheduled
    Coalesced,
}

/// A status released by the throttle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedStatus {
    pub text: String,
    /// Sequence number of this send, used to tell whether a later clear is still relevant
    pub seq: u64,
}

#[derive(Debug)]
struct Pending {
    text: String,
    flush_at: Instant,
}

/// Trailing-edge throttle for debug status messages (last message wins)
#[derive(Debug)]
pub struct DebugThrottle {
    window: Duration,
    pending: Option<Pending>,
    sent_seq: u64,
}

impl DebugThrottle {
    /// Create a throttle with the given coalescing window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            sent_seq: 0,
        }
    }

    /// Offer a status string at `now`
    pub fn offer(&mut self, text: impl Into<String>, now: Instant) -> ThrottleDecision {
        let text = text.into();

        if let Some(pending) = &mut self.pending {
            pending.text = text;
            return ThrottleDecision::Coalesced;
        }

        let flush_at = now + self.window;
        self.pending = Some(Pending { text, flush_at });
        ThrottleDecision::Schedule(flush_at)
    }

    /// Release the pending status if its window has elapsed
    pub fn take_due(&mut self, now: Instant) -> Option<FlushedStatus> {
        let due = self.pending.as_ref().is_some_and(|p| p.flush_at <= now);
        if !due {
            return None;
        }

        let pending = self.pending.take()?;
        self.sent_seq += 1;

        Some(FlushedStatus {
            text: pending.text,
            seq: self.sent_seq,
        })
    }

    /// Text currently waiting for its window to close
    pub fn pending_text(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.text.as_str())
    }

    /// Sequence number of the most recent send (0 if nothing was sent yet)
    pub fn sent_seq(&self) -> u64 {
        self.sent_seq
    }

    /// Whether `seq` is still the latest thing shown and nothing newer is queued
    pub fn is_latest(&self, seq: u64) -> bool {
        self.sent_seq == seq && self.pending.is_none()
    }
}
