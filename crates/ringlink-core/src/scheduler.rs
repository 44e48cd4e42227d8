//! Periodic refresh scheduling

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Ticks pulled this much early still count as due
const DUE_SLACK: Duration = Duration::from_secs(30);

/// Fixed-period timer that can be re-armed with a new period
#[derive(Debug)]
pub struct RefreshScheduler {
    period: Duration,
    deadline: Instant,
}

impl RefreshScheduler {
    /// First tick fires one period from now
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Restart the timer if `period` differs from the current one
    pub fn rearm(&mut self, period: Duration) -> bool {
        if period == self.period {
            return false;
        }
        debug!(
            old_secs = self.period.as_secs(),
            new_secs = period.as_secs(),
            "Refresh timer re-armed"
        );
        self.period = period;
        self.deadline = Instant::now() + period;
        true
    }

    /// Wait for the next tick. Cancel-safe: dropping the future leaves the
    /// deadline where it was.
    pub async fn wait(&mut self) {
        tokio::time::sleep_until(self.deadline).await;
        self.deadline = Instant::now() + self.period;
    }
}

/// Whether a tick at `now` should start a fetch cycle
pub fn is_due(last_update: Option<DateTime<Local>>, now: DateTime<Local>, period: Duration) -> bool {
    let Some(last) = last_update else {
        return true;
    };

    let elapsed = match (now - last).to_std() {
        Ok(elapsed) => elapsed,
        // Last update in the future: clock moved backwards
        Err(_) => return true,
    };

    elapsed + DUE_SLACK >= period
}
