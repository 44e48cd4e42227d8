//! Debug status reporter
//!
//! Free-text diagnostics for the display's `debug_status` channel. Reports
//! pass through a [`DebugThrottle`] so a burst collapses into one trailing
//! send of the newest text, and a sent status is cleared again after a while
//! unless something newer replaced it.

use ringlink_api::DisplayMessage;
use ringlink_util::{DebugThrottle, ThrottleDecision};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::DeliveryQueue;

#[derive(Clone)]
pub struct StatusReporter {
    inner: Arc<Inner>,
}

struct Inner {
    queue: DeliveryQueue,
    throttle: Mutex<DebugThrottle>,
    enabled: AtomicBool,
    clear_after: Option<Duration>,
}

impl StatusReporter {
    pub fn new(
        queue: DeliveryQueue,
        window: Duration,
        clear_after: Option<Duration>,
        enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                throttle: Mutex::new(DebugThrottle::new(window)),
                enabled: AtomicBool::new(enabled),
                clear_after,
            }),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Offer a status line. Dropped silently when debug output is off.
    pub fn report(&self, text: impl Into<String>) {
        let text = text.into();
        debug!(status = %text, "Debug status");

        if !self.is_enabled() {
            return;
        }

        let decision = self
            .inner
            .throttle()
            .offer(text, Instant::now().into_std());

        if let ThrottleDecision::Schedule(at) = decision {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(Instant::from_std(at)).await;
                inner.flush();
            });
        }
    }
}

impl Inner {
    fn throttle(&self) -> MutexGuard<'_, DebugThrottle> {
        self.throttle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(self: &Arc<Self>) {
        let Some(status) = self.throttle().take_due(Instant::now().into_std()) else {
            return;
        };

        if !self.enabled.load(Ordering::SeqCst) {
            debug!("Debug output turned off, dropping pending status");
            return;
        }

        let inner = self.clone();
        let seq = status.seq;
        self.queue.enqueue_with(
            DisplayMessage::debug_status(status.text),
            move || inner.schedule_clear(seq),
            |error| warn!(error = %error, "Debug status not delivered"),
        );
    }

    fn schedule_clear(self: Arc<Self>, seq: u64) {
        let Some(delay) = self.clear_after else {
            return;
        };

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !self.throttle().is_latest(seq) {
                return;
            }
            debug!(seq, "Clearing debug status");
            self.queue.enqueue_with(
                DisplayMessage::debug_status(""),
                || {},
                |error| warn!(error = %error, "Debug status clear not delivered"),
            );
        });
    }
}
