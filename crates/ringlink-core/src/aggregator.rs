//! Aggregator
//!
//! One fetch cycle: gate on the configuration, fetch every metric
//! concurrently, merge once all of them resolved, and hand exactly one
//! flattened payload to the delivery queue.
//!
//! Cycles are numbered. A cycle that finds a newer one started while it was
//! fetching does not deliver; its fetches have still warmed the cache.

use chrono::{DateTime, Local};
use ringlink_adapter_api::{SourceError, TransportError};
use ringlink_api::{AggregatedPayload, DisplayMessage, DisplayPreferences, MetricKind};
use ringlink_store::{keys, Store};
use ringlink_util::{epoch_millis, now, CycleId, DayPair, RinglinkError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::{
    ConfigurationState, DeliveryOutcome, DeliveryQueue, DeliveryReceipt, FetchReport, MetricFetcher,
    StatusReporter,
};

/// How a fetch cycle ended
#[derive(Debug)]
pub enum CycleOutcome {
    Delivered { cycle_id: CycleId, attempts: u32 },
    DeliveryFailed { cycle_id: CycleId, error: TransportError },
    /// A newer cycle started before this one merged
    Superseded { cycle_id: CycleId },
    /// The gate refused; no request was made
    NotConfigured(RinglinkError),
}

impl CycleOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

pub struct Aggregator {
    fetcher: MetricFetcher,
    queue: DeliveryQueue,
    status: StatusReporter,
    store: Arc<dyn Store>,
    generation: AtomicU64,
    last_payload: Mutex<Option<AggregatedPayload>>,
}

impl Aggregator {
    pub fn new(
        fetcher: MetricFetcher,
        queue: DeliveryQueue,
        status: StatusReporter,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            fetcher,
            queue,
            status,
            store,
            generation: AtomicU64::new(0),
            last_payload: Mutex::new(None),
        }
    }

    /// Run one cycle against the current wall clock
    pub async fn run(&self, config: &ConfigurationState) -> CycleOutcome {
        self.run_at(config, now()).await
    }

    /// Run one cycle as of `at`
    pub async fn run_at(&self, config: &ConfigurationState, at: DateTime<Local>) -> CycleOutcome {
        let token = match config.gate_at(at) {
            Ok(token) => token,
            Err(e) => {
                info!(reason = %e, "Fetch cycle declined");
                return CycleOutcome::NotConfigured(e);
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cycle_id = CycleId::new();
        let days = DayPair::at(at);

        info!(
            cycle = %cycle_id,
            generation,
            today = %days.today,
            "Fetch cycle started"
        );
        self.status.report("Fetching data...");

        let fetcher = &self.fetcher;
        let (heart_rate, readiness, sleep, activity, stress) = tokio::join!(
            fetcher.fetch(MetricKind::HeartRate, &token, days),
            fetcher.fetch(MetricKind::Readiness, &token, days),
            fetcher.fetch(MetricKind::Sleep, &token, days),
            fetcher.fetch(MetricKind::Activity, &token, days),
            fetcher.fetch(MetricKind::Stress, &token, days),
        );
        let reports = [heart_rate, readiness, sleep, activity, stress];

        if let Some(line) = error_status(&reports) {
            self.status.report(line);
        }

        let current = self.generation.load(Ordering::SeqCst);
        if current != generation {
            info!(
                cycle = %cycle_id,
                generation,
                current,
                "Fetch cycle superseded, discarding"
            );
            return CycleOutcome::Superseded { cycle_id };
        }

        let readings = reports.into_iter().map(|r| r.reading).collect();
        let payload = AggregatedPayload::new(cycle_id.clone(), readings, MetricKind::ALL.len(), at);
        if !payload.is_complete() {
            warn!(
                cycle = %cycle_id,
                completed = payload.completed_count,
                expected = payload.expected_count,
                "Incomplete payload"
            );
        }

        info!(
            cycle = %cycle_id,
            available = payload.available_count(),
            expected = payload.expected_count,
            "Fetch cycle merged"
        );

        let message = DisplayMessage::from_payload(&payload, &config.preferences);
        *self.last_payload() = Some(payload);

        match self.queue.enqueue(message).wait().await {
            DeliveryOutcome::Delivered { attempts } => {
                if let Err(e) = self.store.set_i64(keys::LAST_UPDATE, epoch_millis(&at)) {
                    warn!(error = %e, "Failed to persist last update time");
                }
                info!(cycle = %cycle_id, attempts, "Payload delivered");
                self.status.report("Data sent");
                CycleOutcome::Delivered { cycle_id, attempts }
            }
            DeliveryOutcome::Dropped { attempts, error } => {
                warn!(cycle = %cycle_id, attempts, error = %error, "Payload dropped");
                self.status.report(format!("Send failed: {}", error));
                CycleOutcome::DeliveryFailed { cycle_id, error }
            }
        }
    }

    /// Re-flatten the last merged payload with new preferences and send it
    pub fn resend_with(&self, prefs: &DisplayPreferences) -> Option<DeliveryReceipt> {
        let message = {
            let last = self.last_payload();
            let payload = last.as_ref()?;
            debug!(cycle = %payload.cycle_id, "Re-sending last payload");
            DisplayMessage::from_payload(payload, prefs)
        };
        Some(self.queue.enqueue(message))
    }

    pub fn last_payload_snapshot(&self) -> Option<AggregatedPayload> {
        self.last_payload().clone()
    }

    /// Number of cycles started so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn last_payload(&self) -> MutexGuard<'_, Option<AggregatedPayload>> {
        self.last_payload.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One debug line summarising the first request error of a cycle
fn error_status(reports: &[FetchReport]) -> Option<String> {
    let (kind, error) = reports
        .iter()
        .find_map(|r| r.error.as_ref().map(|e| (r.reading.kind(), e)))?;

    Some(match error {
        SourceError::Unauthorized => "Token rejected (401)".to_string(),
        SourceError::Status(code) => format!("Proxy status: {}", code),
        SourceError::Timeout => format!("Timeout fetching {}", kind),
        SourceError::Network(_) => format!("Network error fetching {}", kind),
        SourceError::Parse(_) => format!("Bad response for {}", kind),
    })
}
