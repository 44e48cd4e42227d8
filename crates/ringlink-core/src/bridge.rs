//! The bridge: configuration state plus the fetch/deliver pipeline
//!
//! Owns everything one running service needs and exposes the handful of
//! operations the service loop drives: run a cycle, apply a settings update,
//! and decide whether a scheduler tick should fetch.

use chrono::{DateTime, Local};
use ringlink_adapter_api::{DisplayTransport, MetricSource};
use ringlink_api::DisplayMessage;
use ringlink_config::{ServiceConfig, SettingsUpdate};
use ringlink_store::{keys, Store};
use ringlink_util::{from_epoch_millis, now, RinglinkError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    is_due, Aggregator, ConfigurationState, CycleOutcome, DeliveryPolicy, DeliveryQueue,
    MetricFetcher, ScoreCache, SettingsChange, StatusReporter,
};

/// What the caller should do after a settings update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// No response or nothing to act on
    Nothing,
    /// The last payload was re-sent with the new preferences
    Resent,
    /// Run a fetch cycle now
    Refresh,
    /// Still not connected; the display was told so
    NotConfigured,
    /// The payload failed validation and was ignored
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsOutcome {
    pub change: SettingsChange,
    pub follow_up: FollowUp,
}

impl SettingsOutcome {
    fn unchanged(follow_up: FollowUp) -> Self {
        Self {
            change: SettingsChange::default(),
            follow_up,
        }
    }
}

pub struct Bridge {
    store: Arc<dyn Store>,
    state: Mutex<ConfigurationState>,
    aggregator: Aggregator,
    queue: DeliveryQueue,
    status: StatusReporter,
    cache: Arc<ScoreCache>,
    default_token_ttl_days: u32,
}

impl Bridge {
    /// Load persisted state and start the delivery worker. Must be called
    /// inside a tokio runtime.
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn MetricSource>,
        transport: Arc<dyn DisplayTransport>,
        config: &ServiceConfig,
    ) -> Self {
        let state = ConfigurationState::load(store.as_ref(), &config.refresh);

        let (queue, _worker) = DeliveryQueue::spawn(transport, DeliveryPolicy::from(&config.delivery));
        let status = StatusReporter::new(
            queue.clone(),
            config.delivery.debug_throttle,
            config.delivery.debug_clear_after,
            state.show_debug,
        );

        let cache = Arc::new(ScoreCache::load(store.clone()));
        let fetcher = MetricFetcher::new(
            source,
            cache.clone(),
            config.upstream.activity_lookback_days,
        );
        let aggregator = Aggregator::new(fetcher, queue.clone(), status.clone(), store.clone());

        Self {
            store,
            state: Mutex::new(state),
            aggregator,
            queue,
            status,
            cache,
            default_token_ttl_days: config.refresh.default_token_ttl_days,
        }
    }

    /// Snapshot of the configuration state
    pub fn state(&self) -> ConfigurationState {
        self.lock_state().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock_state().connected_at(now())
    }

    pub fn cache(&self) -> &Arc<ScoreCache> {
        &self.cache
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    pub fn refresh_period(&self) -> Duration {
        self.lock_state().refresh_period()
    }

    /// Run one fetch cycle; tells the display when there is nothing to fetch with
    pub async fn refresh(&self) -> CycleOutcome {
        self.refresh_at(now()).await
    }

    pub async fn refresh_at(&self, at: DateTime<Local>) -> CycleOutcome {
        let state = self.state();
        let outcome = self.aggregator.run_at(&state, at).await;
        if let CycleOutcome::NotConfigured(reason) = &outcome {
            self.signal_not_configured(reason);
        }
        outcome
    }

    /// Apply the configuration page's response. `None` means the page was
    /// closed without saving and changes nothing.
    pub fn apply_settings(&self, response: Option<&str>) -> SettingsOutcome {
        self.apply_settings_at(response, now())
    }

    pub fn apply_settings_at(&self, response: Option<&str>, at: DateTime<Local>) -> SettingsOutcome {
        let Some(raw) = response.filter(|r| !r.trim().is_empty()) else {
            debug!("Configuration closed without a response");
            return SettingsOutcome::unchanged(FollowUp::Nothing);
        };

        let update = match SettingsUpdate::parse(raw) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "Rejected settings update");
                self.status.report(format!("Invalid settings: {}", e));
                return SettingsOutcome::unchanged(FollowUp::Rejected(e.to_string()));
            }
        };

        if update.is_empty() {
            return SettingsOutcome::unchanged(FollowUp::Nothing);
        }

        let (change, prefs) = {
            let mut state = self.lock_state();
            let change = state.apply(&update, self.store.as_ref(), at, self.default_token_ttl_days);
            (change, state.preferences.clone())
        };

        info!(
            fields = ?update.present_fields(),
            connected = change.connected,
            "Settings updated"
        );

        if change.debug_changed {
            self.status.set_enabled(self.lock_state().show_debug);
        }

        if !change.connected {
            let reason = self
                .lock_state()
                .gate_at(at)
                .err()
                .unwrap_or(RinglinkError::NotConfigured);
            self.signal_not_configured(&reason);
            return SettingsOutcome {
                change,
                follow_up: FollowUp::NotConfigured,
            };
        }

        let only_preferences =
            change.preferences_changed && !change.token_changed && !change.frequency_changed;
        if only_preferences && self.aggregator.resend_with(&prefs).is_some() {
            return SettingsOutcome {
                change,
                follow_up: FollowUp::Resent,
            };
        }

        SettingsOutcome {
            change,
            follow_up: FollowUp::Refresh,
        }
    }

    /// Time of the last fully delivered payload
    pub fn last_update(&self) -> Option<DateTime<Local>> {
        match self.store.get_i64(keys::LAST_UPDATE) {
            Ok(ms) => ms.and_then(from_epoch_millis),
            Err(e) => {
                warn!(error = %e, "Failed to read last update time");
                None
            }
        }
    }

    /// Whether a scheduler tick at `at` should fetch
    pub fn is_refresh_due(&self, at: DateTime<Local>) -> bool {
        is_due(self.last_update(), at, self.refresh_period())
    }

    fn signal_not_configured(&self, reason: &RinglinkError) {
        info!(reason = %reason, "Telling display the bridge is not configured");
        self.queue.enqueue_with(
            DisplayMessage::not_configured(),
            || {},
            |error| warn!(error = %error, "Not-configured signal not delivered"),
        );
        self.status.report(match reason {
            RinglinkError::TokenExpired => "Token expired, please sign in again",
            RinglinkError::NotConfigured => "Not configured",
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, ConfigurationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
