//! Configuration state
//!
//! Token material, refresh cadence and display preferences. Loaded from the
//! store at startup and mutated only through [`ConfigurationState::apply`],
//! which persists whatever it changed.

use chrono::{DateTime, Days, Duration as ChronoDuration, Local};
use ringlink_api::{AccessToken, DisplayPreferences, Layout};
use ringlink_config::{RefreshConfig, SettingsUpdate};
use ringlink_store::{keys, Store, StoreResult};
use ringlink_util::{epoch_millis, format_datetime_full, from_epoch_millis, RinglinkError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Presentation fields persisted under one key
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredFormat {
    date_format: u8,
    theme_mode: u8,
    custom_color_index: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationState {
    pub access_token: Option<AccessToken>,
    pub token_expires_at: Option<DateTime<Local>>,
    pub refresh_frequency_minutes: u32,
    pub show_debug: bool,
    pub preferences: DisplayPreferences,
}

/// What an applied settings update changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub token_changed: bool,
    pub frequency_changed: bool,
    pub preferences_changed: bool,
    pub debug_changed: bool,
    /// Connection state after the update
    pub connected: bool,
}

impl SettingsChange {
    pub fn anything(&self) -> bool {
        self.token_changed || self.frequency_changed || self.preferences_changed || self.debug_changed
    }
}

impl ConfigurationState {
    pub fn new(defaults: &RefreshConfig) -> Self {
        Self {
            access_token: None,
            token_expires_at: None,
            refresh_frequency_minutes: defaults.default_frequency_minutes,
            show_debug: false,
            preferences: DisplayPreferences::default(),
        }
    }

    /// Load persisted settings. Unreadable values fall back to defaults.
    pub fn load(store: &dyn Store, defaults: &RefreshConfig) -> Self {
        let mut state = Self::new(defaults);

        state.access_token = read(keys::ACCESS_TOKEN, store.get(keys::ACCESS_TOKEN))
            .map(AccessToken::new)
            .filter(|t| !t.is_empty());

        state.token_expires_at =
            read(keys::TOKEN_EXPIRES_AT, store.get_i64(keys::TOKEN_EXPIRES_AT)).and_then(from_epoch_millis);

        if let Some(minutes) = read(
            keys::REFRESH_FREQUENCY_MINUTES,
            store.get_i64(keys::REFRESH_FREQUENCY_MINUTES),
        ) && let Ok(minutes) = u32::try_from(minutes)
            && minutes > 0
        {
            state.refresh_frequency_minutes = minutes;
        }

        if let Some(show_debug) = read(keys::SHOW_DEBUG, store.get_bool(keys::SHOW_DEBUG)) {
            state.show_debug = show_debug;
        }

        if let Some(show_loading) = read(keys::SHOW_LOADING, store.get_bool(keys::SHOW_LOADING)) {
            state.preferences.show_loading = show_loading;
        }

        if let Some(layout) = read(
            keys::MEASUREMENT_LAYOUT,
            store.get_json::<Layout>(keys::MEASUREMENT_LAYOUT),
        ) {
            state.preferences.layout = layout;
        }

        if let Some(format) = read(
            keys::DISPLAY_PREFERENCES,
            store.get_json::<StoredFormat>(keys::DISPLAY_PREFERENCES),
        ) {
            state.preferences.date_format = format.date_format;
            state.preferences.theme_mode = format.theme_mode;
            state.preferences.custom_color_index = format.custom_color_index;
        }

        info!(
            has_token = state.access_token.is_some(),
            expires_at = ?state.token_expires_at.as_ref().map(format_datetime_full),
            refresh_frequency_minutes = state.refresh_frequency_minutes,
            show_debug = state.show_debug,
            "Configuration state loaded"
        );

        state
    }

    /// Token present and unexpired at `now`
    pub fn connected_at(&self, now: DateTime<Local>) -> bool {
        self.gate_at(now).is_ok()
    }

    /// The token to fetch with, or why no fetch may run
    pub fn gate_at(&self, now: DateTime<Local>) -> Result<AccessToken, RinglinkError> {
        let token = self
            .access_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .ok_or(RinglinkError::NotConfigured)?;

        match self.token_expires_at {
            Some(expires_at) if expires_at > now => Ok(token.clone()),
            _ => Err(RinglinkError::TokenExpired),
        }
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_frequency_minutes.max(1)) * 60)
    }

    /// Merge a validated settings update and persist the fields it touched.
    ///
    /// A new token replaces the old one outright; without an explicit expiry
    /// it is valid for `default_ttl_days`. Layout slots merge one by one.
    pub fn apply(
        &mut self,
        update: &SettingsUpdate,
        store: &dyn Store,
        now: DateTime<Local>,
        default_ttl_days: u32,
    ) -> SettingsChange {
        let mut change = SettingsChange::default();

        if let Some(raw) = &update.access_token {
            let token = AccessToken::new(raw.as_str());
            let expires_at = explicit_expiry(update, now).unwrap_or_else(|| {
                now.checked_add_days(Days::new(u64::from(default_ttl_days)))
                    .unwrap_or(now)
            });

            change.token_changed = self.access_token.as_ref() != Some(&token)
                || self.token_expires_at != Some(expires_at);
            self.access_token = Some(token);
            self.token_expires_at = Some(expires_at);
        } else if let Some(expires_at) = explicit_expiry(update, now)
            && self.token_expires_at != Some(expires_at)
        {
            self.token_expires_at = Some(expires_at);
            change.token_changed = true;
        }

        if change.token_changed {
            persist("token", self.persist_token(store));
        }

        if let Some(minutes) = update.refresh_frequency_minutes
            && minutes != self.refresh_frequency_minutes
        {
            self.refresh_frequency_minutes = minutes;
            change.frequency_changed = true;
            persist(
                keys::REFRESH_FREQUENCY_MINUTES,
                store.set_i64(keys::REFRESH_FREQUENCY_MINUTES, i64::from(minutes)),
            );
        }

        if let Some(show_debug) = update.show_debug
            && show_debug != self.show_debug
        {
            self.show_debug = show_debug;
            change.debug_changed = true;
            persist(keys::SHOW_DEBUG, store.set_bool(keys::SHOW_DEBUG, show_debug));
        }

        let previous = self.preferences.clone();
        let prefs = &mut self.preferences;
        if let Some(v) = update.layout_left {
            prefs.layout.left = v;
        }
        if let Some(v) = update.layout_middle {
            prefs.layout.middle = v;
        }
        if let Some(v) = update.layout_right {
            prefs.layout.right = v;
        }
        if let Some(v) = update.date_format {
            prefs.date_format = v;
        }
        if let Some(v) = update.theme_mode {
            prefs.theme_mode = v;
        }
        if let Some(v) = update.custom_color_index {
            prefs.custom_color_index = v;
        }
        if let Some(v) = update.show_loading {
            prefs.show_loading = v;
        }

        if self.preferences != previous {
            change.preferences_changed = true;
            persist("preferences", self.persist_preferences(store));
        }

        change.connected = self.connected_at(now);

        debug!(
            fields = ?update.present_fields(),
            ?change,
            "Settings applied"
        );

        change
    }

    fn persist_token(&self, store: &dyn Store) -> StoreResult<()> {
        match &self.access_token {
            Some(token) => store.set(keys::ACCESS_TOKEN, token.as_str())?,
            None => store.remove(keys::ACCESS_TOKEN)?,
        }
        match &self.token_expires_at {
            Some(at) => store.set_i64(keys::TOKEN_EXPIRES_AT, epoch_millis(at)),
            None => store.remove(keys::TOKEN_EXPIRES_AT),
        }
    }

    fn persist_preferences(&self, store: &dyn Store) -> StoreResult<()> {
        let prefs = &self.preferences;
        store.set_json(keys::MEASUREMENT_LAYOUT, &prefs.layout)?;
        store.set_json(
            keys::DISPLAY_PREFERENCES,
            &StoredFormat {
                date_format: prefs.date_format,
                theme_mode: prefs.theme_mode,
                custom_color_index: prefs.custom_color_index,
            },
        )?;
        store.set_bool(keys::SHOW_LOADING, prefs.show_loading)
    }
}

/// Absolute expiry wins over a relative one
fn explicit_expiry(update: &SettingsUpdate, now: DateTime<Local>) -> Option<DateTime<Local>> {
    update
        .token_expires_at
        .and_then(from_epoch_millis)
        .or_else(|| {
            update
                .expires_in
                .and_then(ChronoDuration::try_seconds)
                .and_then(|d| now.checked_add_signed(d))
        })
}

fn read<T>(key: &str, result: StoreResult<Option<T>>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "Failed to read setting, using default");
            None
        }
    }
}

fn persist(what: &str, result: StoreResult<()>) {
    if let Err(e) = result {
        warn!(what, error = %e, "Failed to persist setting");
    }
}
