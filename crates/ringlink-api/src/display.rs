//! Flat key-value messages for the display
//!
//! The watch-side renderer only understands a flat dictionary of integers
//! and strings, so every payload is flattened before it leaves the bridge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{AggregatedPayload, MetricKind, MetricReading, MetricValues};

/// Message keys understood by the display
pub mod keys {
    pub const DEBUG_STATUS: &str = "debug_status";
    pub const PAYLOAD_COMPLETE: &str = "payload_complete";
    pub const LAST_UPDATED: &str = "last_updated";
    pub const CONFIGURED: &str = "configured";

    pub const HEART_RATE: &str = "heart_rate";
    pub const RESTING_HEART_RATE: &str = "resting_heart_rate";
    pub const HRV_SCORE: &str = "hrv_score";

    pub const READINESS: &str = "readiness";
    pub const READINESS_SCORE: &str = "readiness_score";
    pub const TEMPERATURE_DEVIATION: &str = "temperature_deviation";
    pub const RECOVERY_INDEX: &str = "recovery_index";

    pub const SLEEP: &str = "sleep";
    pub const SLEEP_SCORE: &str = "sleep_score";
    pub const TOTAL_SLEEP_TIME: &str = "total_sleep_time";
    pub const SLEEP_EFFICIENCY: &str = "sleep_efficiency";

    pub const ACTIVITY: &str = "activity";
    pub const ACTIVITY_SCORE: &str = "activity_score";
    pub const ACTIVE_CALORIES: &str = "active_calories";
    pub const STEPS: &str = "steps";

    pub const STRESS: &str = "stress";
    pub const STRESS_DURATION: &str = "stress_duration";

    pub const LAYOUT_LEFT: &str = "layout_left";
    pub const LAYOUT_MIDDLE: &str = "layout_middle";
    pub const LAYOUT_RIGHT: &str = "layout_right";
    pub const DATE_FORMAT: &str = "date_format";
    pub const THEME_MODE: &str = "theme_mode";
    pub const CUSTOM_COLOR_INDEX: &str = "custom_color_index";
    pub const SHOW_LOADING: &str = "show_loading";
}

/// A single value in a display message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayValue {
    Int(i32),
    Text(String),
}

/// Which metric sits in each of the three display slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub left: u8,
    pub middle: u8,
    pub right: u8,
}

impl Default for Layout {
    fn default() -> Self {
        // readiness - sleep - heart rate
        Self {
            left: 0,
            middle: 1,
            right: 2,
        }
    }
}

/// Display-side presentation preferences forwarded with every full payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayPreferences {
    pub layout: Layout,
    pub date_format: u8,
    pub theme_mode: u8,
    pub custom_color_index: u8,
    pub show_loading: bool,
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            date_format: 0,
            theme_mode: 0,
            custom_color_index: 0,
            show_loading: true,
        }
    }
}

/// Flat key-value message sent to the display
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayMessage(BTreeMap<String, DisplayValue>);

impl DisplayMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_int(&mut self, key: &str, value: i32) -> &mut Self {
        self.0.insert(key.to_string(), DisplayValue::Int(value));
        self
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.to_string(), DisplayValue::Text(value.into()));
        self
    }

    pub fn set_flag(&mut self, key: &str, on: bool) -> &mut Self {
        self.set_int(key, on as i32)
    }

    pub fn get(&self, key: &str) -> Option<&DisplayValue> {
        self.0.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.0.get(key) {
            Some(DisplayValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(DisplayValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    /// Free-text diagnostics for the display's debug line
    pub fn debug_status(text: impl Into<String>) -> Self {
        let mut msg = Self::new();
        msg.set_text(keys::DEBUG_STATUS, text);
        msg
    }

    /// Status-only message telling the display there is nothing to show until
    /// the user (re)configures the bridge
    pub fn not_configured() -> Self {
        let mut msg = Self::new();
        msg.set_flag(keys::CONFIGURED, false);
        msg.set_flag(keys::PAYLOAD_COMPLETE, false);
        msg
    }

    /// Flatten a full cycle payload
    pub fn from_payload(payload: &AggregatedPayload, prefs: &DisplayPreferences) -> Self {
        let mut msg = Self::new();
        msg.apply_preferences(prefs);

        for reading in &payload.readings {
            msg.apply_reading(reading);
        }

        msg.set_flag(keys::CONFIGURED, true);
        msg.set_flag(keys::PAYLOAD_COMPLETE, payload.is_complete());
        msg.set_int(
            keys::LAST_UPDATED,
            payload
                .last_updated
                .timestamp()
                .clamp(0, i32::MAX as i64) as i32,
        );
        msg
    }

    fn apply_preferences(&mut self, prefs: &DisplayPreferences) {
        self.set_int(keys::LAYOUT_LEFT, prefs.layout.left as i32);
        self.set_int(keys::LAYOUT_MIDDLE, prefs.layout.middle as i32);
        self.set_int(keys::LAYOUT_RIGHT, prefs.layout.right as i32);
        self.set_int(keys::DATE_FORMAT, prefs.date_format as i32);
        self.set_int(keys::THEME_MODE, prefs.theme_mode as i32);
        self.set_int(keys::CUSTOM_COLOR_INDEX, prefs.custom_color_index as i32);
        self.set_flag(keys::SHOW_LOADING, prefs.show_loading);
    }

    fn apply_reading(&mut self, reading: &MetricReading) {
        let family = family_key(reading.kind());
        self.set_int(family, 1);
        self.set_flag(&available_key(family), reading.available());
        self.set_flag(&fallback_key(family), reading.source().is_fallback());

        let values = reading
            .values()
            .cloned()
            .unwrap_or_else(|| MetricValues::from_score(reading.kind(), 0));

        match values {
            MetricValues::HeartRate { resting_bpm, hrv } => {
                self.set_int(keys::RESTING_HEART_RATE, resting_bpm);
                self.set_int(keys::HRV_SCORE, hrv);
            }
            MetricValues::Readiness {
                score,
                temperature_deviation,
                recovery_index,
            } => {
                self.set_int(keys::READINESS_SCORE, score);
                // Hundredths of a degree; the display has no floats
                self.set_int(
                    keys::TEMPERATURE_DEVIATION,
                    (temperature_deviation * 100.0).round() as i32,
                );
                self.set_int(keys::RECOVERY_INDEX, recovery_index);
            }
            MetricValues::Sleep {
                score,
                total_sleep_duration,
                efficiency,
            } => {
                self.set_int(keys::SLEEP_SCORE, score);
                self.set_int(keys::TOTAL_SLEEP_TIME, total_sleep_duration / 60);
                self.set_int(keys::SLEEP_EFFICIENCY, efficiency);
            }
            MetricValues::Activity {
                score,
                active_calories,
                steps,
            } => {
                self.set_int(keys::ACTIVITY_SCORE, score);
                self.set_int(keys::ACTIVE_CALORIES, active_calories);
                self.set_int(keys::STEPS, steps);
            }
            MetricValues::Stress {
                high_duration_seconds,
            } => {
                self.set_int(keys::STRESS_DURATION, high_duration_seconds);
            }
        }
    }
}

fn family_key(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::HeartRate => keys::HEART_RATE,
        MetricKind::Readiness => keys::READINESS,
        MetricKind::Sleep => keys::SLEEP,
        MetricKind::Activity => keys::ACTIVITY,
        MetricKind::Stress => keys::STRESS,
    }
}

/// `<family>_available` flag key
pub fn available_key(family: &str) -> String {
    format!("{}_available", family)
}

/// `<family>_fallback` flag key
pub fn fallback_key(family: &str) -> String {
    format!("{}_fallback", family)
}
