//! Validated service configuration

use crate::schema::{
    RawConfig, RawDeliveryConfig, RawRefreshConfig, RawServiceConfig, RawUpstreamConfig,
    RawUpstreamMode,
};
use ringlink_util::{default_data_dir, default_socket_path};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8787/api/oura";
pub const DEFAULT_BASE_URL: &str = "https://api.ouraring.com/v2/usercollection";

/// Validated configuration ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    pub upstream: UpstreamConfig,
    pub delivery: DeliveryConfig,
    pub refresh: RefreshConfig,
}

impl ServiceConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceSection::from_raw(raw.service),
            upstream: UpstreamConfig::from_raw(raw.upstream),
            delivery: DeliveryConfig::from_raw(raw.delivery),
            refresh: RefreshConfig::from_raw(raw.refresh),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSection {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceSection {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
        }
    }
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Where metric requests go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamMode {
    /// `GET <proxy_url>?endpoint=...&start_date=...&end_date=...`
    Proxy { proxy_url: String },
    /// `GET <base_url>/<endpoint>?start_date=...&end_date=...`
    Direct { base_url: String },
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub mode: UpstreamMode,
    pub request_timeout: Duration,
    pub activity_lookback_days: u32,
    pub token_in_query: bool,
}

impl UpstreamConfig {
    fn from_raw(raw: RawUpstreamConfig) -> Self {
        let mode = match raw.mode.unwrap_or_default() {
            RawUpstreamMode::Proxy => UpstreamMode::Proxy {
                proxy_url: raw
                    .proxy_url
                    .unwrap_or_else(|| DEFAULT_PROXY_URL.to_string()),
            },
            RawUpstreamMode::Direct => UpstreamMode::Direct {
                base_url: raw
                    .base_url
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
        };

        Self {
            mode,
            request_timeout: Duration::from_secs(raw.request_timeout_secs.unwrap_or(15)),
            activity_lookback_days: raw.activity_lookback_days.unwrap_or(3),
            token_in_query: raw.token_in_query.unwrap_or(false),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self::from_raw(RawUpstreamConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub ack_timeout: Duration,
    pub debug_throttle: Duration,
    /// None disables the auto-clear
    pub debug_clear_after: Option<Duration>,
}

impl DeliveryConfig {
    fn from_raw(raw: RawDeliveryConfig) -> Self {
        Self {
            max_attempts: raw.max_attempts.unwrap_or(3),
            retry_delay: Duration::from_millis(raw.retry_delay_ms.unwrap_or(250)),
            ack_timeout: Duration::from_millis(raw.ack_timeout_ms.unwrap_or(5000)),
            debug_throttle: Duration::from_millis(raw.debug_throttle_ms.unwrap_or(1000)),
            debug_clear_after: match raw.debug_clear_after_secs.unwrap_or(300) {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self::from_raw(RawDeliveryConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    pub default_frequency_minutes: u32,
    pub default_token_ttl_days: u32,
}

impl RefreshConfig {
    fn from_raw(raw: RawRefreshConfig) -> Self {
        Self {
            default_frequency_minutes: raw.default_frequency_minutes.unwrap_or(60),
            default_token_ttl_days: raw.default_token_ttl_days.unwrap_or(30),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::from_raw(RawRefreshConfig::default())
    }
}
