//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub upstream: RawUpstreamConfig,

    #[serde(default)]
    pub delivery: RawDeliveryConfig,

    #[serde(default)]
    pub refresh: RawRefreshConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Display link socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the persisted store
    pub data_dir: Option<PathBuf>,
}

/// How metric requests leave the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RawUpstreamMode {
    /// Through the CORS relay proxy
    #[default]
    Proxy,
    /// Straight to the upstream API
    Direct,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawUpstreamConfig {
    pub mode: Option<RawUpstreamMode>,

    /// Relay proxy URL (proxy mode)
    pub proxy_url: Option<String>,

    /// Upstream collection base URL (direct mode)
    pub base_url: Option<String>,

    pub request_timeout_secs: Option<u64>,

    /// How many days back the activity request reaches
    pub activity_lookback_days: Option<u32>,

    /// Also send the token as a query parameter (older proxies only read it there)
    pub token_in_query: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDeliveryConfig {
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub ack_timeout_ms: Option<u64>,
    pub debug_throttle_ms: Option<u64>,
    /// 0 disables the auto-clear
    pub debug_clear_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRefreshConfig {
    /// Used until the configuration page sets a frequency
    pub default_frequency_minutes: Option<u32>,

    /// Token lifetime assumed when settings carry no expiry
    pub default_token_ttl_days: Option<u32>,
}
