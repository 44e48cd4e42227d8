//! Stable key names in the persisted store

pub const ACCESS_TOKEN: &str = "access_token";
/// Epoch milliseconds
pub const TOKEN_EXPIRES_AT: &str = "token_expires_at";
pub const REFRESH_FREQUENCY_MINUTES: &str = "refresh_frequency_minutes";
pub const SHOW_DEBUG: &str = "show_debug";
pub const SHOW_LOADING: &str = "show_loading";
/// JSON `{left, middle, right}`
pub const MEASUREMENT_LAYOUT: &str = "measurement_layout";
/// JSON `{date_format, theme_mode, custom_color_index}`
pub const DISPLAY_PREFERENCES: &str = "display_preferences";
/// Epoch milliseconds of the last fully delivered payload
pub const LAST_UPDATE: &str = "last_update";
/// JSON document holding one entry per metric kind
pub const SCORE_CACHE: &str = "score_cache";
