//! Configuration validation

use crate::schema::RawConfig;
use thiserror::Error;

/// Refresh frequency bounds shared by the service config and settings updates
pub const MIN_REFRESH_MINUTES: u32 = 5;
pub const MAX_REFRESH_MINUTES: u32 = 1440;

pub const MAX_ACTIVITY_LOOKBACK_DAYS: u32 = 14;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {value} is out of range ({min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{field}: invalid URL '{value}' (expected http:// or https://)")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let up = &config.upstream;
    check_url(&mut errors, "upstream.proxy_url", up.proxy_url.as_deref());
    check_url(&mut errors, "upstream.base_url", up.base_url.as_deref());
    check_range(
        &mut errors,
        "upstream.request_timeout_secs",
        up.request_timeout_secs,
        1,
        300,
    );
    check_range(
        &mut errors,
        "upstream.activity_lookback_days",
        up.activity_lookback_days.map(u64::from),
        1,
        MAX_ACTIVITY_LOOKBACK_DAYS as u64,
    );

    let del = &config.delivery;
    check_range(
        &mut errors,
        "delivery.max_attempts",
        del.max_attempts.map(u64::from),
        1,
        10,
    );
    check_range(&mut errors, "delivery.retry_delay_ms", del.retry_delay_ms, 0, 60_000);
    check_range(&mut errors, "delivery.ack_timeout_ms", del.ack_timeout_ms, 1, 120_000);
    check_range(
        &mut errors,
        "delivery.debug_throttle_ms",
        del.debug_throttle_ms,
        0,
        60_000,
    );

    let refresh = &config.refresh;
    check_range(
        &mut errors,
        "refresh.default_frequency_minutes",
        refresh.default_frequency_minutes.map(u64::from),
        MIN_REFRESH_MINUTES as u64,
        MAX_REFRESH_MINUTES as u64,
    );
    check_range(
        &mut errors,
        "refresh.default_token_ttl_days",
        refresh.default_token_ttl_days.map(u64::from),
        1,
        365,
    );

    if let Some(path) = &config.service.socket_path
        && path.as_os_str().is_empty()
    {
        errors.push(ValidationError::Invalid {
            field: "service.socket_path",
            message: "cannot be empty".into(),
        });
    }

    errors
}

fn check_range(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: Option<u64>,
    min: u64,
    max: u64,
) {
    if let Some(value) = value
        && !(min..=max).contains(&value)
    {
        errors.push(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: Option<&str>) {
    if let Some(url) = value
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        errors.push(ValidationError::InvalidUrl {
            field,
            value: url.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> RawConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn empty_config_is_valid() {
        assert!(validate_config(&parse("config_version = 1")).is_empty());
    }

    #[test]
    fn collects_all_errors() {
        let raw = parse(
            r#"
            config_version = 1

            [upstream]
            proxy_url = "ftp://example.com"
            activity_lookback_days = 30

            [delivery]
            max_attempts = 0

            [refresh]
            default_frequency_minutes = 1
        "#,
        );

        let errors = validate_config(&raw);
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidUrl {
            field: "upstream.proxy_url",
            value: "ftp://example.com".into(),
        }));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::OutOfRange {
                field: "refresh.default_frequency_minutes",
                value: 1,
                ..
            }
        )));
    }

    #[test]
    fn zero_retry_delay_is_allowed() {
        let raw = parse(
            r#"
            config_version = 1
            [delivery]
            retry_delay_ms = 0
        "#,
        );
        assert!(validate_config(&raw).is_empty());
    }
}
