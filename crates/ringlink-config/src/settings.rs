//! Settings delivered by the configuration page
//!
//! The page hands back a JSON object, usually percent-encoded, whose values
//! may be numbers, booleans or their string spellings depending on which form
//! control produced them. Everything is parsed into [`SettingsUpdate`] and
//! validated here, before anything is merged into the running state.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::validation::{MAX_REFRESH_MINUTES, MIN_REFRESH_MINUTES};

pub const MAX_LAYOUT_SLOT: u8 = 4;
pub const MAX_THEME_MODE: u8 = 2;

/// Errors raised while parsing or validating a settings payload
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings payload is not valid UTF-8 after decoding")]
    Encoding,

    #[error("Settings payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// One settings payload; every field is optional and absent means "unchanged"
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    #[serde(alias = "oura_access_token", deserialize_with = "lenient_string")]
    pub access_token: Option<String>,

    /// Absolute expiry, epoch milliseconds
    #[serde(alias = "oura_token_expires", deserialize_with = "lenient_i64")]
    pub token_expires_at: Option<i64>,

    /// Relative expiry in seconds (OAuth `expires_in`)
    #[serde(deserialize_with = "lenient_i64")]
    pub expires_in: Option<i64>,

    #[serde(deserialize_with = "lenient_u32")]
    pub refresh_frequency_minutes: Option<u32>,

    #[serde(deserialize_with = "lenient_bool")]
    pub show_debug: Option<bool>,

    #[serde(deserialize_with = "lenient_bool")]
    pub show_loading: Option<bool>,

    #[serde(deserialize_with = "lenient_u8")]
    pub layout_left: Option<u8>,

    #[serde(deserialize_with = "lenient_u8")]
    pub layout_middle: Option<u8>,

    #[serde(deserialize_with = "lenient_u8")]
    pub layout_right: Option<u8>,

    #[serde(deserialize_with = "lenient_u8")]
    pub date_format: Option<u8>,

    #[serde(deserialize_with = "lenient_u8")]
    pub theme_mode: Option<u8>,

    #[serde(deserialize_with = "lenient_u8")]
    pub custom_color_index: Option<u8>,
}

impl SettingsUpdate {
    /// Parse a raw payload from the configuration page.
    ///
    /// Accepts plain JSON or percent-encoded JSON, then validates the result.
    pub fn parse(raw: &str) -> SettingsResult<Self> {
        let trimmed = raw.trim();
        let json = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            percent_decode_str(trimmed)
                .decode_utf8()
                .map_err(|_| SettingsError::Encoding)?
                .into_owned()
        };

        let update: SettingsUpdate = serde_json::from_str(&json)?;
        update.validate()?;
        Ok(update)
    }

    /// Check ranges of every field that is present
    pub fn validate(&self) -> SettingsResult<()> {
        if let Some(token) = &self.access_token
            && token.trim().is_empty()
        {
            return Err(invalid("access_token", "cannot be empty"));
        }

        if let Some(freq) = self.refresh_frequency_minutes
            && !(MIN_REFRESH_MINUTES..=MAX_REFRESH_MINUTES).contains(&freq)
        {
            return Err(invalid(
                "refresh_frequency_minutes",
                format!(
                    "{} not in {}..={}",
                    freq, MIN_REFRESH_MINUTES, MAX_REFRESH_MINUTES
                ),
            ));
        }

        if let Some(expires_in) = self.expires_in
            && expires_in <= 0
        {
            return Err(invalid("expires_in", "must be positive"));
        }

        for (field, slot) in [
            ("layout_left", self.layout_left),
            ("layout_middle", self.layout_middle),
            ("layout_right", self.layout_right),
        ] {
            if let Some(slot) = slot
                && slot > MAX_LAYOUT_SLOT
            {
                return Err(invalid(field, format!("{} not in 0..={}", slot, MAX_LAYOUT_SLOT)));
            }
        }

        if let Some(theme) = self.theme_mode
            && theme > MAX_THEME_MODE
        {
            return Err(invalid(
                "theme_mode",
                format!("{} not in 0..={}", theme, MAX_THEME_MODE),
            ));
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the fields present, for status reporting
    pub fn present_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut push = |present: bool, name: &'static str| {
            if present {
                fields.push(name);
            }
        };
        push(self.access_token.is_some(), "access_token");
        push(self.token_expires_at.is_some(), "token_expires_at");
        push(self.expires_in.is_some(), "expires_in");
        push(
            self.refresh_frequency_minutes.is_some(),
            "refresh_frequency_minutes",
        );
        push(self.show_debug.is_some(), "show_debug");
        push(self.show_loading.is_some(), "show_loading");
        push(self.layout_left.is_some(), "layout_left");
        push(self.layout_middle.is_some(), "layout_middle");
        push(self.layout_right.is_some(), "layout_right");
        push(self.date_format.is_some(), "date_format");
        push(self.theme_mode.is_some(), "theme_mode");
        push(self.custom_color_index.is_some(), "custom_color_index");
        fields
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        field,
        message: message.into(),
    }
}

/// A JSON scalar as the configuration page may send it
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

fn loose<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Loose>, D::Error> {
    Option::<Loose>::deserialize(d)
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    use serde::de::Error;
    match loose(d)? {
        None => Ok(None),
        Some(Loose::Int(v)) => Ok(Some(v)),
        Some(Loose::Float(v)) if v.fract() == 0.0 => Ok(Some(v as i64)),
        Some(Loose::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Loose::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected an integer, got '{}'", s))),
        Some(Loose::Bool(_)) | Some(Loose::Float(_)) => {
            Err(D::Error::custom("expected an integer"))
        }
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    use serde::de::Error;
    lenient_i64(d)?
        .map(|v| u32::try_from(v).map_err(|_| D::Error::custom(format!("{} out of range", v))))
        .transpose()
}

fn lenient_u8<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
    use serde::de::Error;
    lenient_i64(d)?
        .map(|v| u8::try_from(v).map_err(|_| D::Error::custom(format!("{} out of range", v))))
        .transpose()
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    use serde::de::Error;
    match loose(d)? {
        None => Ok(None),
        Some(Loose::Bool(b)) => Ok(Some(b)),
        Some(Loose::Int(v)) => Ok(Some(v != 0)),
        Some(Loose::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(Some(true)),
            "false" | "0" | "off" | "no" => Ok(Some(false)),
            "" => Ok(None),
            _ => Err(D::Error::custom(format!("expected a boolean, got '{}'", s))),
        },
        Some(Loose::Float(_)) => Err(D::Error::custom("expected a boolean")),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    use serde::de::Error;
    match loose(d)? {
        None => Ok(None),
        Some(Loose::Text(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(D::Error::custom("expected a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let update = SettingsUpdate::parse(
            r#"{"access_token":"abc123","refresh_frequency_minutes":30,"show_debug":true}"#,
        )
        .unwrap();
        assert_eq!(update.access_token.as_deref(), Some("abc123"));
        assert_eq!(update.refresh_frequency_minutes, Some(30));
        assert_eq!(update.show_debug, Some(true));
        assert!(update.layout_left.is_none());
    }

    #[test]
    fn parses_percent_encoded_json_with_string_values() {
        let raw = "%7B%22oura_access_token%22%3A%22tok%22%2C%22layout_left%22%3A%222%22%2C%22show_loading%22%3A%22false%22%7D";
        let update = SettingsUpdate::parse(raw).unwrap();
        assert_eq!(update.access_token.as_deref(), Some("tok"));
        assert_eq!(update.layout_left, Some(2));
        assert_eq!(update.show_loading, Some(false));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = SettingsUpdate::parse(r#"{"refresh_frequency_minutes":1}"#).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                field: "refresh_frequency_minutes",
                ..
            }
        ));

        let err = SettingsUpdate::parse(r#"{"layout_right":9}"#).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { field: "layout_right", .. }));

        let err = SettingsUpdate::parse(r#"{"theme_mode":"3"}"#).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { field: "theme_mode", .. }));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            SettingsUpdate::parse("not json"),
            Err(SettingsError::Json(_))
        ));
        assert!(SettingsUpdate::parse(r#"{"show_debug":"maybe"}"#).is_err());
        assert!(SettingsUpdate::parse(r#"{"layout_left":-1}"#).is_err());
    }

    #[test]
    fn empty_object_is_empty_update() {
        let update = SettingsUpdate::parse("{}").unwrap();
        assert!(update.is_empty());
        assert!(update.present_fields().is_empty());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let update = SettingsUpdate::parse(r#"{"some_future_key":1,"date_format":1}"#).unwrap();
        assert_eq!(update.date_format, Some(1));
        assert_eq!(update.present_fields(), vec!["date_format"]);
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(SettingsUpdate::parse(r#"{"access_token":"   "}"#).is_err());
    }
}
