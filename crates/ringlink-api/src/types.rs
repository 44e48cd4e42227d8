//! Shared types for the ringlink data model

use chrono::{DateTime, Local, NaiveDate};
use ringlink_util::CycleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The daily metrics tracked by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    HeartRate,
    Readiness,
    Sleep,
    Activity,
    Stress,
}

impl MetricKind {
    /// Every tracked metric, in display order
    pub const ALL: [MetricKind; 5] = [
        MetricKind::HeartRate,
        MetricKind::Readiness,
        MetricKind::Sleep,
        MetricKind::Activity,
        MetricKind::Stress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::HeartRate => "heart_rate",
            MetricKind::Readiness => "readiness",
            MetricKind::Sleep => "sleep",
            MetricKind::Activity => "activity",
            MetricKind::Stress => "stress",
        }
    }

    /// Upstream collection holding this metric
    pub fn endpoint(&self) -> Endpoint {
        match self {
            MetricKind::HeartRate => Endpoint::HeartRate,
            MetricKind::Readiness => Endpoint::DailyReadiness,
            MetricKind::Sleep => Endpoint::DailySleep,
            MetricKind::Activity => Endpoint::DailyActivity,
            MetricKind::Stress => Endpoint::DailyStress,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown metric kind: {0}")]
pub struct UnknownMetricKind(pub String);

impl FromStr for MetricKind {
    type Err = UnknownMetricKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownMetricKind(s.to_string()))
    }
}

/// Upstream API collections reachable through the relay proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    #[serde(rename = "heartrate")]
    HeartRate,
    DailyReadiness,
    DailySleep,
    DailyActivity,
    DailyStress,
    PersonalInfo,
}

impl Endpoint {
    /// The relay's allow-list
    pub const ALL: [Endpoint; 6] = [
        Endpoint::HeartRate,
        Endpoint::DailyReadiness,
        Endpoint::DailySleep,
        Endpoint::DailyActivity,
        Endpoint::DailyStress,
        Endpoint::PersonalInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::HeartRate => "heartrate",
            Endpoint::DailyReadiness => "daily_readiness",
            Endpoint::DailySleep => "daily_sleep",
            Endpoint::DailyActivity => "daily_activity",
            Endpoint::DailyStress => "daily_stress",
            Endpoint::PersonalInfo => "personal_info",
        }
    }

    /// Comma-separated allow-list, as reported in relay errors
    pub fn allowed_list() -> String {
        Endpoint::ALL
            .iter()
            .map(|e| e.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown endpoint: {0}")]
pub struct UnknownEndpoint(pub String);

impl FromStr for Endpoint {
    type Err = UnknownEndpoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEndpoint(s.to_string()))
    }
}

/// Bearer token for the upstream API.
///
/// `Debug` and `Display` never print the full secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{}… ({} chars)", prefix, self.0.chars().count())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({})", self.redacted())
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Kind-specific values of one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricValues {
    HeartRate {
        resting_bpm: i32,
        hrv: i32,
    },
    Readiness {
        score: i32,
        /// Degrees Celsius relative to the personal baseline
        temperature_deviation: f64,
        recovery_index: i32,
    },
    Sleep {
        score: i32,
        /// Seconds
        total_sleep_duration: i32,
        efficiency: i32,
    },
    Activity {
        score: i32,
        active_calories: i32,
        steps: i32,
    },
    Stress {
        high_duration_seconds: i32,
    },
}

impl MetricValues {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValues::HeartRate { .. } => MetricKind::HeartRate,
            MetricValues::Readiness { .. } => MetricKind::Readiness,
            MetricValues::Sleep { .. } => MetricKind::Sleep,
            MetricValues::Activity { .. } => MetricKind::Activity,
            MetricValues::Stress { .. } => MetricKind::Stress,
        }
    }

    /// The headline value that decides validity and gets cached
    pub fn score(&self) -> i64 {
        match self {
            MetricValues::HeartRate { resting_bpm, .. } => *resting_bpm as i64,
            MetricValues::Readiness { score, .. }
            | MetricValues::Sleep { score, .. }
            | MetricValues::Activity { score, .. } => *score as i64,
            MetricValues::Stress {
                high_duration_seconds,
            } => *high_duration_seconds as i64,
        }
    }

    /// Whether this reading carries a usable (strictly positive) score
    pub fn is_valid(&self) -> bool {
        self.score() > 0
    }

    /// Values rebuilt from a cached headline score; detail fields are unknown and zeroed
    pub fn from_score(kind: MetricKind, score: i64) -> Self {
        let score = score.clamp(0, i32::MAX as i64) as i32;
        match kind {
            MetricKind::HeartRate => MetricValues::HeartRate {
                resting_bpm: score,
                hrv: 0,
            },
            MetricKind::Readiness => MetricValues::Readiness {
                score,
                temperature_deviation: 0.0,
                recovery_index: 0,
            },
            MetricKind::Sleep => MetricValues::Sleep {
                score,
                total_sleep_duration: 0,
                efficiency: 0,
            },
            MetricKind::Activity => MetricValues::Activity {
                score,
                active_calories: 0,
                steps: 0,
            },
            MetricKind::Stress => MetricValues::Stress {
                high_duration_seconds: score,
            },
        }
    }
}

/// Where a reading's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    /// Fresh record for the current local day
    Today,
    /// Fresh record for the previous local day, shown as a fallback
    Yesterday,
    /// Substituted from the score cache
    Cache,
    /// Nothing usable this cycle
    Unavailable,
}

impl ReadingSource {
    /// Values the display should mark as not-fresh
    pub fn is_fallback(&self) -> bool {
        matches!(self, ReadingSource::Yesterday | ReadingSource::Cache)
    }
}

/// One metric's outcome for one fetch cycle. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    kind: MetricKind,
    values: Option<MetricValues>,
    observed_date: Option<NaiveDate>,
    source: ReadingSource,
}

impl MetricReading {
    /// Reading built from a fetched record
    pub fn fetched(values: MetricValues, observed_date: NaiveDate, source: ReadingSource) -> Self {
        Self {
            kind: values.kind(),
            values: Some(values),
            observed_date: Some(observed_date),
            source,
        }
    }

    /// Reading substituted from a cached score
    pub fn cached(kind: MetricKind, score: i64, observed_date: NaiveDate) -> Self {
        Self {
            kind,
            values: Some(MetricValues::from_score(kind, score)),
            observed_date: Some(observed_date),
            source: ReadingSource::Cache,
        }
    }

    /// No usable value this cycle
    pub fn unavailable(kind: MetricKind) -> Self {
        Self {
            kind,
            values: None,
            observed_date: None,
            source: ReadingSource::Unavailable,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn values(&self) -> Option<&MetricValues> {
        self.values.as_ref()
    }

    pub fn observed_date(&self) -> Option<NaiveDate> {
        self.observed_date
    }

    pub fn source(&self) -> ReadingSource {
        self.source
    }

    pub fn available(&self) -> bool {
        self.values.is_some() && self.source != ReadingSource::Unavailable
    }

    /// Headline score, 0 when unavailable
    pub fn score(&self) -> i64 {
        self.values.as_ref().map(|v| v.score()).unwrap_or(0)
    }
}

/// Merge of every reading of one fetch cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPayload {
    pub cycle_id: CycleId,
    pub readings: Vec<MetricReading>,
    pub completed_count: usize,
    pub expected_count: usize,
    pub last_updated: DateTime<Local>,
}

impl AggregatedPayload {
    /// Build a payload from the readings of a cycle that expected `expected_count` fetchers
    pub fn new(
        cycle_id: CycleId,
        readings: Vec<MetricReading>,
        expected_count: usize,
        last_updated: DateTime<Local>,
    ) -> Self {
        Self {
            cycle_id,
            completed_count: readings.len(),
            readings,
            expected_count,
            last_updated,
        }
    }

    /// Every expected fetcher reported
    pub fn is_complete(&self) -> bool {
        self.completed_count == self.expected_count
    }

    pub fn get(&self, kind: MetricKind) -> Option<&MetricReading> {
        self.readings.iter().find(|r| r.kind() == kind)
    }

    pub fn available_count(&self) -> usize {
        self.readings.iter().filter(|r| r.available()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_kind_roundtrip() {
        for kind in MetricKind::ALL {
            assert_eq!(kind.as_str().parse::<MetricKind>().unwrap(), kind);
        }
        assert!("steps".parse::<MetricKind>().is_err());
    }

    #[test]
    fn metric_kind_serializes_snake_case() {
        let json = serde_json::to_string(&MetricKind::HeartRate).unwrap();
        assert_eq!(json, "\"heart_rate\"");
    }

    #[test]
    fn endpoint_names_match_upstream() {
        assert_eq!(MetricKind::HeartRate.endpoint().as_str(), "heartrate");
        assert_eq!(MetricKind::Activity.endpoint().as_str(), "daily_activity");
        assert_eq!("daily_stress".parse::<Endpoint>().unwrap(), Endpoint::DailyStress);
        assert!("unknown_endpoint".parse::<Endpoint>().is_err());
        assert_eq!(
            serde_json::to_string(&Endpoint::HeartRate).unwrap(),
            "\"heartrate\""
        );
    }

    #[test]
    fn allowed_list_names_every_endpoint() {
        let list = Endpoint::allowed_list();
        for endpoint in Endpoint::ALL {
            assert!(list.contains(endpoint.as_str()));
        }
    }

    #[test]
    fn token_is_redacted() {
        let token = AccessToken::new("ABCDEFGHIJKLMNOP");
        let shown = format!("{} {:?}", token, token);
        assert!(!shown.contains("GHIJKLMNOP"));
        assert!(shown.contains("ABCDEF"));
        assert!(shown.contains("16 chars"));
    }

    #[test]
    fn token_is_trimmed() {
        assert_eq!(AccessToken::new("  abc \n").as_str(), "abc");
        assert!(AccessToken::new("   ").is_empty());
    }

    #[test]
    fn values_score_and_validity() {
        let sleep = MetricValues::Sleep {
            score: 72,
            total_sleep_duration: 27000,
            efficiency: 88,
        };
        assert_eq!(sleep.score(), 72);
        assert!(sleep.is_valid());

        let stress = MetricValues::from_score(MetricKind::Stress, 0);
        assert!(!stress.is_valid());
        assert_eq!(stress.kind(), MetricKind::Stress);
    }

    #[test]
    fn cached_reading_is_available_fallback() {
        let day = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let reading = MetricReading::cached(MetricKind::Readiness, 81, day);
        assert!(reading.available());
        assert_eq!(reading.score(), 81);
        assert!(reading.source().is_fallback());
        assert_eq!(reading.observed_date(), Some(day));
    }

    #[test]
    fn unavailable_reading() {
        let reading = MetricReading::unavailable(MetricKind::Sleep);
        assert!(!reading.available());
        assert_eq!(reading.score(), 0);
        assert!(!reading.source().is_fallback());
    }

    #[test]
    fn payload_completion() {
        let readings = MetricKind::ALL
            .iter()
            .map(|k| MetricReading::unavailable(*k))
            .collect();
        let payload = AggregatedPayload::new(CycleId::new(), readings, 5, Local::now());
        assert!(payload.is_complete());
        assert_eq!(payload.available_count(), 0);
        assert!(payload.get(MetricKind::Stress).is_some());
    }
}
