//! Upstream record parsing
//!
//! Upstream records are loose JSON; fields may be missing, null or floats.
//! Each kind picks the record for its target day and turns it into
//! [`MetricValues`]. Records that do not parse are skipped.

use chrono::{DateTime, FixedOffset, NaiveDate};
use ringlink_api::{MetricKind, MetricValues};
use ringlink_util::parse_day;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Contributors {
    recovery_index: Option<f64>,
    efficiency: Option<f64>,
}

/// Union of the daily collections' fields we read
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailyRecord {
    day: Option<String>,
    score: Option<f64>,
    contributors: Option<Contributors>,

    // readiness
    temperature_deviation: Option<f64>,
    recovery_index: Option<f64>,

    // sleep
    total_sleep_duration: Option<f64>,
    efficiency: Option<f64>,

    // activity
    active_calories: Option<f64>,
    steps: Option<f64>,

    // stress
    stress_high: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HeartRateSample {
    bpm: Option<f64>,
    rmssd: Option<f64>,
    timestamp: Option<String>,
}

fn int(v: Option<f64>) -> i32 {
    v.filter(|v| v.is_finite())
        .map(|v| v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
        .unwrap_or(0)
}

/// Extract the values of `kind` for `day` from an envelope's `data` array
pub fn extract(kind: MetricKind, data: &[Value], day: NaiveDate) -> Option<MetricValues> {
    match kind {
        MetricKind::HeartRate => latest_heart_rate(data),
        _ => {
            let record = daily_record(data, day)?;
            Some(daily_values(kind, &record))
        }
    }
}

/// The record whose `day` matches, or the last undated record
fn daily_record(data: &[Value], day: NaiveDate) -> Option<DailyRecord> {
    let records: Vec<DailyRecord> = data
        .iter()
        .filter_map(|v| match serde_json::from_value::<DailyRecord>(v.clone()) {
            Ok(r) => Some(r),
            Err(e) => {
                debug!(error = %e, "Skipping unparseable record");
                None
            }
        })
        .collect();

    let any_dated = records.iter().any(|r| r.day.is_some());
    if any_dated {
        records
            .into_iter()
            .rev()
            .find(|r| r.day.as_deref().and_then(parse_day) == Some(day))
    } else {
        records.into_iter().last()
    }
}

fn daily_values(kind: MetricKind, record: &DailyRecord) -> MetricValues {
    let contributors = record.contributors.as_ref();

    match kind {
        MetricKind::Readiness => MetricValues::Readiness {
            score: int(record.score),
            temperature_deviation: record
                .temperature_deviation
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
            recovery_index: int(
                contributors
                    .and_then(|c| c.recovery_index)
                    .or(record.recovery_index),
            ),
        },
        MetricKind::Sleep => MetricValues::Sleep {
            score: int(record.score),
            total_sleep_duration: int(record.total_sleep_duration),
            efficiency: int(record.efficiency.or(contributors.and_then(|c| c.efficiency))),
        },
        MetricKind::Activity => MetricValues::Activity {
            score: int(record.score),
            active_calories: int(record.active_calories),
            steps: int(record.steps),
        },
        MetricKind::Stress => MetricValues::Stress {
            high_duration_seconds: int(record.stress_high),
        },
        MetricKind::HeartRate => MetricValues::from_score(MetricKind::HeartRate, 0),
    }
}

/// Most recent sample by timestamp. Samples without a parseable timestamp
/// sort before every timestamped one; ties go to the later array position.
fn latest_heart_rate(data: &[Value]) -> Option<MetricValues> {
    let (_, _, sample) = data
        .iter()
        .enumerate()
        .filter_map(|(idx, v)| {
            let sample = serde_json::from_value::<HeartRateSample>(v.clone()).ok()?;
            let ts: Option<DateTime<FixedOffset>> = sample
                .timestamp
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
            Some((ts, idx, sample))
        })
        .max_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)))?;

    Some(MetricValues::HeartRate {
        resting_bpm: int(sample.bpm),
        hrv: int(sample.rmssd),
    })
}
