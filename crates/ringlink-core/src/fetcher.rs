//! Metric fetcher
//!
//! Resolves one metric for one cycle, in order of preference:
//! 1. today's record, if its score is positive
//! 2. yesterday's record, if its score is positive (tagged as a fallback)
//! 3. a fresh enough cached score
//! 4. unavailable
//!
//! A failed request for today skips straight to the cache. Every request
//! resolves once; retries belong to the delivery queue.

use chrono::NaiveDate;
use ringlink_adapter_api::{MetricSource, SourceError, SourceRequest};
use ringlink_api::{AccessToken, MetricKind, MetricReading, MetricValues, ReadingSource};
use ringlink_util::{days_before, DayPair};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::records::extract;
use crate::ScoreCache;

/// Cached scores older than this many days are not shown (activity uses its lookback)
pub const DEFAULT_CACHE_MAX_AGE_DAYS: u32 = 1;

/// Result of fetching one metric
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub reading: MetricReading,
    /// The first request error seen, if any
    pub error: Option<SourceError>,
}

/// Fetches metrics from a [`MetricSource`], falling back through the score cache
pub struct MetricFetcher {
    source: Arc<dyn MetricSource>,
    cache: Arc<ScoreCache>,
    activity_lookback_days: u32,
}

impl MetricFetcher {
    pub fn new(
        source: Arc<dyn MetricSource>,
        cache: Arc<ScoreCache>,
        activity_lookback_days: u32,
    ) -> Self {
        Self {
            source,
            cache,
            activity_lookback_days,
        }
    }

    pub fn cache(&self) -> &Arc<ScoreCache> {
        &self.cache
    }

    /// How old a cached entry of `kind` may be and still stand in
    pub fn cache_max_age(&self, kind: MetricKind) -> u32 {
        match kind {
            MetricKind::Activity => self.activity_lookback_days,
            _ => DEFAULT_CACHE_MAX_AGE_DAYS,
        }
    }

    /// Request for `kind` targeting `day`. Activity widens the range backwards
    /// because the provider back-dates it before it settles.
    pub fn request_for(&self, kind: MetricKind, token: &AccessToken, day: NaiveDate) -> SourceRequest {
        let start = match kind {
            MetricKind::Activity => days_before(day, self.activity_lookback_days),
            _ => day,
        };
        SourceRequest::new(kind.endpoint(), token.clone(), start, day)
    }

    /// Resolve `kind` for the given days
    pub async fn fetch(&self, kind: MetricKind, token: &AccessToken, days: DayPair) -> FetchReport {
        let today = match self.fetch_day(kind, token, days.today).await {
            Ok(values) => values,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Fetch failed, trying cache");
                return FetchReport {
                    reading: self.from_cache(kind, days.today),
                    error: Some(e),
                };
            }
        };

        if let Some(values) = today.filter(MetricValues::is_valid) {
            self.cache.put(kind, values.score(), days.today);
            info!(kind = %kind, score = values.score(), "Fresh value for today");
            return FetchReport {
                reading: MetricReading::fetched(values, days.today, ReadingSource::Today),
                error: None,
            };
        }

        debug!(kind = %kind, "Nothing for today, trying yesterday");

        let error = match self.fetch_day(kind, token, days.yesterday).await {
            Ok(Some(values)) if values.is_valid() => {
                self.cache.put(kind, values.score(), days.yesterday);
                info!(kind = %kind, score = values.score(), "Using yesterday's value");
                return FetchReport {
                    reading: MetricReading::fetched(values, days.yesterday, ReadingSource::Yesterday),
                    error: None,
                };
            }
            Ok(_) => None,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Fetch for yesterday failed");
                Some(e)
            }
        };

        FetchReport {
            reading: self.from_cache(kind, days.today),
            error,
        }
    }

    async fn fetch_day(
        &self,
        kind: MetricKind,
        token: &AccessToken,
        day: NaiveDate,
    ) -> Result<Option<MetricValues>, SourceError> {
        let request = self.request_for(kind, token, day);
        let envelope = self.source.fetch(&request).await?;
        Ok(extract(kind, &envelope.data, day))
    }

    fn from_cache(&self, kind: MetricKind, today: NaiveDate) -> MetricReading {
        match self.cache.get_fresh(kind, today, self.cache_max_age(kind)) {
            Some(entry) => {
                info!(
                    kind = %kind,
                    score = entry.score,
                    observed_date = %entry.observed_date,
                    "Using cached value"
                );
                MetricReading::cached(kind, entry.score, entry.observed_date)
            }
            None => {
                info!(kind = %kind, "No value available");
                MetricReading::unavailable(kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringlink_adapter_api::MockSource;
    use ringlink_api::Endpoint;
    use ringlink_store::{SqliteStore, Store};
    use serde_json::json;

    fn days() -> DayPair {
        DayPair {
            today: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            yesterday: NaiveDate::from_ymd_opt(2025, 6, 9).unwrap(),
        }
    }

    fn setup() -> (Arc<MockSource>, MetricFetcher) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let cache = Arc::new(ScoreCache::load(store));
        let source = Arc::new(MockSource::new());
        let fetcher = MetricFetcher::new(source.clone(), cache, 3);
        (source, fetcher)
    }

    fn token() -> AccessToken {
        AccessToken::new("tok")
    }

    #[tokio::test]
    async fn today_positive_wins_and_is_cached() {
        let (source, fetcher) = setup();
        let d = days();
        source.respond(
            Endpoint::DailySleep,
            d.today,
            vec![json!({"day": "2025-06-10", "score": 80})],
        );
        source.respond(
            Endpoint::DailySleep,
            d.yesterday,
            vec![json!({"day": "2025-06-09", "score": 60})],
        );

        let report = fetcher.fetch(MetricKind::Sleep, &token(), d).await;
        assert_eq!(report.reading.score(), 80);
        assert_eq!(report.reading.source(), ReadingSource::Today);
        assert_eq!(report.reading.observed_date(), Some(d.today));

        // Yesterday is never asked for
        assert_eq!(source.call_count(), 1);

        let cached = fetcher.cache().get(MetricKind::Sleep).unwrap();
        assert_eq!((cached.score, cached.observed_date), (80, d.today));
    }

    #[tokio::test]
    async fn empty_today_falls_back_to_yesterday() {
        let (source, fetcher) = setup();
        let d = days();
        source.respond(Endpoint::DailySleep, d.today, vec![]);
        source.respond(
            Endpoint::DailySleep,
            d.yesterday,
            vec![json!({"day": "2025-06-09", "score": 72})],
        );

        let report = fetcher.fetch(MetricKind::Sleep, &token(), d).await;
        assert_eq!(report.reading.score(), 72);
        assert!(report.reading.available());
        assert_eq!(report.reading.source(), ReadingSource::Yesterday);

        let cached = fetcher.cache().get(MetricKind::Sleep).unwrap();
        assert_eq!(cached.observed_date, d.yesterday);
    }

    #[tokio::test]
    async fn zero_today_falls_back_to_yesterday() {
        let (source, fetcher) = setup();
        let d = days();
        source.respond(
            Endpoint::DailyReadiness,
            d.today,
            vec![json!({"day": "2025-06-10", "score": 0})],
        );
        source.respond(
            Endpoint::DailyReadiness,
            d.yesterday,
            vec![json!({"day": "2025-06-09", "score": 81})],
        );

        let report = fetcher.fetch(MetricKind::Readiness, &token(), d).await;
        assert_eq!(report.reading.score(), 81);
        assert_eq!(report.reading.source(), ReadingSource::Yesterday);
    }

    #[tokio::test]
    async fn both_empty_uses_cache() {
        let (source, fetcher) = setup();
        let d = days();
        fetcher.cache().put(MetricKind::Readiness, 77, d.yesterday);
        source.respond(Endpoint::DailyReadiness, d.today, vec![]);
        source.respond(Endpoint::DailyReadiness, d.yesterday, vec![]);

        let report = fetcher.fetch(MetricKind::Readiness, &token(), d).await;
        assert_eq!(report.reading.score(), 77);
        assert!(report.reading.available());
        assert_eq!(report.reading.source(), ReadingSource::Cache);
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn today_failure_skips_yesterday_and_uses_cache() {
        let (source, fetcher) = setup();
        let d = days();
        fetcher.cache().put(MetricKind::Sleep, 70, d.today);
        source.fail(Endpoint::DailySleep, d.today, SourceError::Timeout);

        let report = fetcher.fetch(MetricKind::Sleep, &token(), d).await;
        assert_eq!(report.reading.score(), 70);
        assert_eq!(report.reading.source(), ReadingSource::Cache);
        assert_eq!(report.error, Some(SourceError::Timeout));
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn nothing_anywhere_is_unavailable() {
        let (source, fetcher) = setup();
        source.fail_everything(SourceError::Network("down".into()));

        let report = fetcher.fetch(MetricKind::Stress, &token(), days()).await;
        assert!(!report.reading.available());
        assert_eq!(report.reading.source(), ReadingSource::Unavailable);
    }

    #[tokio::test]
    async fn stale_cache_is_not_used() {
        let (_source, fetcher) = setup();
        let d = days();
        fetcher
            .cache()
            .put(MetricKind::Sleep, 70, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());

        let report = fetcher.fetch(MetricKind::Sleep, &token(), d).await;
        assert!(!report.reading.available());
    }

    #[tokio::test]
    async fn zero_results_never_overwrite_cache() {
        let (source, fetcher) = setup();
        let d = days();
        fetcher.cache().put(MetricKind::Sleep, 70, d.yesterday);
        source.respond(
            Endpoint::DailySleep,
            d.today,
            vec![json!({"day": "2025-06-10", "score": 0})],
        );

        fetcher.fetch(MetricKind::Sleep, &token(), d).await;
        assert_eq!(fetcher.cache().get(MetricKind::Sleep).unwrap().score, 70);
    }

    #[tokio::test]
    async fn activity_uses_lookback_range() {
        let (source, fetcher) = setup();
        let d = days();
        source.respond(
            Endpoint::DailyActivity,
            d.today,
            vec![
                json!({"day": "2025-06-08", "score": 50}),
                json!({"day": "2025-06-10", "score": 66, "steps": 7000}),
            ],
        );

        let report = fetcher.fetch(MetricKind::Activity, &token(), d).await;
        assert_eq!(report.reading.score(), 66);

        let call = &source.calls()[0];
        assert_eq!(call.start_date, NaiveDate::from_ymd_opt(2025, 6, 7).unwrap());
        assert_eq!(call.end_date, d.today);
    }

    #[tokio::test]
    async fn activity_cache_may_be_older() {
        let (_source, fetcher) = setup();
        let d = days();
        fetcher
            .cache()
            .put(MetricKind::Activity, 61, NaiveDate::from_ymd_opt(2025, 6, 7).unwrap());

        let report = fetcher.fetch(MetricKind::Activity, &token(), d).await;
        assert_eq!(report.reading.score(), 61);
        assert_eq!(report.reading.source(), ReadingSource::Cache);
    }

    #[tokio::test]
    async fn heart_rate_picks_latest_sample() {
        let (source, fetcher) = setup();
        let d = days();
        source.respond(
            Endpoint::HeartRate,
            d.today,
            vec![
                json!({"bpm": 72, "timestamp": "2025-06-10T07:00:00+00:00"}),
                json!({"bpm": 56, "timestamp": "2025-06-10T09:30:00+00:00"}),
            ],
        );

        let report = fetcher.fetch(MetricKind::HeartRate, &token(), d).await;
        assert_eq!(report.reading.score(), 56);
        assert_eq!(report.reading.source(), ReadingSource::Today);
    }
}
