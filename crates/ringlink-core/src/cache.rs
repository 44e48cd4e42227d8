//! Score cache
//!
//! Last known-good score per metric, stamped with the day it was observed.
//! The whole cache is one JSON document in the store:
//!
//! ```json
//! {"sleep": {"score": 72, "observed_date": "2025-06-09"},
//!  "readiness": {"score": 84, "observed_date": "2025-06-10"}}
//! ```
//!
//! Writes are read-merge-write against the persisted document so an entry
//! this process cannot parse is carried over untouched.

use chrono::NaiveDate;
use ringlink_api::MetricKind;
use ringlink_store::{keys, Store, StoreResult};
use ringlink_util::{days_before, parse_day};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Flat document written by older releases: one date for everything
const LEGACY_SLEEP: &str = "sleep_score";
const LEGACY_READINESS: &str = "readiness_score";
const LEGACY_DATE: &str = "cache_date";

/// One cached score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub score: i64,
    pub observed_date: NaiveDate,
}

impl CacheEntry {
    /// Usable for `today` if observed no more than `max_age_days` ago (and not in the future)
    pub fn is_fresh(&self, today: NaiveDate, max_age_days: u32) -> bool {
        self.observed_date <= today && self.observed_date >= days_before(today, max_age_days)
    }
}

/// Persistent last-known-good score per metric
pub struct ScoreCache {
    store: Arc<dyn Store>,
    entries: Mutex<HashMap<MetricKind, CacheEntry>>,
}

impl ScoreCache {
    /// Load the cache document. Never fails: unreadable parts are skipped.
    pub fn load(store: Arc<dyn Store>) -> Self {
        let entries = match store.get(keys::SCORE_CACHE) {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(doc)) => parse_document(&doc),
                Ok(_) | Err(_) => {
                    warn!("Score cache document is unreadable, starting empty");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read score cache, starting empty");
                HashMap::new()
            }
        };

        info!(entries = entries.len(), "Score cache loaded");

        Self {
            store,
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<MetricKind, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, kind: MetricKind) -> Option<CacheEntry> {
        self.entries().get(&kind).copied()
    }

    /// Entry for `kind` if it is fresh enough to stand in on `today`
    pub fn get_fresh(
        &self,
        kind: MetricKind,
        today: NaiveDate,
        max_age_days: u32,
    ) -> Option<CacheEntry> {
        self.get(kind)
            .filter(|entry| entry.is_fresh(today, max_age_days))
    }

    /// Record a fetched score. Scores `<= 0` are ignored; anything else
    /// replaces the previous entry. Returns whether the cache changed.
    pub fn put(&self, kind: MetricKind, score: i64, observed_date: NaiveDate) -> bool {
        if score <= 0 {
            debug!(kind = %kind, score, "Not caching non-positive score");
            return false;
        }

        let entry = CacheEntry {
            score,
            observed_date,
        };

        // Held across the store round-trip so concurrent puts for different
        // kinds cannot lose each other's update
        let mut entries = self.entries();
        entries.insert(kind, entry);

        if let Err(e) = self.persist(&entries, kind, entry) {
            warn!(kind = %kind, error = %e, "Failed to persist score cache");
        } else {
            debug!(kind = %kind, score, observed_date = %observed_date, "Score cached");
        }

        true
    }

    fn persist(
        &self,
        known: &HashMap<MetricKind, CacheEntry>,
        kind: MetricKind,
        entry: CacheEntry,
    ) -> StoreResult<()> {
        let mut doc = match self.store.get(keys::SCORE_CACHE)? {
            Some(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(doc)) => doc,
                _ => {
                    warn!("Rebuilding unreadable score cache document from memory");
                    document_from(known)?
                }
            },
            None => document_from(known)?,
        };

        migrate_legacy(&mut doc);
        doc.insert(kind.as_str().to_string(), serde_json::to_value(entry)?);

        let raw = serde_json::to_string(&Value::Object(doc))?;
        self.store.set(keys::SCORE_CACHE, &raw)
    }
}

/// Serialize every in-memory entry as a fresh document
fn document_from(
    entries: &HashMap<MetricKind, CacheEntry>,
) -> serde_json::Result<Map<String, Value>> {
    let mut doc = Map::new();
    for (kind, entry) in entries {
        doc.insert(kind.as_str().to_string(), serde_json::to_value(entry)?);
    }
    Ok(doc)
}

fn parse_document(doc: &Map<String, Value>) -> HashMap<MetricKind, CacheEntry> {
    let mut entries = HashMap::new();

    for kind in MetricKind::ALL {
        let Some(value) = doc.get(kind.as_str()) else {
            continue;
        };
        match serde_json::from_value::<CacheEntry>(value.clone()) {
            Ok(entry) if entry.score > 0 => {
                entries.insert(kind, entry);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(kind = %kind, error = %e, "Skipping unreadable cache entry");
            }
        }
    }

    for (kind, entry) in legacy_entries(doc) {
        entries.entry(kind).or_insert(entry);
    }

    entries
}

/// Entries carried by the old flat format
fn legacy_entries(doc: &Map<String, Value>) -> Vec<(MetricKind, CacheEntry)> {
    let Some(date) = doc
        .get(LEGACY_DATE)
        .and_then(Value::as_str)
        .and_then(parse_day)
    else {
        return Vec::new();
    };

    [
        (MetricKind::Sleep, LEGACY_SLEEP),
        (MetricKind::Readiness, LEGACY_READINESS),
    ]
    .into_iter()
    .filter_map(|(kind, key)| {
        let score = legacy_score(doc.get(key)?)?;
        (score > 0).then_some((
            kind,
            CacheEntry {
                score,
                observed_date: date,
            },
        ))
    })
    .collect()
}

/// Old releases stored scores as numbers or numeric strings
fn legacy_score(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Rewrite legacy fields as per-metric entries (existing entries win)
fn migrate_legacy(doc: &mut Map<String, Value>) {
    let legacy = legacy_entries(doc);
    let had_legacy = [LEGACY_SLEEP, LEGACY_READINESS, LEGACY_DATE]
        .iter()
        .any(|k| doc.contains_key(*k));
    if !had_legacy {
        return;
    }

    for (kind, entry) in legacy {
        if !doc.contains_key(kind.as_str())
            && let Ok(value) = serde_json::to_value(entry)
        {
            doc.insert(kind.as_str().to_string(), value);
        }
    }
    doc.remove(LEGACY_SLEEP);
    doc.remove(LEGACY_READINESS);
    doc.remove(LEGACY_DATE);
    info!("Migrated legacy score cache document");
}
