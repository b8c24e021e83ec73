//! OHLC cache with TTL fast path and incremental merge
//!
//! ```text
//! fetch(pair, tf)
//!   ├─ fresh file (mtime < TTL)? ──────────────► return cached series
//!   ├─ since = max(now - history, last_ts - interval)
//!   ├─ CandleSource::get_candles(since)
//!   ├─ merge(existing, incoming)   dedup on time, incoming wins
//!   ├─ resample (monthly)          base series kept in <pair>_<tf>.base.csv
//!   └─ atomic write + cursor upsert ──────────► return series
//! ```
//!
//! Upstream failures fall back to whatever the cache already holds; only a
//! pair with no usable cache surfaces `CacheError::Upstream`.

pub mod resample;
pub mod store;

use chrono::{DateTime, Duration, Utc};

use crate::config::{TimeframeConfig, TimeframeTable};
use crate::source::{CandleSource, SourceError};
use crate::types::{Candle, CandleSeries};
pub use store::{CacheStore, CursorRow};

#[derive(Debug)]
pub enum CacheError {
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    Database(rusqlite::Error),
    Corrupt(String),
    Upstream(SourceError),
    UnknownTimeframe(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err)
    }
}

impl From<csv::Error> for CacheError {
    fn from(err: csv::Error) -> Self {
        CacheError::Csv(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Json(err)
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Database(err)
    }
}

impl From<SourceError> for CacheError {
    fn from(err: SourceError) -> Self {
        CacheError::Upstream(err)
    }
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "IO error: {}", e),
            CacheError::Csv(e) => write!(f, "CSV error: {}", e),
            CacheError::Json(e) => write!(f, "JSON error: {}", e),
            CacheError::Database(e) => write!(f, "Database error: {}", e),
            CacheError::Corrupt(msg) => write!(f, "Corrupt cache: {}", msg),
            CacheError::Upstream(e) => write!(f, "Upstream error with no usable cache: {}", e),
            CacheError::UnknownTimeframe(tf) => write!(f, "Unknown timeframe: {}", tf),
        }
    }
}

impl std::error::Error for CacheError {}

/// Concatenate cached and freshly fetched candles, dedup by time, sort
///
/// On a timestamp collision the incoming candle replaces the cached one.
pub fn merge_series(existing: &CandleSeries, incoming: Vec<Candle>) -> CandleSeries {
    CandleSeries::from_unsorted(existing.iter().copied().chain(incoming))
}

/// Earliest timestamp to request, or `None` for full history
pub fn since_cursor(config: &TimeframeConfig, existing: Option<&CandleSeries>, now: DateTime<Utc>) -> Option<i64> {
    let horizon = config
        .history_days
        .map(|days| (now - Duration::days(i64::from(days))).timestamp());
    let resume = existing
        .and_then(CandleSeries::last_time)
        .map(|last| last.timestamp() - config.interval_secs());

    match (horizon, resume) {
        (Some(h), Some(r)) => Some(h.max(r)),
        (h, r) => h.or(r),
    }
}

pub struct OhlcCache<S> {
    store: CacheStore,
    source: S,
    timeframes: TimeframeTable,
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl<S: CandleSource> OhlcCache<S> {
    pub fn new(store: CacheStore, source: S, timeframes: TimeframeTable) -> Self {
        Self::new_with_clock_fn(store, source, timeframes, Box::new(Utc::now))
    }

    /// Construct with a custom clock (for deterministic testing)
    pub fn new_with_clock_fn(
        store: CacheStore,
        source: S,
        timeframes: TimeframeTable,
        now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        Self {
            store,
            source,
            timeframes,
            now_fn,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn timeframes(&self) -> &TimeframeTable {
        &self.timeframes
    }

    /// Return the candle series for (pair, timeframe), refreshing from
    /// upstream when the cache is stale, missing or `force_refresh` is set
    pub fn fetch(&self, pair: &str, timeframe: &str, force_refresh: bool) -> Result<CandleSeries, CacheError> {
        let config = self
            .timeframes
            .get(timeframe)
            .ok_or_else(|| CacheError::UnknownTimeframe(timeframe.to_string()))?;
        let now = (self.now_fn)();
        let served_path = self.store.series_path(pair, timeframe);

        if !force_refresh && self.store.is_fresh(&served_path, config.cache_ttl, now) {
            match self.store.read_series(&served_path) {
                Ok(Some(series)) => {
                    log::debug!("📦 Cache hit {} {} ({} candles)", pair, timeframe, series.len());
                    return Ok(series);
                }
                Ok(None) => {}
                Err(e) => log::warn!("⚠️  Unreadable cache for {} {}, refetching: {}", pair, timeframe, e),
            }
        }

        let merge_path = match config.resample {
            Some(_) => self.store.base_path(pair, timeframe),
            None => served_path.clone(),
        };
        let existing = match self.store.read_series(&merge_path) {
            Ok(series) => series,
            Err(e) => {
                log::warn!("⚠️  Discarding corrupt cache for {} {}: {}", pair, timeframe, e);
                None
            }
        };

        let since = since_cursor(config, existing.as_ref(), now);
        let batch = match self.source.get_candles(pair, config.interval_minutes, since) {
            Ok(batch) => batch,
            Err(err) => return self.fall_back(pair, timeframe, config, existing, err),
        };
        log::debug!(
            "🌐 Fetched {} candles for {} {} (since {:?})",
            batch.candles.len(),
            pair,
            timeframe,
            since
        );

        let merged = match &existing {
            Some(old) => merge_series(old, batch.candles),
            None => CandleSeries::from_unsorted(batch.candles),
        };

        let served = match config.resample {
            Some(rule) => {
                self.store.write_series(&merge_path, &merged)?;
                resample::resample(&merged, rule)
            }
            None => merged.clone(),
        };
        self.store.write_series(&served_path, &served)?;

        if let Some(last) = merged.last_time() {
            if let Err(e) = self.store.record_cursor(pair, timeframe, last.timestamp(), now.timestamp()) {
                log::warn!("⚠️  Failed to record cursor for {} {}: {}", pair, timeframe, e);
            }
        }

        Ok(served)
    }

    fn fall_back(
        &self,
        pair: &str,
        timeframe: &str,
        config: &TimeframeConfig,
        existing: Option<CandleSeries>,
        err: SourceError,
    ) -> Result<CandleSeries, CacheError> {
        let served_path = self.store.series_path(pair, timeframe);
        let stale = match self.store.read_series(&served_path) {
            Ok(Some(series)) => Some(series),
            _ => existing.map(|base| match config.resample {
                Some(rule) => resample::resample(&base, rule),
                None => base,
            }),
        };

        match stale {
            Some(series) => {
                log::warn!("⚠️  Upstream failed for {} {}, serving cached data: {}", pair, timeframe, err);
                Ok(series)
            }
            None => Err(CacheError::Upstream(err)),
        }
    }
}
