//! On-disk cache files and the incremental-fetch state database
//!
//! Layout under the data directory:
//!
//! ```text
//! cache/<pair>_<tf>.csv        series served to callers
//! cache/<pair>_<tf>.base.csv   merged base-interval candles (resampled timeframes only)
//! cache/asset_info.json        exchange metadata snapshots (--refresh-metadata)
//! cache/asset_pairs.json
//! ohlc_state.db                ohlc_state(pair, timeframe, last_ts, updated_at)
//! ```
//!
//! Series and metadata files are replaced atomically: rows go to a temp file in the
//! same directory which is then renamed over the target.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use super::CacheError;
use crate::types::{Candle, CandleSeries};

const CANDLE_COLUMNS: [&str; 8] = ["time", "open", "high", "low", "close", "vwap", "volume", "count"];

/// Incremental-fetch cursor for one (pair, timeframe)
#[derive(Debug, Clone, PartialEq)]
pub struct CursorRow {
    pub pair: String,
    pub timeframe: String,
    pub last_ts: i64,
    pub updated_at: i64,
}

pub struct CacheStore {
    cache_dir: PathBuf,
    conn: Connection,
}

impl CacheStore {
    pub fn open(cache_dir: impl Into<PathBuf>, db_path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path.as_ref())?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ohlc_state (
                pair TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                last_ts INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (pair, timeframe)
            )",
            [],
        )?;

        log::debug!("✅ Cache store ready at {}", cache_dir.display());

        Ok(Self { cache_dir, conn })
    }

    pub fn series_path(&self, pair: &str, timeframe: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_{}.csv", pair, timeframe))
    }

    pub fn base_path(&self, pair: &str, timeframe: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_{}.base.csv", pair, timeframe))
    }

    /// True when `path` exists and was modified less than `ttl` before `now`
    ///
    /// A modification time ahead of `now` counts as age zero.
    pub fn is_fresh(&self, path: &Path, ttl: Duration, now: DateTime<Utc>) -> bool {
        let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => return false,
        };

        match (now - modified).to_std() {
            Ok(age) => age < ttl,
            Err(_) => !ttl.is_zero(),
        }
    }

    /// Load a series file; `Ok(None)` when it does not exist
    pub fn read_series(&self, path: &Path) -> Result<Option<CandleSeries>, CacheError> {
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        if headers.iter().ne(CANDLE_COLUMNS.iter().copied()) {
            return Err(CacheError::Corrupt(format!(
                "{} has unexpected columns {:?}",
                path.display(),
                headers
            )));
        }

        let mut candles = Vec::new();
        for (line, row) in reader.deserialize::<Candle>().enumerate() {
            let candle = row.map_err(|e| {
                CacheError::Corrupt(format!("{} row {}: {}", path.display(), line + 1, e))
            })?;
            candles.push(candle);
        }

        Ok(Some(CandleSeries::from_unsorted(candles)))
    }

    /// Replace `path` with `series`; the header is written even when empty
    pub fn write_series(&self, path: &Path, series: &CandleSeries) -> Result<(), CacheError> {
        let dir = path.parent().unwrap_or(&self.cache_dir);
        let mut tmp = NamedTempFile::new_in(dir)?;

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            writer.write_record(CANDLE_COLUMNS)?;
            for candle in series.iter() {
                writer.serialize(candle)?;
            }
            writer.flush()?;
        }
        tmp.as_file_mut().flush()?;

        tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    /// `cache/<name>.json`
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    /// Replace `path` with `value` as pretty-printed JSON
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), CacheError> {
        let dir = path.parent().unwrap_or(&self.cache_dir);
        let mut tmp = NamedTempFile::new_in(dir)?;

        serde_json::to_writer_pretty(tmp.as_file_mut(), value)?;
        tmp.as_file_mut().write_all(b"\n")?;
        tmp.as_file_mut().flush()?;

        tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    /// Upsert the cursor row for (pair, timeframe)
    pub fn record_cursor(&self, pair: &str, timeframe: &str, last_ts: i64, updated_at: i64) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT INTO ohlc_state (pair, timeframe, last_ts, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(pair, timeframe) DO UPDATE SET
                last_ts = excluded.last_ts,
                updated_at = excluded.updated_at",
            params![pair, timeframe, last_ts, updated_at],
        )?;
        Ok(())
    }

    pub fn cursor(&self, pair: &str, timeframe: &str) -> Result<Option<i64>, CacheError> {
        let last_ts = self
            .conn
            .query_row(
                "SELECT last_ts FROM ohlc_state WHERE pair = ?1 AND timeframe = ?2",
                params![pair, timeframe],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last_ts)
    }

    /// All cursors ordered by pair then timeframe
    pub fn cursors(&self) -> Result<Vec<CursorRow>, CacheError> {
        let mut stmt = self.conn.prepare(
            "SELECT pair, timeframe, last_ts, updated_at FROM ohlc_state ORDER BY pair, timeframe",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CursorRow {
                pair: row.get(0)?,
                timeframe: row.get(1)?,
                last_ts: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;

        let mut cursors = Vec::new();
        for row in rows {
            cursors.push(row?);
        }
        Ok(cursors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> CacheStore {
        CacheStore::open(dir.join("cache"), dir.join("ohlc_state.db")).unwrap()
    }

    fn sample_series() -> CandleSeries {
        CandleSeries::new(
            (1..=3)
                .map(|d| {
                    let time = Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap();
                    Candle::bar(time, 1.0, 2.0 + d as f64, 0.5, 1.5, 10.0 * d as f64)
                })
                .collect(),
        )
    }

    #[test]
    fn test_write_then_read_series() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.series_path("BONKUSD", "daily");

        store.write_series(&path, &sample_series()).unwrap();
        let loaded = store.read_series(&path).unwrap().unwrap();

        assert_eq!(loaded, sample_series());
        assert!(path.ends_with("BONKUSD_daily.csv"));
    }

    #[test]
    fn test_empty_series_keeps_header() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.series_path("JTOUSD", "4h");

        store.write_series(&path, &CandleSeries::empty()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), "time,open,high,low,close,vwap,volume,count");
        assert!(store.read_series(&path).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.series_path("WIFUSD", "daily");

        assert!(store.read_series(&path).unwrap().is_none());

        std::fs::write(&path, "time,open,high,low,close,vwap,volume,count\nyesterday,a,b,c,d,e,f,g\n").unwrap();
        assert!(matches!(store.read_series(&path), Err(CacheError::Corrupt(_))));

        std::fs::write(&path, "something else entirely\n").unwrap();
        assert!(matches!(store.read_series(&path), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn test_freshness_uses_mtime() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.series_path("SOLUSD", "daily");
        let ttl = Duration::from_secs(3600);

        assert!(!store.is_fresh(&path, ttl, Utc::now()));

        store.write_series(&path, &sample_series()).unwrap();
        assert!(store.is_fresh(&path, ttl, Utc::now()));
        assert!(!store.is_fresh(&path, ttl, Utc::now() + chrono::Duration::hours(2)));
    }

    #[test]
    fn test_write_json_replaces_file() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.metadata_path("asset_info");

        std::fs::write(&path, "stale").unwrap();
        let listing: std::collections::BTreeMap<&str, u32> = [("XXBT", 10), ("ZUSD", 4)].into();
        store.write_json(&path, &listing).unwrap();

        assert!(path.ends_with("cache/asset_info.json"));
        let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["XXBT"], 10);
        assert_eq!(parsed["ZUSD"], 4);
    }

    #[test]
    fn test_cursor_upsert() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        assert_eq!(store.cursor("BONKUSD", "daily").unwrap(), None);

        store.record_cursor("BONKUSD", "daily", 100, 1).unwrap();
        store.record_cursor("BONKUSD", "daily", 200, 2).unwrap();
        store.record_cursor("BONKUSD", "4h", 50, 2).unwrap();

        assert_eq!(store.cursor("BONKUSD", "daily").unwrap(), Some(200));

        let cursors = store.cursors().unwrap();
        assert_eq!(cursors.len(), 2);
        assert_eq!(cursors[0].timeframe, "4h");
        assert_eq!(cursors[1].last_ts, 200);
        assert_eq!(cursors[1].updated_at, 2);
    }
}
