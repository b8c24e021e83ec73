//! Trend-average indicators
//!
//! The `compute_indicators` binary derives EMA and return columns from the
//! cached closes and stores them as `<pair>_<tf>_indicators.csv`; the
//! windowed-rules detector reads them back through `IndicatorSource`.

use chrono::{DateTime, Datelike, Duration, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::cache::CacheError;
use crate::types::CandleSeries;

/// Exponential moving average, seeded with the first price
///
/// `alpha = 2 / (window + 1)`. Values are withheld until `window`
/// observations have been seen.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: f64,
    window: usize,
    count: usize,
}

impl Ema {
    pub fn new(window: usize) -> Self {
        Self {
            alpha: 2.0 / (window as f64 + 1.0),
            value: 0.0,
            window,
            count: 0,
        }
    }

    /// Feed one price; `Some` once warm
    pub fn update(&mut self, price: f64) -> Option<f64> {
        if self.count == 0 {
            self.value = price;
        } else {
            self.value = self.alpha * price + (1.0 - self.alpha) * self.value;
        }
        self.count += 1;

        if self.is_warm() {
            Some(self.value)
        } else {
            None
        }
    }

    pub fn is_warm(&self) -> bool {
        self.count >= self.window
    }
}

/// EMA windows computed per timeframe
pub fn ema_windows(timeframe: &str) -> &'static [usize] {
    match timeframe {
        "monthly" => &[5, 12],
        "daily" => &[5, 30, 50, 200],
        "4h" => &[5, 7],
        _ => &[],
    }
}

/// Time-indexed table of optional values keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorFrame {
    pub times: Vec<DateTime<Utc>>,
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl IndicatorFrame {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Non-missing values of `column` (optionally only rows at or after
    /// `since`), oldest first; `None` when the column is absent
    pub fn values(&self, column: &str, since: Option<DateTime<Utc>>) -> Option<Vec<f64>> {
        let cells = self.columns.get(column)?;
        Some(
            self.times
                .iter()
                .zip(cells)
                .filter(|(time, _)| since.map_or(true, |cutoff| **time >= cutoff))
                .filter_map(|(_, cell)| cell.filter(|v| !v.is_nan()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Provider of precomputed indicator tables
pub trait IndicatorSource {
    /// `None` when nothing usable is stored for (pair, timeframe)
    fn load_indicators(&self, pair: &str, timeframe: &str) -> Option<IndicatorFrame>;
}

fn pct_change(start: Option<f64>, end: f64) -> Option<f64> {
    match start {
        Some(start) if start != 0.0 && start.is_finite() => Some((end - start) / start),
        _ => None,
    }
}

/// Build the indicator table for one cached series
///
/// Every timeframe gets `close` plus its EMA windows; daily also gets
/// YTD / 30d / 7d returns measured to the latest close, repeated on each row.
pub fn compute_indicator_frame(series: &CandleSeries, timeframe: &str) -> IndicatorFrame {
    let times: Vec<DateTime<Utc>> = series.iter().map(|c| c.time).collect();
    let closes = series.closes();

    let mut columns = BTreeMap::new();
    columns.insert(
        "close".to_string(),
        closes.iter().map(|&c| Some(c).filter(|v| !v.is_nan())).collect(),
    );

    for &window in ema_windows(timeframe) {
        let mut ema = Ema::new(window);
        let values = closes.iter().map(|&close| ema.update(close)).collect();
        columns.insert(format!("ema_{}", window), values);
    }

    if timeframe == "daily" {
        let valid: Vec<(DateTime<Utc>, f64)> = times
            .iter()
            .copied()
            .zip(closes.iter().copied())
            .filter(|(_, close)| !close.is_nan())
            .collect();

        if let Some(&(latest_time, latest_close)) = valid.last() {
            let first_close_since = |cutoff: DateTime<Utc>| {
                valid.iter().find(|(time, _)| *time >= cutoff).map(|(_, close)| *close)
            };
            let ytd_start = valid
                .iter()
                .find(|(time, _)| time.year() == latest_time.year())
                .map(|(_, close)| *close);

            let returns = [
                ("return_ytd", pct_change(ytd_start, latest_close)),
                ("return_30d", pct_change(first_close_since(latest_time - Duration::days(30)), latest_close)),
                ("return_7d", pct_change(first_close_since(latest_time - Duration::days(7)), latest_close)),
            ];
            for (name, value) in returns {
                columns.insert(name.to_string(), vec![value; times.len()]);
            }
        }
    }

    IndicatorFrame { times, columns }
}

/// Indicator files on disk
pub struct IndicatorStore {
    dir: PathBuf,
}

impl IndicatorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, pair: &str, timeframe: &str) -> PathBuf {
        self.dir.join(format!("{}_{}_indicators.csv", pair, timeframe))
    }

    /// Atomically replace the indicator file for (pair, timeframe)
    pub fn write(&self, pair: &str, timeframe: &str, frame: &IndicatorFrame) -> Result<PathBuf, CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(pair, timeframe);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;

        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            let mut header = vec!["time".to_string()];
            header.extend(frame.columns.keys().cloned());
            writer.write_record(&header)?;

            for (row, time) in frame.times.iter().enumerate() {
                let mut record = vec![time.to_rfc3339_opts(SecondsFormat::Secs, true)];
                for cells in frame.columns.values() {
                    record.push(match cells.get(row).copied().flatten() {
                        Some(value) => value.to_string(),
                        None => String::new(),
                    });
                }
                writer.write_record(&record)?;
            }
            writer.flush()?;
        }
        tmp.as_file_mut().flush()?;

        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        Ok(path)
    }

    /// Parse an indicator file; empty and `NaN` cells are missing values
    pub fn read(&self, path: &Path) -> Result<IndicatorFrame, CacheError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        if headers.get(0) != Some("time") {
            return Err(CacheError::Corrupt(format!("{} has no leading time column", path.display())));
        }
        let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut times = Vec::new();
        let mut cells: Vec<Vec<Option<f64>>> = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record?;
            let raw_time = record.get(0).unwrap_or("");
            let time = DateTime::parse_from_rfc3339(raw_time)
                .map_err(|e| CacheError::Corrupt(format!("{}: bad time '{}': {}", path.display(), raw_time, e)))?
                .with_timezone(&Utc);
            times.push(time);

            for (col, column) in cells.iter_mut().enumerate() {
                let raw = record.get(col + 1).unwrap_or("").trim();
                let value = if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
                    None
                } else {
                    Some(raw.parse::<f64>().map_err(|_| {
                        CacheError::Corrupt(format!("{}: bad value '{}' in {}", path.display(), raw, names[col]))
                    })?)
                };
                column.push(value);
            }
        }

        Ok(IndicatorFrame {
            times,
            columns: names.into_iter().zip(cells).collect(),
        })
    }
}

impl IndicatorSource for IndicatorStore {
    fn load_indicators(&self, pair: &str, timeframe: &str) -> Option<IndicatorFrame> {
        let path = self.path(pair, timeframe);
        if !path.exists() {
            return None;
        }
        match self.read(&path) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!("⚠️  Ignoring unreadable indicators {}: {}", path.display(), e);
                None
            }
        }
    }
}
