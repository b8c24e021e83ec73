//! Core data model shared by the cache, detectors and scorer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;

use crate::scoring::TimeframeOutcome;

/// One OHLCV bar for a fixed interval
///
/// Field names double as the cache file column names:
/// `time, open, high, low, close, vwap, volume, count`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub vwap: f64,
    pub volume: f64,
    pub count: u64,
}

impl Candle {
    /// Convenience constructor for synthetic bars; vwap defaults to close.
    pub fn bar(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            vwap: close,
            volume,
            count: 1,
        }
    }
}

/// Ordered candle history for one (pair, timeframe)
///
/// Timestamps are ascending and unique. Consumers get their own copy;
/// nothing downstream mutates the cache's view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Wrap candles that are already sorted and unique
    pub fn new(candles: Vec<Candle>) -> Self {
        debug_assert!(candles.windows(2).all(|w| w[0].time < w[1].time));
        Self { candles }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Sort ascending and drop duplicate timestamps; later entries win
    pub fn from_unsorted(candles: impl IntoIterator<Item = Candle>) -> Self {
        let by_time: BTreeMap<DateTime<Utc>, Candle> =
            candles.into_iter().map(|c| (c.time, c)).collect();
        Self {
            candles: by_time.into_values().collect(),
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.candles.first().map(|c| c.time)
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.candles.last().map(|c| c.time)
    }

    /// Candles with `time >= cutoff`
    pub fn since(&self, cutoff: DateTime<Utc>) -> &[Candle] {
        let start = self.candles.partition_point(|c| c.time < cutoff);
        &self.candles[start..]
    }

    /// Last `n` candles (all of them when shorter)
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }
}

impl Deref for CandleSeries {
    type Target = [Candle];

    fn deref(&self) -> &Self::Target {
        &self.candles
    }
}

impl From<Vec<Candle>> for CandleSeries {
    fn from(candles: Vec<Candle>) -> Self {
        Self::from_unsorted(candles)
    }
}

/// Tradable USD pair as discovered from the exchange listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairMeta {
    pub altname: String,
    pub wsname: String,
    pub base: String,
    pub quote: String,
    pub is_solana: bool,
}

/// Scan output for one pair; built once and handed to reporting
#[derive(Debug, Clone)]
pub struct PairResult {
    pub pair: String,
    pub wsname: String,
    pub score: f64,
    pub is_solana: bool,
    pub outcomes: Vec<TimeframeOutcome>,
    pub frames: BTreeMap<String, CandleSeries>,
}

impl PairResult {
    pub fn outcome(&self, timeframe: &str) -> Option<&TimeframeOutcome> {
        self.outcomes.iter().find(|o| o.name == timeframe)
    }
}
