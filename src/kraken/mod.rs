//! Kraken public REST boundary
//!
//! Blocking client for the two public endpoints the scanner needs:
//!
//! ```text
//! AssetPairs  →  AssetPairInfo  →  pairs::discover_usd_pairs  →  PairMeta
//! OHLC        →  RawCandle      →  Candle (via CandleSource)   →  OhlcCache
//! ```
//!
//! Every request goes through the shared `Throttle`, so callers never pace
//! themselves. Transport failures (timeouts, refused connections) are
//! retried with exponential backoff; API-level errors are returned as-is.

pub mod pairs;
pub mod throttle;

use chrono::{TimeZone, Utc};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::ScanConfig;
use crate::source::{CandleSource, OhlcBatch, SourceError};
use crate::types::Candle;
use throttle::{ExponentialBackoff, Throttle};

const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// `{ "error": [...], "result": ... }` wrapper every public endpoint returns
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, SourceError> {
        if !self.error.is_empty() {
            return Err(SourceError::Api(self.error));
        }
        self.result
            .ok_or_else(|| SourceError::Decode("response carries no result".to_string()))
    }
}

/// One OHLC row: `[time, open, high, low, close, vwap, volume, count]`
///
/// Prices and volume arrive as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCandle(
    pub i64,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub u64,
);

fn parse_decimal(field: &str, raw: &str) -> Result<f64, SourceError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| SourceError::Decode(format!("{} '{}' is not a number", field, raw)))
}

impl TryFrom<RawCandle> for Candle {
    type Error = SourceError;

    fn try_from(raw: RawCandle) -> Result<Self, Self::Error> {
        let time = Utc
            .timestamp_opt(raw.0, 0)
            .single()
            .ok_or_else(|| SourceError::Decode(format!("timestamp {} out of range", raw.0)))?;

        Ok(Candle {
            time,
            open: parse_decimal("open", &raw.1)?,
            high: parse_decimal("high", &raw.2)?,
            low: parse_decimal("low", &raw.3)?,
            close: parse_decimal("close", &raw.4)?,
            vwap: parse_decimal("vwap", &raw.5)?,
            volume: parse_decimal("volume", &raw.6)?,
            count: raw.7,
        })
    }
}

/// Subset of the AssetPairs listing the pair filter looks at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetPairInfo {
    #[serde(default)]
    pub altname: String,
    #[serde(default)]
    pub wsname: Option<String>,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub quote: String,
    #[serde(default)]
    pub aclass_base: Option<String>,
}

/// One entry of the Assets listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    #[serde(default)]
    pub aclass: String,
    #[serde(default)]
    pub altname: String,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default)]
    pub display_decimals: u32,
    #[serde(default)]
    pub status: Option<String>,
}

/// Decode an OHLC `result` object
///
/// The candle array sits under a pair key that Kraken picks (often not the
/// altname that was requested), next to the `last` resume cursor.
pub fn parse_ohlc_result(result: Map<String, Value>) -> Result<OhlcBatch, SourceError> {
    let last = result.get("last").and_then(Value::as_i64);

    let rows = result
        .into_iter()
        .find(|(key, _)| key != "last")
        .map(|(_, rows)| rows)
        .ok_or_else(|| SourceError::Decode("OHLC response has no pair data".to_string()))?;

    let rows: Vec<RawCandle> = serde_json::from_value(rows)?;
    let candles = rows
        .into_iter()
        .map(Candle::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OhlcBatch { candles, last })
}

fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, SourceError> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;
    envelope.into_result()
}

pub struct KrakenClient {
    base_url: String,
    http: Client,
    throttle: Throttle,
    max_retries: u32,
}

impl KrakenClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        min_interval: Duration,
        max_retries: u32,
    ) -> Result<Self, SourceError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            throttle: Throttle::new(min_interval),
            max_retries,
        })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self, SourceError> {
        Self::new(
            &config.kraken_base_url,
            config.http_timeout,
            config.min_call_interval,
            config.http_max_retries,
        )
    }

    fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, String)]) -> Result<T, SourceError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut backoff = ExponentialBackoff::new(RETRY_INITIAL_DELAY, RETRY_MAX_DELAY, self.max_retries);

        loop {
            self.throttle.wait();
            log::debug!("🌐 GET {} {:?}", url, params);

            match self.http.get(&url).query(params).send() {
                Ok(response) => {
                    let body = response.error_for_status()?.text()?;
                    return decode_envelope(&body);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    log::warn!("⚠️  {} request failed: {}", endpoint, e);
                    if backoff.sleep().is_err() {
                        return Err(SourceError::Http(e));
                    }
                }
                Err(e) => return Err(SourceError::Http(e)),
            }
        }
    }

    /// Full Assets listing keyed by Kraken's internal asset code
    pub fn get_assets(&self) -> Result<BTreeMap<String, AssetInfo>, SourceError> {
        self.get("Assets", &[])
    }

    /// Full AssetPairs listing keyed by Kraken's internal pair name
    pub fn get_asset_pairs(&self) -> Result<BTreeMap<String, AssetPairInfo>, SourceError> {
        self.get("AssetPairs", &[])
    }

    pub fn get_ohlc(&self, pair: &str, interval_minutes: u32, since: Option<i64>) -> Result<OhlcBatch, SourceError> {
        let mut params = vec![("pair", pair.to_string()), ("interval", interval_minutes.to_string())];
        if let Some(since) = since {
            params.push(("since", since.to_string()));
        }

        let result: Map<String, Value> = self.get("OHLC", &params)?;
        parse_ohlc_result(result)
    }
}

impl CandleSource for KrakenClient {
    fn get_candles(&self, pair: &str, interval_minutes: u32, since: Option<i64>) -> Result<OhlcBatch, SourceError> {
        self.get_ohlc(pair, interval_minutes, since)
    }
}
