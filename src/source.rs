//! Candle source interface
//!
//! The cache pulls raw history through this trait; the Kraken REST client
//! is the production implementation and tests plug in in-memory fakes.

use crate::types::Candle;

/// Failure while fetching candles from upstream
///
/// `Api` carries the exchange's own error list (the request reached the
/// exchange and was rejected); `Http` is a transport or status failure.
#[derive(Debug)]
pub enum SourceError {
    Http(reqwest::Error),
    Api(Vec<String>),
    Decode(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Http(err)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Http(e) => write!(f, "HTTP error: {}", e),
            SourceError::Api(errors) => write!(f, "API error: {}", errors.join("; ")),
            SourceError::Decode(msg) => write!(f, "Decode error: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// One page of candles plus the upstream's resume cursor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OhlcBatch {
    pub candles: Vec<Candle>,
    /// Epoch seconds the exchange suggests for the next `since`
    pub last: Option<i64>,
}

/// Pull-based candle provider
pub trait CandleSource {
    /// Fetch candles for `pair` at `interval_minutes`, starting after `since`
    /// (epoch seconds) when given, otherwise from the earliest available.
    fn get_candles(
        &self,
        pair: &str,
        interval_minutes: u32,
        since: Option<i64>,
    ) -> Result<OhlcBatch, SourceError>;
}

impl<T: CandleSource + ?Sized> CandleSource for &T {
    fn get_candles(
        &self,
        pair: &str,
        interval_minutes: u32,
        since: Option<i64>,
    ) -> Result<OhlcBatch, SourceError> {
        (**self).get_candles(pair, interval_minutes, since)
    }
}
