//! Topscan - Kraken USD pair topping-pattern scanner
//!
//! Ranks USD spot pairs by how clearly they show descending highs across
//! monthly, daily and 4h candles.
//!
//! ```text
//! KrakenClient (CandleSource)
//!      │
//!      ▼
//! OhlcCache ── CSV files + ohlc_state.db
//!      │
//!      ▼
//! PatternDetector ─► volume_profile ─► PairScorer ─► report
//! ```

pub mod analysis;
pub mod cache;
pub mod config;
pub mod kraken;
pub mod report;
pub mod scan;
pub mod scoring;
pub mod source;
pub mod types;

pub use analysis::{PatternDetector, PatternResult, VolumeProfileResult};
pub use cache::{CacheError, CacheStore, OhlcCache};
pub use config::{ScanArgs, ScanConfig};
pub use scan::{ScanError, Scanner};
pub use scoring::{PairScorer, TimeframeOutcome};
pub use source::{CandleSource, OhlcBatch, SourceError};
pub use types::{Candle, CandleSeries, PairMeta, PairResult};
