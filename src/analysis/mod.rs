//! Topping-pattern analysis
//!
//! # Architecture
//!
//! ```text
//! CandleSeries ──► PatternDetector (StatisticalDescent | WindowedRules) ──► PatternResult
//!      │                                  ▲
//!      │                                  └── IndicatorSource (ema_* columns)
//!      └─────────► volume_profile::compute ─────────────────────► VolumeProfileResult
//! ```
//!
//! The detector variant is chosen once from configuration and handed to the
//! scanner as a boxed strategy; both variants report through `PatternResult`.

pub mod descent;
pub mod indicators;
pub mod stats;
pub mod volume_profile;
pub mod windowed;

use serde::Serialize;

use crate::config::{DetectorKind, ScanConfig};
use crate::types::{Candle, CandleSeries};
pub use descent::{detect_lower_highs, StatisticalDescent};
pub use indicators::{IndicatorFrame, IndicatorSource, IndicatorStore};
pub use volume_profile::VolumeProfileResult;
pub use windowed::WindowedRules;

/// Outcome of one detector run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternResult {
    pub passed: bool,
    /// Least-squares trend of the highs the decision looked at
    pub slope: f64,
    /// Candles the decision was made on (peaks for the descent detector)
    #[serde(skip)]
    pub window: Vec<Candle>,
    /// 0.0..=1.0
    pub score: f64,
    pub violations: usize,
    pub max_break_pct: f64,
    /// Diagnostic, set whenever `passed` is false
    pub reason: Option<String>,
}

impl PatternResult {
    /// Failed result with zero score
    pub fn rejected(reason: impl Into<String>, window: Vec<Candle>) -> Self {
        Self {
            passed: false,
            slope: 0.0,
            window,
            score: 0.0,
            violations: 0,
            max_break_pct: 0.0,
            reason: Some(reason.into()),
        }
    }
}

/// Pattern detection strategy
pub trait PatternDetector {
    fn detect(&self, series: &CandleSeries, timeframe: &str, pair: &str) -> PatternResult;

    fn name(&self) -> &'static str;
}

/// Build the configured detector variant
pub fn build_detector(config: &ScanConfig, indicators: Box<dyn IndicatorSource>) -> Box<dyn PatternDetector> {
    match config.detector {
        DetectorKind::StatisticalDescent => Box::new(StatisticalDescent::new(config.descent.clone())),
        DetectorKind::WindowedRules => Box::new(WindowedRules::new(indicators, config.windowed.clone())),
    }
}
