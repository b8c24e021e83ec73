//! Per-pair scan orchestration
//!
//! ```text
//! PairMeta ─► for each timeframe:
//!               OhlcCache::fetch ─► PatternDetector::detect
//!                                ─► volume_profile::compute
//!                                ─► PairScorer::score_timeframe
//!          ─► PairScorer::aggregate ─► PairResult
//! ```
//!
//! Pairs are processed one at a time. A pair that fails is logged and
//! left out of the results; the rest of the run continues.

use std::collections::BTreeMap;

use crate::analysis::{build_detector, volume_profile, IndicatorStore, PatternDetector};
use crate::cache::{CacheError, CacheStore, OhlcCache};
use crate::config::ScanConfig;
use crate::scoring::PairScorer;
use crate::source::CandleSource;
use crate::types::{PairMeta, PairResult};

#[derive(Debug)]
pub enum ScanError {
    Cache(CacheError),
    UnknownTimeframe(String),
}

impl From<CacheError> for ScanError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::UnknownTimeframe(tf) => ScanError::UnknownTimeframe(tf),
            other => ScanError::Cache(other),
        }
    }
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Cache(e) => write!(f, "{}", e),
            ScanError::UnknownTimeframe(tf) => write!(f, "Unknown timeframe: {}", tf),
        }
    }
}

impl std::error::Error for ScanError {}

pub struct Scanner<S> {
    cache: OhlcCache<S>,
    detector: Box<dyn PatternDetector>,
    scorer: PairScorer,
}

impl<S: CandleSource> Scanner<S> {
    pub fn new(cache: OhlcCache<S>, detector: Box<dyn PatternDetector>, scorer: PairScorer) -> Self {
        Self {
            cache,
            detector,
            scorer,
        }
    }

    /// Wire the cache, indicator files, detector and scorer from configuration
    pub fn from_config(config: &ScanConfig, source: S) -> Result<Self, CacheError> {
        let store = CacheStore::open(config.cache_dir(), config.state_db_path())?;
        let cache = OhlcCache::new(store, source, config.timeframes.clone());
        let detector = build_detector(config, Box::new(IndicatorStore::new(config.indicators_dir())));
        let scorer = PairScorer::new(config.timeframe_weights.clone(), config.sol_bonus);

        log::info!("🔍 Pattern detector: {}", detector.name());
        Ok(Self::new(cache, detector, scorer))
    }

    pub fn cache(&self) -> &OhlcCache<S> {
        &self.cache
    }

    /// Fetch, detect and score every requested timeframe of one pair
    pub fn analyze_pair(&self, pair: &PairMeta, timeframes: &[String], refresh: bool) -> Result<PairResult, ScanError> {
        let mut outcomes = Vec::with_capacity(timeframes.len());
        let mut frames = BTreeMap::new();

        for timeframe in timeframes {
            if !self.cache.timeframes().contains(timeframe) {
                return Err(ScanError::UnknownTimeframe(timeframe.clone()));
            }

            let series = self.cache.fetch(&pair.altname, timeframe, refresh)?;
            let pattern = self.detector.detect(&series, timeframe, &pair.altname);
            let profile = volume_profile::compute(
                &series,
                volume_profile::DEFAULT_BINS,
                volume_profile::DEFAULT_VALUE_AREA,
            );

            log::debug!(
                "   {} {}: passed={} score={:.3} reason={:?}",
                pair.altname,
                timeframe,
                pattern.passed,
                pattern.score,
                pattern.reason
            );

            outcomes.push(self.scorer.score_timeframe(timeframe, &series, pattern, profile));
            frames.insert(timeframe.clone(), series);
        }

        let score = self.scorer.aggregate(&outcomes, pair.is_solana);

        Ok(PairResult {
            pair: pair.altname.clone(),
            wsname: pair.wsname.clone(),
            score,
            is_solana: pair.is_solana,
            outcomes,
            frames,
        })
    }

    /// Analyze all pairs, skipping failures; results sorted by score, highest first
    pub fn run(&self, pairs: &[PairMeta], timeframes: &[String], refresh: bool) -> Vec<PairResult> {
        log::info!(
            "🚀 Evaluating {} USD pairs across {:?} (refresh={})",
            pairs.len(),
            timeframes,
            refresh
        );

        let mut results = Vec::with_capacity(pairs.len());
        let mut skipped = 0;

        for (i, pair) in pairs.iter().enumerate() {
            match self.analyze_pair(pair, timeframes, refresh) {
                Ok(result) => {
                    log::info!("📊 [{}/{}] {} score {:.3}", i + 1, pairs.len(), pair.wsname, result.score);
                    results.push(result);
                }
                Err(e) => {
                    skipped += 1;
                    log::warn!("⚠️  Skipping {} due to error: {}", pair.wsname, e);
                }
            }
        }

        sort_by_score(&mut results);
        log::info!("✅ Scan complete: {} scored, {} skipped", results.len(), skipped);
        results
    }
}

/// Highest score first; ties keep their input order
pub fn sort_by_score(results: &mut [PairResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}
