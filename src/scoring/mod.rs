//! Per-timeframe and per-pair scoring
//!
//! Each timeframe blends the detector's pattern score with two volume
//! signals; the pair score is the weighted sum of those blends.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::analysis::{PatternResult, VolumeProfileResult};
use crate::types::CandleSeries;

const PATTERN_WEIGHT: f64 = 0.6;
const VOLUME_DECLINE_WEIGHT: f64 = 0.25;
const POC_WEIGHT: f64 = 0.15;

/// Everything computed for one timeframe of one pair
#[derive(Debug, Clone, Serialize)]
pub struct TimeframeOutcome {
    pub name: String,
    pub pattern: PatternResult,
    pub volume_profile: VolumeProfileResult,
    pub volume_decline_score: f64,
    pub poc_distance_score: f64,
}

impl TimeframeOutcome {
    pub fn passed(&self) -> bool {
        self.pattern.passed
    }

    /// `0.6 * pattern + 0.25 * volume decline + 0.15 * POC proximity`
    pub fn composite(&self) -> f64 {
        PATTERN_WEIGHT * self.pattern.score
            + VOLUME_DECLINE_WEIGHT * self.volume_decline_score
            + POC_WEIGHT * self.poc_distance_score
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// How far volume has faded from the first quarter to the last (0.0..=1.0)
///
/// Quarters are positional. Needs at least 10 candles.
pub fn volume_decline_score(series: &CandleSeries) -> f64 {
    if series.len() < 10 {
        return 0.0;
    }

    let volumes = series.volumes();
    let split = (volumes.len() / 4).max(1);
    let early = mean(&volumes[..split]);
    let recent = mean(&volumes[volumes.len() - split..]);

    if early.is_nan() || early <= 0.0 {
        return 0.0;
    }
    ((early - recent) / early).clamp(0.0, 1.0)
}

/// Proximity of the last close to the point of control (0.0..=1.0)
pub fn poc_distance_score(series: &CandleSeries, profile: &VolumeProfileResult) -> f64 {
    let last_close = match series.last() {
        Some(candle) => candle.close,
        None => return 0.0,
    };
    if profile.poc.is_nan() || last_close == 0.0 {
        return 0.0;
    }

    let distance = (last_close - profile.poc).abs() / last_close;
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Weights timeframe composites into a pair score
pub struct PairScorer {
    weights: BTreeMap<String, f64>,
    sol_bonus: f64,
}

impl PairScorer {
    pub fn new(weights: BTreeMap<String, f64>, sol_bonus: f64) -> Self {
        Self { weights, sol_bonus }
    }

    pub fn score_timeframe(
        &self,
        name: &str,
        series: &CandleSeries,
        pattern: PatternResult,
        profile: VolumeProfileResult,
    ) -> TimeframeOutcome {
        TimeframeOutcome {
            name: name.to_string(),
            volume_decline_score: volume_decline_score(series),
            poc_distance_score: poc_distance_score(series, &profile),
            pattern,
            volume_profile: profile,
        }
    }

    /// Weighted sum of composites plus the Solana bonus when flagged
    ///
    /// Timeframes without a configured weight contribute nothing.
    pub fn aggregate(&self, outcomes: &[TimeframeOutcome], is_solana: bool) -> f64 {
        let weighted: f64 = outcomes
            .iter()
            .map(|o| self.weights.get(&o.name).copied().unwrap_or(0.0) * o.composite())
            .sum();

        if is_solana {
            weighted + self.sol_bonus
        } else {
            weighted
        }
    }
}
