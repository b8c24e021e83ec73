//! Statistical descent detector
//!
//! Scores how consistently successive swing highs step down:
//!
//! ```text
//! base    = descending_steps / total_steps
//! penalty = min(max_break_pct * 0.5, 0.5)
//! score   = max(base - penalty, 0)      halved when the peak trend is not falling
//! passed  = score >= 0.5 && descending_steps >= 2
//! ```

use super::stats::{linear_slope, local_maxima};
use super::{PatternDetector, PatternResult};
use crate::config::DescentConfig;
use crate::types::{Candle, CandleSeries};

pub struct StatisticalDescent {
    config: DescentConfig,
}

impl StatisticalDescent {
    pub fn new(config: DescentConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for StatisticalDescent {
    fn detect(&self, series: &CandleSeries, timeframe: &str, _pair: &str) -> PatternResult {
        let (min_peaks, order) = self.config.params_for(timeframe);
        detect_lower_highs(series, min_peaks, order)
    }

    fn name(&self) -> &'static str {
        "descent"
    }
}

/// Score the descending-highs structure of `series`
pub fn detect_lower_highs(series: &CandleSeries, min_peaks: usize, order: usize) -> PatternResult {
    if series.is_empty() {
        return PatternResult::rejected("no data", Vec::new());
    }
    if series.len() < (min_peaks * order).max(5) {
        return PatternResult::rejected("insufficient candles", Vec::new());
    }

    let peaks: Vec<Candle> = local_maxima(&series.highs(), order)
        .into_iter()
        .map(|i| series[i])
        .collect();
    if peaks.len() < min_peaks.max(1) {
        return PatternResult::rejected("not enough peaks", peaks);
    }

    let peak_highs: Vec<f64> = peaks.iter().map(|c| c.high).collect();
    let total_steps = peak_highs.len() - 1;
    let mut descending_steps = 0;
    let mut violations = 0;
    let mut max_break_pct: f64 = 0.0;

    for step in peak_highs.windows(2) {
        let (prev, next) = (step[0], step[1]);
        if next < prev {
            descending_steps += 1;
        } else {
            violations += 1;
            if prev > 0.0 {
                max_break_pct = max_break_pct.max((next - prev) / prev);
            }
        }
    }

    let base_score = if total_steps > 0 {
        descending_steps as f64 / total_steps as f64
    } else {
        0.0
    };
    let penalty = (max_break_pct * 0.5).min(0.5);
    let mut score = (base_score - penalty).max(0.0);

    let slope = linear_slope(&peak_highs);
    if slope >= 0.0 {
        score *= 0.5;
    }

    let passed = score >= 0.5 && descending_steps >= 2;
    log::debug!(
        "📉 {} peaks, {}/{} descending, score {:.3}",
        peak_highs.len(),
        descending_steps,
        total_steps,
        score
    );

    PatternResult {
        passed,
        slope,
        window: peaks,
        score,
        violations,
        max_break_pct,
        reason: if passed { None } else { Some("weak descent".to_string()) },
    }
}
