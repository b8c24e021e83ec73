//! Windowed-high rules detector
//!
//! Binary detector: a timeframe passes only when its recent highs do not
//! exceed the earlier highs in the lookback window AND the timeframe's
//! trend-average(s) are falling.
//!
//! | timeframe | highs rule                              | trend rule(s)                     |
//! |-----------|-----------------------------------------|-----------------------------------|
//! | monthly   | last high <= previous high              | ema_12 over 12 periods            |
//! | daily     | max(last 7d) <= max(rest of last 30d)   | ema_50 over 50, plus ema_200 over 200 when available |
//! | 4h        | max(last 12 bars) <= max(rest of 7d)    | ema_7 over 7 within the 7d window, 0.2% tolerance |
//!
//! Missing indicator data fails the timeframe.

use chrono::{DateTime, Duration, Utc};

use super::indicators::{IndicatorFrame, IndicatorSource};
use super::stats::linear_slope;
use super::{PatternDetector, PatternResult};
use crate::config::{TrendRule, WindowedRulesConfig};
use crate::types::{Candle, CandleSeries};

pub struct WindowedRules {
    indicators: Box<dyn IndicatorSource>,
    config: WindowedRulesConfig,
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

/// Check that `rule.column` fell over `rule.lag` periods
///
/// Compares the latest non-missing value with the one `lag` values earlier;
/// the recent value may sit up to `tolerance` above it.
pub fn trend_descending(
    frame: Option<&IndicatorFrame>,
    rule: &TrendRule,
    since: Option<DateTime<Utc>>,
) -> Result<(), String> {
    let values = frame
        .and_then(|f| f.values(&rule.column, since))
        .ok_or_else(|| format!("missing {}", rule.column))?;

    if values.len() <= rule.lag {
        return Err(format!("insufficient {}", rule.column));
    }

    let past = values[values.len() - 1 - rule.lag];
    let recent = values[values.len() - 1];
    if recent < past * (1.0 + rule.tolerance) {
        Ok(())
    } else {
        Err(format!("{} not descending", rule.column))
    }
}

fn max_high(candles: &[Candle]) -> f64 {
    candles.iter().map(|c| c.high).fold(f64::NAN, f64::max)
}

/// Recent highs must not exceed the baseline highs
fn highs_hold(recent: &[Candle], baseline: &[Candle]) -> bool {
    max_high(recent) <= max_high(baseline)
}

fn decide(window: &[Candle], highs_pass: bool, trend: Result<(), String>, highs_reason: &str) -> PatternResult {
    let passed = highs_pass && trend.is_ok();
    // A trend failure is reported ahead of the highs rule
    let reason = match (passed, trend) {
        (true, _) => None,
        (false, Err(trend_reason)) => Some(trend_reason),
        (false, Ok(())) => Some(highs_reason.to_string()),
    };
    let highs: Vec<f64> = window.iter().map(|c| c.high).collect();

    PatternResult {
        passed,
        slope: linear_slope(&highs),
        window: window.to_vec(),
        score: if passed { 1.0 } else { 0.0 },
        violations: if passed { 0 } else { 1 },
        max_break_pct: 0.0,
        reason,
    }
}

impl WindowedRules {
    pub fn new(indicators: Box<dyn IndicatorSource>, config: WindowedRulesConfig) -> Self {
        Self::new_with_clock_fn(indicators, config, Box::new(Utc::now))
    }

    /// Construct with a custom clock (for deterministic testing)
    pub fn new_with_clock_fn(
        indicators: Box<dyn IndicatorSource>,
        config: WindowedRulesConfig,
        now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        Self {
            indicators,
            config,
            now_fn,
        }
    }

    fn monthly(&self, series: &CandleSeries, frame: Option<&IndicatorFrame>) -> PatternResult {
        if series.len() < self.config.months_lookback.max(2) {
            return PatternResult::rejected("insufficient months", Vec::new());
        }

        let window = series.tail(self.config.months_lookback.max(2));
        let (prev, last) = (&window[window.len() - 2], &window[window.len() - 1]);
        let highs_pass = last.high <= prev.high;
        let trend = trend_descending(frame, &self.config.monthly_trend, None);

        decide(window, highs_pass, trend, "current high > previous high")
    }

    fn daily(&self, series: &CandleSeries, frame: Option<&IndicatorFrame>) -> PatternResult {
        let now = (self.now_fn)();
        let window = series.since(now - Duration::days(self.config.daily_lookback_days));
        if window.is_empty() {
            return PatternResult::rejected("no recent data", Vec::new());
        }

        let recent_cut = now - Duration::days(self.config.daily_recent_days);
        let split = window.partition_point(|c| c.time < recent_cut);
        let (baseline, recent) = window.split_at(split);
        if baseline.is_empty() || recent.is_empty() {
            return PatternResult::rejected("not enough split", window.to_vec());
        }

        let highs_pass = highs_hold(recent, baseline);
        let medium = trend_descending(frame, &self.config.daily_medium_trend, None);
        let long_rule = &self.config.daily_long_trend;
        let long_ready = frame
            .and_then(|f| f.values(&long_rule.column, None))
            .map_or(false, |values| values.len() > long_rule.lag);

        let trend = if long_ready {
            trend_descending(frame, long_rule, None).and(medium)
        } else {
            medium
        };

        decide(window, highs_pass, trend, "recent high > prior window")
    }

    fn four_hour(&self, series: &CandleSeries, frame: Option<&IndicatorFrame>) -> PatternResult {
        let cutoff = (self.now_fn)() - Duration::days(self.config.h4_lookback_days);
        let window = series.since(cutoff);
        if window.is_empty() {
            return PatternResult::rejected("no recent data", Vec::new());
        }

        let recent_bars = self.config.h4_recent_bars;
        if window.len() <= recent_bars {
            return PatternResult::rejected("not enough bars", window.to_vec());
        }

        let (baseline, recent) = window.split_at(window.len() - recent_bars);
        let highs_pass = highs_hold(recent, baseline);
        let trend = trend_descending(frame, &self.config.h4_trend, Some(cutoff));

        decide(window, highs_pass, trend, "recent high > prior bars")
    }
}

impl PatternDetector for WindowedRules {
    fn detect(&self, series: &CandleSeries, timeframe: &str, pair: &str) -> PatternResult {
        if series.is_empty() {
            return PatternResult::rejected("no data", Vec::new());
        }

        let frame = self.indicators.load_indicators(pair, timeframe);
        if frame.is_none() {
            log::debug!("📭 No indicators for {} {}", pair, timeframe);
        }

        match timeframe {
            "monthly" => self.monthly(series, frame.as_ref()),
            "daily" => self.daily(series, frame.as_ref()),
            "4h" => self.four_hour(series, frame.as_ref()),
            _ => PatternResult::rejected("unsupported timeframe", Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "windowed"
    }
}
