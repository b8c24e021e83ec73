//! Calendar resampling of cached candles
//!
//! Buckets are aggregated the usual OHLCV way:
//! - Open: first bar's open
//! - High / Low: max / min across the bucket
//! - Close: last bar's close
//! - VWAP: mean of the bucket's vwaps
//! - Volume, trade count: summed
//!
//! NaN inputs are skipped per column; a bucket left with no value in any
//! price column is dropped.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use std::collections::BTreeMap;

use crate::config::ResampleRule;
use crate::types::{Candle, CandleSeries};

/// Last calendar day of `time`'s month at midnight UTC
pub fn month_end_label(time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if time.month() == 12 {
        (time.year() + 1, 1)
    } else {
        (time.year(), time.month() + 1)
    };
    let next_month = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
    Some(next_month - Duration::days(1))
}

fn bucket_label(rule: ResampleRule, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match rule {
        ResampleRule::MonthEnd => month_end_label(time),
    }
}

fn aggregate(label: DateTime<Utc>, bars: &[Candle]) -> Option<Candle> {
    let open = bars.iter().map(|c| c.open).find(|v| !v.is_nan())?;
    let close = bars.iter().rev().map(|c| c.close).find(|v| !v.is_nan())?;
    let high = bars.iter().map(|c| c.high).fold(f64::NAN, f64::max);
    let low = bars.iter().map(|c| c.low).fold(f64::NAN, f64::min);

    let vwaps: Vec<f64> = bars.iter().map(|c| c.vwap).filter(|v| !v.is_nan()).collect();
    if vwaps.is_empty() || high.is_nan() || low.is_nan() {
        return None;
    }
    let vwap = vwaps.iter().sum::<f64>() / vwaps.len() as f64;

    Some(Candle {
        time: label,
        open,
        high,
        low,
        close,
        vwap,
        volume: bars.iter().map(|c| c.volume).filter(|v| !v.is_nan()).sum(),
        count: bars.iter().map(|c| c.count).sum(),
    })
}

/// Collapse a base-interval series into coarser buckets
pub fn resample(series: &CandleSeries, rule: ResampleRule) -> CandleSeries {
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<Candle>> = BTreeMap::new();
    for candle in series.iter() {
        match bucket_label(rule, candle.time) {
            Some(label) => buckets.entry(label).or_default().push(*candle),
            None => log::warn!("⚠️  No bucket for candle at {}", candle.time),
        }
    }

    let candles: Vec<Candle> = buckets
        .iter()
        .filter_map(|(label, bars)| aggregate(*label, bars))
        .collect();

    CandleSeries::new(candles)
}
