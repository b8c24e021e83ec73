//! Volume profile over closing prices
//!
//! Volume-weighted histogram of closes with equal-width bins spanning the
//! close range. The point of control (POC) is the heaviest bin's midpoint;
//! the value area grows outward from it until it holds the target share of
//! total volume.

use serde::Serialize;

use crate::types::CandleSeries;

pub const DEFAULT_BINS: usize = 30;
pub const DEFAULT_VALUE_AREA: f64 = 0.7;

/// Profile summary; NaN prices mean "no profile" and serialize as null
#[derive(Debug, Clone, Serialize)]
pub struct VolumeProfileResult {
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub bin_edges: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl VolumeProfileResult {
    fn undefined(bin_edges: Vec<f64>, histogram: Vec<f64>) -> Self {
        Self {
            poc: f64::NAN,
            vah: f64::NAN,
            val: f64::NAN,
            bin_edges,
            histogram,
        }
    }

    pub fn is_defined(&self) -> bool {
        !self.poc.is_nan()
    }
}

/// `bins + 1` evenly spaced edges over `[lo, hi]`; a degenerate range is
/// widened by half a unit on each side
fn bin_edges(lo: f64, hi: f64, bins: usize) -> Vec<f64> {
    let (lo, hi) = if lo == hi { (lo - 0.5, hi + 0.5) } else { (lo, hi) };
    let width = (hi - lo) / bins as f64;
    (0..=bins)
        .map(|i| if i == bins { hi } else { lo + width * i as f64 })
        .collect()
}

/// Bin holding `price`; the last bin is closed on the right
fn bin_index(price: f64, edges: &[f64]) -> usize {
    let bins = edges.len() - 1;
    let (lo, hi) = (edges[0], edges[bins]);
    let mut idx = (((price - lo) / (hi - lo)) * bins as f64) as usize;
    idx = idx.min(bins - 1);

    // Correct float rounding against the actual edges
    if idx > 0 && price < edges[idx] {
        idx -= 1;
    } else if idx + 1 < bins && price >= edges[idx + 1] {
        idx += 1;
    }
    idx
}

fn value_area(histogram: &[f64], edges: &[f64], poc_idx: usize, target: f64) -> (f64, f64) {
    let total: f64 = histogram.iter().sum();
    let bins = histogram.len();
    let (mut lower, mut upper) = (poc_idx, poc_idx);
    let mut accumulated = histogram[poc_idx];

    while accumulated / total < target && (lower > 0 || upper + 1 < bins) {
        let left_vol = if lower > 0 { histogram[lower - 1] } else { -1.0 };
        let right_vol = if upper + 1 < bins { histogram[upper + 1] } else { -1.0 };

        if right_vol >= left_vol && upper + 1 < bins {
            upper += 1;
            accumulated += histogram[upper];
        } else if lower > 0 {
            lower -= 1;
            accumulated += histogram[lower];
        } else {
            break;
        }
    }

    (edges[upper + 1], edges[lower])
}

/// Volume profile of `series` using `bins` price bins and a value area
/// holding `target_value_area` of total volume
pub fn compute(series: &CandleSeries, bins: usize, target_value_area: f64) -> VolumeProfileResult {
    let points: Vec<(f64, f64)> = series
        .iter()
        .filter(|c| c.close.is_finite() && c.volume.is_finite())
        .map(|c| (c.close, c.volume))
        .collect();

    let total_volume: f64 = points.iter().map(|(_, v)| v).sum();
    if points.is_empty() || total_volume == 0.0 || bins == 0 {
        return VolumeProfileResult::undefined(Vec::new(), Vec::new());
    }

    let lo = points.iter().map(|(p, _)| *p).fold(f64::INFINITY, f64::min);
    let hi = points.iter().map(|(p, _)| *p).fold(f64::NEG_INFINITY, f64::max);
    let edges = bin_edges(lo, hi, bins);

    let mut histogram = vec![0.0; bins];
    for (price, volume) in &points {
        histogram[bin_index(*price, &edges)] += volume;
    }

    if histogram.iter().sum::<f64>() == 0.0 {
        return VolumeProfileResult::undefined(edges, histogram);
    }

    // First bin wins ties
    let mut poc_idx = 0;
    for (i, volume) in histogram.iter().enumerate() {
        if *volume > histogram[poc_idx] {
            poc_idx = i;
        }
    }

    let poc = (edges[poc_idx] + edges[poc_idx + 1]) / 2.0;
    let (vah, val) = value_area(&histogram, &edges, poc_idx, target_value_area);

    VolumeProfileResult {
        poc,
        vah,
        val,
        bin_edges: edges,
        histogram,
    }
}
