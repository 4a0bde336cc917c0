//! Trend and dip analysis over sample sequences.
//!
//! Pure functions: no I/O, no clock. Non-finite values are ignored everywhere.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Upward,
    Downward,
    /// No evidence of a trend (including fewer than two points).
    Flat,
}

/// Sign of the least-squares slope of `values` against their position index.
///
/// Fewer than two finite values is `Flat`, as is a slope of exactly zero.
pub fn trend_direction(values: &[f64]) -> TrendDirection {
    let points: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    match linear_slope(&points) {
        Some(slope) if slope > 0.0 => TrendDirection::Upward,
        Some(slope) if slope < 0.0 => TrendDirection::Downward,
        _ => TrendDirection::Flat,
    }
}

/// Least-squares slope of `y` against `x = 0, 1, 2, ...`. `None` for fewer than two points.
///
/// The numerator is summed over mirrored pairs `(y[n-1-i] - y[i])`, so a
/// constant series gives exactly zero and a monotone one keeps its sign at
/// any magnitude.
pub fn linear_slope(y: &[f64]) -> Option<f64> {
    let n = y.len();
    if n < 2 {
        return None;
    }
    let mut num = 0.0;
    for i in 0..n / 2 {
        let weight = (n - 1 - 2 * i) as f64 / 2.0;
        num += weight * (y[n - 1 - i] - y[i]);
    }
    let n_f = n as f64;
    let den = n_f * (n_f * n_f - 1.0) / 12.0;
    Some(num / den)
}

/// Percentage drop below `baseline` for every value strictly below it.
///
/// Values at or above baseline are excluded, not counted as zero.
pub fn dip_percentages(values: &[f64], baseline: f64) -> Vec<f64> {
    if !baseline.is_finite() || baseline <= 0.0 {
        return Vec::new();
    }
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v < baseline)
        .map(|v| (baseline - v) / baseline * 100.0)
        .collect()
}

/// Mean of `dips`, or `None` (no dip) when empty.
pub fn average_dip(dips: &[f64]) -> Option<f64> {
    if dips.is_empty() {
        None
    } else {
        Some(dips.iter().sum::<f64>() / dips.len() as f64)
    }
}
