//! Secondary-signal checks shared by the early and watch triggers.

use crate::domain::MetricSample;
use crate::trend::{trend_direction, TrendDirection};

/// Reported volumes, in sample order, skipping samples without one.
pub fn volume_series(samples: &[MetricSample]) -> Vec<f64> {
    samples.iter().filter_map(|s| s.signals.volume).collect()
}

/// Reported holder counts, in sample order, skipping samples without one.
pub fn holder_series(samples: &[MetricSample]) -> Vec<f64> {
    samples.iter().filter_map(|s| s.signals.holders).collect()
}

/// Trend of every secondary signal the provider exposed in `samples`.
/// A signal never reported is not tracked.
pub fn tracked_trends(samples: &[MetricSample]) -> Vec<TrendDirection> {
    [volume_series(samples), holder_series(samples)]
        .into_iter()
        .filter(|series| !series.is_empty())
        .map(|series| trend_direction(&series))
        .collect()
}

/// Most recent reported volume.
pub fn latest_volume(samples: &[MetricSample]) -> Option<f64> {
    samples.iter().rev().find_map(|s| s.signals.volume)
}

/// A floor <= 0 is disabled. Otherwise the latest reported volume must reach it.
pub fn liquidity_holds(samples: &[MetricSample], floor: f64) -> bool {
    if floor <= 0.0 {
        return true;
    }
    latest_volume(samples).is_some_and(|v| v >= floor)
}

/// All tracked signals up (at least one tracked) and liquidity at or above `floor`.
pub fn momentum_confirmed(samples: &[MetricSample], floor: f64) -> bool {
    let trends = tracked_trends(samples);
    !trends.is_empty()
        && trends.iter().all(|t| *t == TrendDirection::Upward)
        && liquidity_holds(samples, floor)
}

/// No tracked secondary signal trending down. Untracked and flat signals pass.
pub fn secondary_not_falling(samples: &[MetricSample]) -> bool {
    tracked_trends(samples)
        .iter()
        .all(|t| *t != TrendDirection::Downward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProviderTag, SecondarySignals};
    use chrono::Utc;

    fn sample(volume: Option<f64>, holders: Option<f64>) -> MetricSample {
        MetricSample::new(1.0, ProviderTag::new("t"), Utc::now())
            .with_signals(SecondarySignals { volume, holders })
    }

    #[test]
    fn momentum_needs_every_tracked_signal_up() {
        let rising = vec![
            sample(Some(10_000.0), Some(100.0)),
            sample(Some(12_000.0), Some(110.0)),
            sample(Some(15_000.0), Some(130.0)),
        ];
        assert!(momentum_confirmed(&rising, 14_000.0));
        assert!(!momentum_confirmed(&rising, 20_000.0));

        let holders_falling = vec![
            sample(Some(10_000.0), Some(130.0)),
            sample(Some(12_000.0), Some(110.0)),
        ];
        assert!(!momentum_confirmed(&holders_falling, 0.0));
    }

    #[test]
    fn momentum_without_signals_is_not_confirmed() {
        let bare = vec![sample(None, None), sample(None, None)];
        assert!(!momentum_confirmed(&bare, 0.0));
    }

    #[test]
    fn liquidity_uses_latest_reported_volume() {
        let samples = vec![sample(Some(50_000.0), None), sample(None, None)];
        assert!(liquidity_holds(&samples, 40_000.0));
        assert!(!liquidity_holds(&[sample(None, None)], 1.0));
        assert!(liquidity_holds(&[sample(None, None)], 0.0));
    }

    #[test]
    fn flat_or_untracked_signals_are_not_falling() {
        assert!(secondary_not_falling(&[sample(None, None)]));
        assert!(secondary_not_falling(&[sample(Some(5.0), None), sample(Some(5.0), None)]));
        assert!(!secondary_not_falling(&[sample(Some(6.0), None), sample(Some(5.0), None)]));
    }
}
