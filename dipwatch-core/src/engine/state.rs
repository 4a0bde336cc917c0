use super::Phase;
use crate::clock::elapsed_between;
use crate::domain::{MetricSample, WorkKey};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Mutable record for one run of one WorkKey. Owned by the worker running it.
#[derive(Debug, Clone)]
pub struct WatchState {
    key: WorkKey,
    phase: Phase,
    run_started: DateTime<Utc>,
    baseline: Option<MetricSample>,
    samples: Vec<MetricSample>,
    phase_offset: usize,
}

impl WatchState {
    /// A fresh record in `Admitted`, with the run starting at `now`.
    pub fn new(key: WorkKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            phase: Phase::Admitted,
            run_started: now,
            baseline: None,
            samples: Vec::new(),
            phase_offset: 0,
        }
    }

    /// The key being watched.
    pub fn key(&self) -> &WorkKey {
        &self.key
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Time since the run started.
    pub fn run_duration(&self, now: DateTime<Utc>) -> Duration {
        elapsed_between(self.run_started, now)
    }

    /// Move to `phase`; samples recorded from here on form its phase sample set.
    pub fn enter(&mut self, phase: Phase) {
        tracing::info!(key = %self.key, from = %self.phase, to = %phase, "phase transition");
        self.phase = phase;
        self.phase_offset = self.samples.len();
    }

    /// The baseline is also the first sample of the run.
    pub fn set_baseline(&mut self, sample: MetricSample) {
        self.samples.push(sample.clone());
        self.baseline = Some(sample);
    }

    /// The baseline sample, once captured.
    pub fn baseline(&self) -> Option<&MetricSample> {
        self.baseline.as_ref()
    }

    /// Append a sample to the run and the current phase.
    pub fn record(&mut self, sample: MetricSample) {
        self.samples.push(sample);
    }

    /// Every sample of the run, baseline first.
    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Samples recorded since the current phase began.
    pub fn phase_samples(&self) -> &[MetricSample] {
        &self.samples[self.phase_offset..]
    }

    /// Primary metric of every sample, baseline first.
    pub fn primary_values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Identifier, ProviderTag};

    fn sample(v: f64) -> MetricSample {
        MetricSample::new(v, ProviderTag::new("t"), Utc::now())
    }

    #[test]
    fn phase_samples_reset_on_enter() {
        let now = Utc::now();
        let key = WorkKey::new(Identifier::new("X").unwrap(), 1.0);
        let mut state = WatchState::new(key, now);
        state.enter(Phase::BaselineCapture);
        state.set_baseline(sample(10.0));
        state.enter(Phase::EarlyWindow);
        state.record(sample(11.0));
        state.record(sample(12.0));
        assert_eq!(state.phase_samples().len(), 2);
        state.enter(Phase::TargetWatch);
        assert!(state.phase_samples().is_empty());
        state.record(sample(9.0));
        assert_eq!(state.phase_samples()[0].value, 9.0);
        assert_eq!(state.primary_values(), vec![10.0, 11.0, 12.0, 9.0]);
        assert_eq!(state.baseline().unwrap().value, 10.0);
    }
}
