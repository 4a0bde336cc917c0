//! Time-boxed sample collection.
//!
//! A [`SampleWindow`] polls a source at a fixed cadence until its deadline and
//! yields each valid sample as it arrives. Failed polls are skipped without
//! ending the window. The cadence can depend on which provider answered last.

use crate::clock::{elapsed_between, to_chrono, CancelToken, Clock};
use crate::domain::MetricSample;
use crate::source::MetricSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Poll interval: a default plus per-provider overrides, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    pub default_ms: u64,
    #[serde(default)]
    pub per_source_ms: HashMap<String, u64>,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            default_ms: 3_000,
            per_source_ms: HashMap::new(),
        }
    }
}

impl Cadence {
    /// One interval for every provider.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            default_ms: interval.as_millis() as u64,
            per_source_ms: HashMap::new(),
        }
    }

    /// Override the interval for one provider tag.
    pub fn with_source(mut self, tag: impl Into<String>, interval: Duration) -> Self {
        self.per_source_ms.insert(tag.into(), interval.as_millis() as u64);
        self
    }

    /// Interval used before any provider has answered.
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_ms)
    }

    /// Interval for `tag`, falling back to the default.
    pub fn for_source(&self, tag: &str) -> Duration {
        Duration::from_millis(self.per_source_ms.get(tag).copied().unwrap_or(self.default_ms))
    }

    /// A zero interval would spin a virtual clock forever.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ms == 0 {
            return Err("cadence.default_ms must be > 0".into());
        }
        if let Some((tag, _)) = self.per_source_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(format!("cadence for source '{tag}' must be > 0"));
        }
        Ok(())
    }
}

/// Lazy iterator over samples polled until a deadline. Not restartable.
pub struct SampleWindow<'a> {
    source: &'a dyn MetricSource,
    identifier: &'a str,
    cadence: &'a Cadence,
    clock: &'a dyn Clock,
    cancel: &'a CancelToken,
    started: DateTime<Utc>,
    deadline: DateTime<Utc>,
    pending_delay: Option<Duration>,
    last_source: Option<String>,
    polls: usize,
    skipped: usize,
}

impl<'a> SampleWindow<'a> {
    /// Open a window of `duration` starting now. The first poll happens on the first `next()`.
    pub fn new(
        source: &'a dyn MetricSource,
        identifier: &'a str,
        duration: Duration,
        cadence: &'a Cadence,
        clock: &'a dyn Clock,
        cancel: &'a CancelToken,
    ) -> Self {
        let started = clock.now();
        Self {
            source,
            identifier,
            cadence,
            clock,
            cancel,
            started,
            deadline: started + to_chrono(duration),
            pending_delay: None,
            last_source: None,
            polls: 0,
            skipped: 0,
        }
    }

    /// Time since the window opened.
    pub fn elapsed(&self) -> Duration {
        elapsed_between(self.started, self.clock.now())
    }

    /// Polls attempted so far.
    pub fn polls(&self) -> usize {
        self.polls
    }

    /// Polls that produced nothing (unavailable or non-finite).
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn remaining(&self) -> Duration {
        elapsed_between(self.clock.now(), self.deadline)
    }

    /// Cadence of the provider that answered last, default before any answer.
    fn next_interval(&self) -> Duration {
        match &self.last_source {
            Some(tag) => self.cadence.for_source(tag),
            None => self.cadence.default_interval(),
        }
    }
}

impl Iterator for SampleWindow<'_> {
    type Item = MetricSample;

    fn next(&mut self) -> Option<MetricSample> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            if let Some(delay) = self.pending_delay.take() {
                let remaining = self.remaining();
                if remaining.is_zero() {
                    return None;
                }
                self.clock.sleep(delay.min(remaining), self.cancel);
                if self.cancel.is_cancelled() {
                    return None;
                }
            }

            if self.clock.now() >= self.deadline {
                return None;
            }

            self.polls += 1;
            match self.source.fetch(self.identifier) {
                Ok(sample) if sample.is_valid() => {
                    self.last_source = Some(sample.source.to_string());
                    self.pending_delay = Some(self.next_interval());
                    return Some(sample);
                }
                Ok(sample) => {
                    tracing::debug!(id = self.identifier, value = sample.value, "discarding non-finite sample");
                    self.skipped += 1;
                }
                Err(e) => {
                    tracing::debug!(id = self.identifier, error = %e, "poll unavailable");
                    self.skipped += 1;
                }
            }
            self.pending_delay = Some(self.next_interval());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::ProviderTag;
    use crate::source::SourceError;
    use std::sync::Mutex;

    /// Replays a script of values; `None` entries are failed polls. Repeats the last entry.
    struct Script {
        tag: &'static str,
        values: Mutex<Vec<Option<f64>>>,
    }

    impl Script {
        fn new(tag: &'static str, mut values: Vec<Option<f64>>) -> Self {
            values.reverse();
            Self {
                tag,
                values: Mutex::new(values),
            }
        }
    }

    impl MetricSource for Script {
        fn name(&self) -> &str {
            self.tag
        }

        fn fetch(&self, _identifier: &str) -> Result<MetricSample, SourceError> {
            let mut values = self.values.lock().unwrap();
            let next = if values.len() > 1 {
                values.pop().unwrap()
            } else {
                values.last().copied().flatten()
            };
            next.map(|v| MetricSample::new(v, ProviderTag::new(self.tag), Utc::now()))
                .ok_or(SourceError::NoProviders)
        }
    }

    #[test]
    fn polls_at_cadence_until_deadline() {
        let clock = ManualClock::new(Utc::now());
        let cancel = CancelToken::new();
        let cadence = Cadence::fixed(Duration::from_secs(1));
        let source = Script::new("a", vec![Some(1.0)]);
        let window = SampleWindow::new(&source, "X", Duration::from_secs(10), &cadence, &clock, &cancel);
        let samples: Vec<_> = window.collect();
        // polls at t = 0..=9
        assert_eq!(samples.len(), 10);
    }

    #[test]
    fn failed_and_invalid_polls_are_skipped() {
        let clock = ManualClock::new(Utc::now());
        let cancel = CancelToken::new();
        let cadence = Cadence::fixed(Duration::from_secs(1));
        let source = Script::new("a", vec![Some(1.0), None, Some(f64::NAN), Some(2.0), Some(3.0)]);
        let mut window = SampleWindow::new(&source, "X", Duration::from_secs(5), &cadence, &clock, &cancel);
        let values: Vec<f64> = window.by_ref().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(window.polls(), 5);
        assert_eq!(window.skipped(), 2);
    }

    #[test]
    fn cadence_depends_on_answering_source() {
        let clock = ManualClock::new(Utc::now());
        let cancel = CancelToken::new();
        let cadence = Cadence::fixed(Duration::from_secs(3)).with_source("fast", Duration::from_secs(1));
        let source = Script::new("fast", vec![Some(1.0)]);
        let window = SampleWindow::new(&source, "X", Duration::from_secs(6), &cadence, &clock, &cancel);
        assert_eq!(window.count(), 6);
    }

    #[test]
    fn failed_poll_keeps_last_answering_cadence() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let cancel = CancelToken::new();
        let cadence = Cadence::fixed(Duration::from_secs(3)).with_source("fast", Duration::from_secs(1));
        let source = Script::new("fast", vec![Some(1.0), None, Some(2.0)]);
        let window = SampleWindow::new(&source, "X", Duration::from_secs(6), &cadence, &clock, &cancel);
        // answers at t = 0, 2, 3, 4, 5; the failed poll at t = 1 waits 1 s, not 3 s
        let times: Vec<i64> = window.map(|_| (clock.now() - start).num_seconds()).collect();
        assert_eq!(times, vec![0, 2, 3, 4, 5]);
    }

    #[test]
    fn never_sleeps_past_deadline() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let cancel = CancelToken::new();
        let cadence = Cadence::fixed(Duration::from_secs(7));
        let source = Script::new("a", vec![Some(1.0)]);
        let window = SampleWindow::new(&source, "X", Duration::from_secs(10), &cadence, &clock, &cancel);
        assert_eq!(window.count(), 2);
        assert_eq!(elapsed_between(start, clock.now()), Duration::from_secs(10));
    }

    #[test]
    fn cancellation_ends_window() {
        let clock = ManualClock::new(Utc::now());
        let cancel = CancelToken::new();
        let cadence = Cadence::fixed(Duration::from_secs(1));
        let source = Script::new("a", vec![Some(1.0)]);
        let mut window = SampleWindow::new(&source, "X", Duration::from_secs(100), &cadence, &clock, &cancel);
        assert!(window.next().is_some());
        cancel.cancel();
        assert!(window.next().is_none());
    }

    #[test]
    fn zero_cadence_is_invalid() {
        assert!(Cadence::fixed(Duration::ZERO).validate().is_err());
        assert!(Cadence::default()
            .with_source("x", Duration::ZERO)
            .validate()
            .is_err());
        assert!(Cadence::default().validate().is_ok());
    }
}
