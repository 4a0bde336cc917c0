//! Replay provider: answers from a fixed script of readings.
//!
//! Used to exercise the engine and dispatcher without the network. Each fetch
//! consumes the next entry; once the script is exhausted the final entry repeats.
//! `None` entries are unavailable polls. Samples are stamped by the source's
//! clock, the wall clock unless [`ScriptedSource::with_clock`] says otherwise.

use super::{MetricSource, SourceError};
use crate::clock::{Clock, SystemClock};
use crate::domain::{MetricSample, ProviderTag, SecondarySignals};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub signals: SecondarySignals,
    pub created_at: Option<DateTime<Utc>>,
}

impl Reading {
    /// A reading with only the primary metric.
    pub fn value(value: f64) -> Self {
        Self {
            value,
            signals: SecondarySignals::default(),
            created_at: None,
        }
    }

    /// Attach a reported volume.
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.signals.volume = Some(volume);
        self
    }

    /// Attach a reported holder count.
    pub fn with_holders(mut self, holders: f64) -> Self {
        self.signals.holders = Some(holders);
        self
    }

    /// Attach an entity creation time.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

pub struct ScriptedSource {
    tag: ProviderTag,
    script: Vec<Option<Reading>>,
    calls: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl ScriptedSource {
    /// Replay `script` in order. `None` entries fail with HTTP 503.
    pub fn new(tag: impl Into<String>, script: Vec<Option<Reading>>) -> Self {
        Self {
            tag: ProviderTag::new(tag),
            script,
            calls: AtomicUsize::new(0),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp samples with `clock`, so a virtual clock sees consistent observation times.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Every poll succeeds, walking `values` and then holding the last one.
    pub fn values(tag: impl Into<String>, values: &[f64]) -> Self {
        Self::new(tag, values.iter().map(|v| Some(Reading::value(*v))).collect())
    }

    /// Every poll fails.
    pub fn unavailable(tag: impl Into<String>) -> Self {
        Self::new(tag, Vec::new())
    }

    /// Fetches made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetricSource for ScriptedSource {
    fn name(&self) -> &str {
        self.tag.as_str()
    }

    fn fetch(&self, _identifier: &str) -> Result<MetricSample, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let entry = match self.script.len() {
            0 => None,
            len => self.script[call.min(len - 1)],
        };
        match entry {
            Some(r) => Ok(MetricSample::new(r.value, self.tag.clone(), self.clock.now())
                .with_signals(r.signals)
                .with_created_at(r.created_at)),
            None => Err(SourceError::HttpStatus {
                provider: self.tag.to_string(),
                status: 503,
            }),
        }
    }
}
