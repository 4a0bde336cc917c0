//! The decision engine: drives one WorkKey from baseline to a terminal outcome.

use super::signals::{liquidity_holds, momentum_confirmed, secondary_not_falling};
use super::state::WatchState;
use super::{AbandonReason, NotifyReason, Outcome, Phase, RunError};
use crate::clock::{elapsed_between, CancelToken, Clock};
use crate::domain::{MetricSample, WorkKey};
use crate::rules::{RuleSet, TargetBand};
use crate::source::MetricSource;
use crate::trend::{average_dip, dip_percentages, trend_direction, TrendDirection};
use crate::window::{Cadence, SampleWindow};
use std::sync::Arc;
use std::time::Duration;

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub key: WorkKey,
    pub outcome: Outcome,
    pub baseline: Option<f64>,
    pub average_dip_pct: Option<f64>,
    pub band: Option<TargetBand>,
    pub samples: usize,
    pub duration: Duration,
}

pub struct DecisionEngine {
    source: Arc<dyn MetricSource>,
    rules: RuleSet,
    cadence: Cadence,
    clock: Arc<dyn Clock>,
}

impl DecisionEngine {
    /// Create an engine over `source`, evaluating `rules` at `cadence` on `clock`.
    pub fn new(
        source: Arc<dyn MetricSource>,
        rules: RuleSet,
        cadence: Cadence,
        clock: Arc<dyn Clock>,
    ) -> Self {
        tracing::info!(
            rules = %rules.name,
            fingerprint = %rules.fingerprint(),
            source = source.name(),
            "decision engine ready"
        );
        Self {
            source,
            rules,
            cadence,
            clock,
        }
    }

    /// Run the state machine for `key` to a terminal outcome.
    ///
    /// Returns `Err(RunError::Cancelled)` if `cancel` fires first; nothing about
    /// a cancelled run should be persisted.
    pub fn run(&self, key: &WorkKey, cancel: &CancelToken) -> Result<RunReport, RunError> {
        let mut run = Run {
            engine: self,
            cancel,
            state: WatchState::new(key.clone(), self.clock.now()),
            average_dip_pct: None,
            band: None,
        };
        let outcome = run.drive()?;
        Ok(run.finish(outcome))
    }
}

/// One in-progress run. Lives on the worker's stack.
struct Run<'a> {
    engine: &'a DecisionEngine,
    cancel: &'a CancelToken,
    state: WatchState,
    average_dip_pct: Option<f64>,
    band: Option<TargetBand>,
}

impl Run<'_> {
    fn id(&self) -> &str {
        self.state.key().identifier().as_str()
    }

    fn enter(&mut self, phase: Phase) -> Result<(), RunError> {
        self.checkpoint()?;
        self.state.enter(phase);
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled {
                phase: self.state.phase(),
            });
        }
        Ok(())
    }

    fn window(&self, duration: Duration) -> SampleWindow<'_> {
        SampleWindow::new(
            self.engine.source.as_ref(),
            self.state.key().identifier().as_str(),
            duration,
            &self.engine.cadence,
            self.engine.clock.as_ref(),
            self.cancel,
        )
    }

    /// Poll for `duration`, recording every sample into the run state.
    fn sample_for(&mut self, duration: Duration) -> Result<(), RunError> {
        let samples: Vec<MetricSample> = self.window(duration).collect();
        self.checkpoint()?;
        for sample in samples {
            self.state.record(sample);
        }
        Ok(())
    }

    fn drive(&mut self) -> Result<Outcome, RunError> {
        let engine = self.engine;
        let rules = &engine.rules;

        // BaselineCapture
        self.enter(Phase::BaselineCapture)?;
        let baseline = match engine.source.fetch(self.id()) {
            Ok(sample) if sample.is_valid() => sample,
            Ok(sample) => {
                tracing::info!(id = self.id(), value = sample.value, "baseline not finite");
                return Ok(Outcome::Abandoned(AbandonReason::SourceUnavailable));
            }
            Err(e) => {
                tracing::info!(id = self.id(), error = %e, "baseline unavailable");
                return Ok(Outcome::Abandoned(AbandonReason::SourceUnavailable));
            }
        };
        let baseline_value = baseline.value;
        tracing::info!(
            id = self.id(),
            baseline = baseline_value,
            source = %baseline.source,
            "baseline captured"
        );

        let created_at = baseline.created_at;
        self.state.set_baseline(baseline);

        if let (Some(max_age), Some(created_at)) = (rules.max_entity_age(), created_at) {
            let age = elapsed_between(created_at, engine.clock.now());
            if age > max_age {
                return Ok(Outcome::Abandoned(AbandonReason::Stale {
                    age_secs: age.as_secs(),
                }));
            }
        }

        let reference = self.state.key().reference();

        if rules.notify_at_or_below_reference && baseline_value <= reference {
            return Ok(Outcome::Notified(NotifyReason::AtOrBelowReference));
        }

        // EarlyWindow: trigger evaluated once, after the window closes.
        self.enter(Phase::EarlyWindow)?;
        let early_started = engine.clock.now();
        self.sample_for(rules.early_window())?;
        if momentum_confirmed(self.state.samples(), rules.early_liquidity_floor) {
            return Ok(Outcome::Notified(NotifyReason::EarlyMomentum));
        }

        // DipAnalysis: extend to the full dip window, measured from the early window start.
        self.enter(Phase::DipAnalysis)?;
        let spent = elapsed_between(early_started, engine.clock.now());
        self.sample_for(rules.dip_window().saturating_sub(spent))?;

        let dips = dip_percentages(&self.state.primary_values(), baseline_value);
        let Some(average) = average_dip(&dips) else {
            return Ok(Outcome::Abandoned(AbandonReason::NoDip));
        };
        self.average_dip_pct = Some(average);
        if average < rules.min_average_dip_pct {
            return Ok(Outcome::Abandoned(AbandonReason::InsignificantDip {
                average_pct: average,
            }));
        }
        let band = rules.target_band(baseline_value, average);
        self.band = Some(band);
        tracing::info!(
            id = self.id(),
            average_dip_pct = average,
            target = band.target,
            lower = band.lower,
            upper = band.upper,
            "target band computed"
        );

        // TargetWatch
        self.enter(Phase::TargetWatch)?;
        let identifier = self.id().to_string();
        let mut window = SampleWindow::new(
            engine.source.as_ref(),
            &identifier,
            rules.target_timeout(),
            &engine.cadence,
            engine.clock.as_ref(),
            self.cancel,
        );
        while let Some(sample) = window.next() {
            self.state.record(sample);
            if let Some(reason) = watch_trigger(self.state.phase_samples(), window.elapsed(), &band, rules) {
                return Ok(Outcome::Notified(reason));
            }
        }
        self.checkpoint()?;
        Ok(Outcome::Abandoned(AbandonReason::Timeout))
    }

    fn finish(mut self, outcome: Outcome) -> RunReport {
        let now = self.engine.clock.now();
        self.state.enter(outcome.phase());
        let report = RunReport {
            key: self.state.key().clone(),
            outcome,
            baseline: self.state.baseline().map(|s| s.value),
            average_dip_pct: self.average_dip_pct,
            band: self.band,
            samples: self.state.samples().len(),
            duration: self.state.run_duration(now),
        };
        tracing::info!(
            key = %report.key,
            outcome = ?report.outcome,
            samples = report.samples,
            duration_secs = report.duration.as_secs(),
            "run finished"
        );
        report
    }
}

/// Evaluate the target-watch triggers over the samples watched so far.
fn watch_trigger(
    watched: &[MetricSample],
    elapsed: Duration,
    band: &TargetBand,
    rules: &RuleSet,
) -> Option<NotifyReason> {
    let latest = watched.last()?;
    let secondary_ok = secondary_not_falling(watched);

    if elapsed <= rules.retrigger_window() && secondary_ok {
        let primary: Vec<f64> = watched.iter().map(|s| s.value).collect();
        if trend_direction(&primary) == TrendDirection::Upward
            && liquidity_holds(watched, rules.retrigger_liquidity_floor)
        {
            return Some(NotifyReason::Rebound);
        }
    }

    if band.contains(latest.value)
        && secondary_ok
        && liquidity_holds(watched, rules.target_liquidity_floor)
    {
        return Some(NotifyReason::TargetReached);
    }

    None
}
