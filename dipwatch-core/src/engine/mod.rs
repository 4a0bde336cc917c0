//! Per-WorkKey decision state machine.
//!
//! BaselineCapture → EarlyWindow → DipAnalysis → TargetWatch → {Notified | Abandoned}.
//! Phases run strictly in order. Terminal outcomes are business results, not
//! errors: the only error is cooperative cancellation, which leaves nothing to
//! persist.

pub mod decision;
pub mod signals;
pub mod state;

pub use decision::{DecisionEngine, RunReport};
pub use state::WatchState;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Admitted,
    BaselineCapture,
    EarlyWindow,
    DipAnalysis,
    TargetWatch,
    Notified,
    Abandoned,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Admitted => "admitted",
            Phase::BaselineCapture => "baseline_capture",
            Phase::EarlyWindow => "early_window",
            Phase::DipAnalysis => "dip_analysis",
            Phase::TargetWatch => "target_watch",
            Phase::Notified => "notified",
            Phase::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotifyReason {
    /// Baseline already at or below the reference value.
    AtOrBelowReference,
    /// Every secondary signal trended up across the early window, above the liquidity floor.
    EarlyMomentum,
    /// Primary metric turned upward early in the target watch.
    Rebound,
    /// Primary metric entered the target band.
    TargetReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbandonReason {
    /// Baseline fetch failed on every provider.
    SourceUnavailable,
    /// Entity older than the staleness threshold.
    Stale { age_secs: u64 },
    /// No sample fell below baseline.
    NoDip,
    InsignificantDip { average_pct: f64 },
    /// Target watch expired without a trigger.
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Notified(NotifyReason),
    Abandoned(AbandonReason),
}

impl Outcome {
    /// True for any `Notified` outcome.
    pub fn is_notified(&self) -> bool {
        matches!(self, Outcome::Notified(_))
    }

    /// Terminal phase this outcome ends in.
    pub fn phase(&self) -> Phase {
        match self {
            Outcome::Notified(_) => Phase::Notified,
            Outcome::Abandoned(_) => Phase::Abandoned,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("run cancelled during {phase}")]
    Cancelled { phase: Phase },
}
