//! dipwatch core: domain types, metric sources, sampling, trend analysis and the
//! per-identifier decision state machine.
//!
//! This crate contains the monitoring engine:
//! - Domain types (identifiers, work keys, metric samples)
//! - Human-formatted metric parsing
//! - Metric sources with priority fallback and per-provider circuit breakers
//! - Time-boxed sample windows driven by an injectable clock
//! - Trend direction and dip analysis
//! - The decision engine: baseline → early window → dip analysis → target watch

pub mod clock;
pub mod domain;
pub mod engine;
pub mod metric;
pub mod rules;
pub mod source;
pub mod trend;
pub mod window;

pub use clock::{CancelToken, Clock, ManualClock, SystemClock};
pub use domain::{Identifier, MetricSample, ProviderTag, SecondarySignals, WorkKey};
pub use engine::{AbandonReason, DecisionEngine, NotifyReason, Outcome, Phase, RunError, RunReport};
pub use metric::{parse_metric, ParseError};
pub use rules::{RuleSet, TargetBand};
pub use source::{FallbackSource, HttpProvider, MetricSource, SourceError};
pub use trend::{average_dip, dip_percentages, trend_direction, TrendDirection};
pub use window::{Cadence, SampleWindow};
