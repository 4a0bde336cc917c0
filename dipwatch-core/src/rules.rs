//! Versioned decision rule set.
//!
//! Every threshold, duration and factor the decision engine uses lives here.
//! The historical engine variants differ only in these numbers, so a variant is
//! a named `RuleSet`, not a separate code path.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Human-readable variant name, logged with every run.
    pub name: String,

    /// Skip entities created longer ago than this. 0 disables the check.
    pub max_entity_age_secs: u64,

    /// Notify immediately if the baseline is already at or below the reference value.
    pub notify_at_or_below_reference: bool,

    /// Length of the short early-trigger window.
    pub early_window_secs: u64,

    /// Total sampling span for dip analysis, measured from the start of the early window.
    pub dip_window_secs: u64,

    /// How long to watch for the target band before giving up.
    pub target_timeout_secs: u64,

    /// Initial part of the target watch in which a rebound can trigger.
    pub retrigger_window_secs: u64,

    /// Minimum latest volume for the early trigger.
    pub early_liquidity_floor: f64,

    /// Minimum latest volume for the rebound trigger.
    pub retrigger_liquidity_floor: f64,

    /// Minimum latest volume for the target-band trigger.
    pub target_liquidity_floor: f64,

    /// Average dip (percent) below which the dip is not worth watching.
    pub min_average_dip_pct: f64,

    /// Scales how far below baseline the target sits, relative to the average dip.
    pub overshoot_factor: f64,

    pub band_lower_factor: f64,
    pub band_upper_factor: f64,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            name: "default".into(),
            max_entity_age_secs: 6 * 60 * 60,
            notify_at_or_below_reference: false,
            early_window_secs: 30,
            dip_window_secs: 120,
            target_timeout_secs: 15 * 60,
            retrigger_window_secs: 60,
            early_liquidity_floor: 10_000.0,
            retrigger_liquidity_floor: 10_000.0,
            target_liquidity_floor: 20_000.0,
            min_average_dip_pct: 5.0,
            overshoot_factor: 1.0,
            band_lower_factor: 0.95,
            band_upper_factor: 1.05,
        }
    }
}

/// Target value plus its tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetBand {
    pub target: f64,
    pub lower: f64,
    pub upper: f64,
}

impl TargetBand {
    /// Inclusive on both bounds.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl RuleSet {
    /// Length of the early momentum window.
    pub fn early_window(&self) -> Duration {
        Duration::from_secs(self.early_window_secs)
    }

    /// Length of the dip window, measured from the start of the early window.
    pub fn dip_window(&self) -> Duration {
        Duration::from_secs(self.dip_window_secs)
    }

    /// How long the target watch runs before timing out.
    pub fn target_timeout(&self) -> Duration {
        Duration::from_secs(self.target_timeout_secs)
    }

    /// Window at the start of the target watch in which a rebound triggers.
    pub fn retrigger_window(&self) -> Duration {
        Duration::from_secs(self.retrigger_window_secs)
    }

    /// Maximum entity age at baseline, `None` when the check is disabled.
    pub fn max_entity_age(&self) -> Option<Duration> {
        (self.max_entity_age_secs > 0).then(|| Duration::from_secs(self.max_entity_age_secs))
    }

    /// `target = baseline * (1 - average_dip / 100 * overshoot)`, banded by the lower/upper factors.
    pub fn target_band(&self, baseline: f64, average_dip_pct: f64) -> TargetBand {
        let target = baseline * (1.0 - average_dip_pct / 100.0 * self.overshoot_factor);
        TargetBand {
            target,
            lower: target * self.band_lower_factor,
            upper: target * self.band_upper_factor,
        }
    }

    /// Stable hash of the rule values, logged so outcomes can be tied to a rule version.
    pub fn fingerprint(&self) -> String {
        // Struct field order is fixed, so the JSON form is canonical.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().as_str()[..16].to_string()
    }

    /// Reject rule sets no run could satisfy.
    pub fn validate(&self) -> Result<(), String> {
        let floats = [
            ("early_liquidity_floor", self.early_liquidity_floor),
            ("retrigger_liquidity_floor", self.retrigger_liquidity_floor),
            ("target_liquidity_floor", self.target_liquidity_floor),
            ("min_average_dip_pct", self.min_average_dip_pct),
            ("overshoot_factor", self.overshoot_factor),
            ("band_lower_factor", self.band_lower_factor),
            ("band_upper_factor", self.band_upper_factor),
        ];
        for (name, value) in floats {
            if !value.is_finite() {
                return Err(format!("rules.{name} must be finite"));
            }
        }
        for (name, value) in [
            ("overshoot_factor", self.overshoot_factor),
            ("band_lower_factor", self.band_lower_factor),
            ("band_upper_factor", self.band_upper_factor),
        ] {
            if value < 0.0 {
                return Err(format!("rules.{name} must be >= 0"));
            }
        }
        if self.band_lower_factor > self.band_upper_factor {
            return Err("rules.band_lower_factor must not exceed band_upper_factor".into());
        }
        if self.dip_window_secs < self.early_window_secs {
            return Err("rules.dip_window_secs must be >= early_window_secs".into());
        }
        Ok(())
    }
}
