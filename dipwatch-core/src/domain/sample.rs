use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the provider that produced a sample (e.g. `gmgn`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderTag(pub String);

impl ProviderTag {
    /// Tag a provider by name.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The provider name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secondary metrics a provider may expose next to the primary value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondarySignals {
    /// Trading volume; the liquidity signal.
    pub volume: Option<f64>,
    /// Participant (holder) count.
    pub holders: Option<f64>,
}

/// One observation of the primary metric (market cap). Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub source: ProviderTag,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub signals: SecondarySignals,
    /// Entity creation time, when the provider reports one.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl MetricSample {
    /// A sample with no secondary signals and no creation time.
    pub fn new(value: f64, source: ProviderTag, observed_at: DateTime<Utc>) -> Self {
        Self {
            value,
            source,
            observed_at,
            signals: SecondarySignals::default(),
            created_at: None,
        }
    }

    /// Attach secondary signals.
    pub fn with_signals(mut self, signals: SecondarySignals) -> Self {
        self.signals = signals;
        self
    }

    /// Attach the entity creation time, if the provider reported one.
    pub fn with_created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    /// A sample is usable only if its primary value is finite.
    pub fn is_valid(&self) -> bool {
        self.value.is_finite()
    }
}
