//! Metric source trait and structured error types.
//!
//! The MetricSource trait abstracts over upstream providers (token pages, pool
//! APIs) so the engine can fall back between them and tests can script them.
//! Every error here means "Unavailable" to the caller; none is fatal.

pub mod circuit_breaker;
pub mod extract;
pub mod fallback;
pub mod http;
pub mod scripted;

pub use circuit_breaker::CircuitBreaker;
pub use extract::{FieldExtractor, FieldPaths};
pub use fallback::FallbackSource;
pub use http::HttpProvider;
pub use scripted::{Reading, ScriptedSource};

use crate::domain::MetricSample;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider {provider}")]
    RateLimited { provider: String },

    #[error("HTTP {status} from {provider}")]
    HttpStatus { provider: String, status: u16 },

    #[error("hard stop: {provider} is blocking requests (circuit breaker tripped)")]
    CircuitBreakerTripped { provider: String },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("field '{field}' missing from response")]
    MissingField { field: String },

    #[error("field '{field}' is not numeric: {reason}")]
    NotNumeric { field: String, reason: String },

    #[error("no metric provider configured")]
    NoProviders,

    #[error("all providers failed: {}", summarize(.0))]
    AllProvidersFailed(Vec<(String, SourceError)>),
}

fn summarize(errors: &[(String, SourceError)]) -> String {
    errors
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Capability to observe the primary metric of an identifier.
///
/// Implementations must not mutate shared state beyond their own breaker and
/// must report every failure as a `SourceError`, never panic.
pub trait MetricSource: Send + Sync {
    /// Provider tag, used for logging and cadence selection.
    fn name(&self) -> &str;

    fn fetch(&self, identifier: &str) -> Result<MetricSample, SourceError>;

    /// False while the provider is known to refuse requests (tripped breaker).
    fn is_available(&self) -> bool {
        true
    }
}

impl<S: MetricSource + ?Sized> MetricSource for std::sync::Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, identifier: &str) -> Result<MetricSample, SourceError> {
        (**self).fetch(identifier)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

impl<S: MetricSource + ?Sized> MetricSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, identifier: &str) -> Result<MetricSample, SourceError> {
        (**self).fetch(identifier)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}
