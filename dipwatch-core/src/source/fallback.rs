//! Priority-ordered fallback across providers.

use super::{MetricSource, SourceError};
use crate::domain::MetricSample;

/// Tries providers in order and returns the first success.
///
/// Providers whose breaker is open are skipped without a request.
pub struct FallbackSource {
    name: String,
    providers: Vec<Box<dyn MetricSource>>,
}

impl FallbackSource {
    /// Fall back across `providers` in the given priority order.
    pub fn new(providers: Vec<Box<dyn MetricSource>>) -> Self {
        let name = providers
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(">");
        Self { name, providers }
    }

    /// Number of configured providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True when no provider is configured.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl MetricSource for FallbackSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, identifier: &str) -> Result<MetricSample, SourceError> {
        if self.providers.is_empty() {
            return Err(SourceError::NoProviders);
        }

        let mut errors = Vec::new();
        for provider in &self.providers {
            if !provider.is_available() {
                errors.push((
                    provider.name().to_string(),
                    SourceError::CircuitBreakerTripped {
                        provider: provider.name().to_string(),
                    },
                ));
                continue;
            }
            match provider.fetch(identifier) {
                Ok(sample) if sample.is_valid() => return Ok(sample),
                Ok(sample) => {
                    errors.push((
                        provider.name().to_string(),
                        SourceError::NotNumeric {
                            field: "value".into(),
                            reason: format!("non-finite value {}", sample.value),
                        },
                    ));
                }
                Err(e) => {
                    tracing::debug!(provider = provider.name(), id = identifier, error = %e, "provider failed");
                    errors.push((provider.name().to_string(), e));
                }
            }
        }
        Err(SourceError::AllProvidersFailed(errors))
    }

    fn is_available(&self) -> bool {
        self.providers.iter().any(|p| p.is_available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProviderTag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        tag: &'static str,
        value: Option<f64>,
        available: bool,
        calls: Arc<AtomicUsize>,
    }

    impl MetricSource for Fixed {
        fn name(&self) -> &str {
            self.tag
        }

        fn fetch(&self, _identifier: &str) -> Result<MetricSample, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.value {
                Some(v) => Ok(MetricSample::new(v, ProviderTag::new(self.tag), chrono::Utc::now())),
                None => Err(SourceError::HttpStatus {
                    provider: self.tag.into(),
                    status: 500,
                }),
            }
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn fixed(tag: &'static str, value: Option<f64>, available: bool) -> (Box<dyn MetricSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Fixed {
                tag,
                value,
                available,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn falls_back_to_second_provider() {
        let (a, _) = fixed("a", None, true);
        let (b, _) = fixed("b", Some(42.0), true);
        let source = FallbackSource::new(vec![a, b]);
        let sample = source.fetch("X").unwrap();
        assert_eq!(sample.value, 42.0);
        assert_eq!(sample.source.as_str(), "b");
        assert_eq!(source.name(), "a>b");
    }

    #[test]
    fn first_success_wins() {
        let (a, _) = fixed("a", Some(1.0), true);
        let (b, b_calls) = fixed("b", Some(2.0), true);
        let source = FallbackSource::new(vec![a, b]);
        assert_eq!(source.fetch("X").unwrap().value, 1.0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unavailable_provider_is_skipped() {
        let (a, a_calls) = fixed("a", Some(1.0), false);
        let (b, _) = fixed("b", Some(2.0), true);
        let source = FallbackSource::new(vec![a, b]);
        assert_eq!(source.fetch("X").unwrap().value, 2.0);
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn non_finite_sample_falls_through() {
        let (a, _) = fixed("a", Some(f64::NAN), true);
        let (b, _) = fixed("b", Some(3.0), true);
        let source = FallbackSource::new(vec![a, b]);
        assert_eq!(source.fetch("X").unwrap().value, 3.0);
    }

    #[test]
    fn all_failed_reports_each_provider() {
        let (a, _) = fixed("a", None, true);
        let (b, _) = fixed("b", None, true);
        let source = FallbackSource::new(vec![a, b]);
        match source.fetch("X").unwrap_err() {
            SourceError::AllProvidersFailed(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_source_has_no_providers() {
        let source = FallbackSource::new(Vec::new());
        assert!(source.is_empty());
        assert!(matches!(source.fetch("X"), Err(SourceError::NoProviders)));
    }
}
