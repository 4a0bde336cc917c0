//! HTTP metric provider.
//!
//! One GET per poll against a URL template with `{id}` substituted. Only
//! provider-wide trouble feeds the shared circuit breaker: 403 trips it at once,
//! 429 and 5xx count toward the threshold. A 404, a transport error or a page
//! missing the field says nothing about other identifiers and leaves it alone.
//!
//! Upstream pages change format without notice, so every response is treated as
//! untrusted text until the extractor finds a numeric primary field.

use super::circuit_breaker::CircuitBreaker;
use super::extract::FieldExtractor;
use super::{MetricSource, SourceError};
use crate::domain::{MetricSample, ProviderTag};
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36";

pub struct HttpProvider {
    tag: ProviderTag,
    url_template: String,
    extractor: FieldExtractor,
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl HttpProvider {
    /// Build a provider with its own HTTP client around `circuit_breaker`.
    pub fn new(
        tag: impl Into<String>,
        url_template: impl Into<String>,
        extractor: FieldExtractor,
        timeout: Duration,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            tag: ProviderTag::new(tag),
            url_template: url_template.into(),
            extractor,
            client,
            circuit_breaker,
        })
    }

    /// The request URL for `identifier`.
    pub fn url_for(&self, identifier: &str) -> String {
        self.url_template.replace("{id}", identifier)
    }

    fn tripped(&self) -> SourceError {
        SourceError::CircuitBreakerTripped {
            provider: self.tag.to_string(),
        }
    }

    /// Count a provider-wide failure toward the breaker threshold.
    fn fail(&self, err: SourceError) -> SourceError {
        if self.circuit_breaker.record_failure() {
            tracing::warn!(
                provider = %self.tag,
                cooldown_secs = self.circuit_breaker.remaining_cooldown().as_secs(),
                "circuit breaker opened"
            );
        }
        err
    }

    fn get_body(&self, identifier: &str) -> Result<String, SourceError> {
        let url = self.url_for(identifier);
        let resp = self
            .client
            .get(&url)
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .send()
            .map_err(|e| SourceError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            self.circuit_breaker.trip();
            tracing::warn!(provider = %self.tag, "403 from provider, circuit breaker tripped");
            return Err(self.tripped());
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(self.fail(SourceError::RateLimited {
                provider: self.tag.to_string(),
            }));
        }
        if !status.is_success() {
            let err = SourceError::HttpStatus {
                provider: self.tag.to_string(),
                status: status.as_u16(),
            };
            return Err(if status.is_server_error() { self.fail(err) } else { err });
        }

        let body = resp
            .text()
            .map_err(|e| SourceError::MalformedPayload(e.to_string()))?;
        self.circuit_breaker.record_success();
        Ok(body)
    }
}

impl MetricSource for HttpProvider {
    fn name(&self) -> &str {
        self.tag.as_str()
    }

    fn fetch(&self, identifier: &str) -> Result<MetricSample, SourceError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(self.tripped());
        }

        let body = self.get_body(identifier)?;
        let fields = self.extractor.extract(&body)?;

        Ok(MetricSample::new(fields.market_cap, self.tag.clone(), chrono::Utc::now())
            .with_signals(fields.signals)
            .with_created_at(fields.created_at))
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FieldPaths;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    fn provider(breaker: Arc<CircuitBreaker>) -> HttpProvider {
        provider_at("https://gmgn.ai/sol/token/{id}", breaker)
    }

    fn provider_at(url_template: &str, breaker: Arc<CircuitBreaker>) -> HttpProvider {
        HttpProvider::new(
            "gmgn",
            url_template,
            FieldExtractor::Text(FieldPaths {
                market_cap: "market_cap".into(),
                volume: None,
                holders: None,
                created_at: None,
            }),
            Duration::from_secs(5),
            breaker,
        )
        .unwrap()
    }

    #[test]
    fn url_template_substitutes_identifier() {
        let p = provider(Arc::new(CircuitBreaker::default_provider()));
        assert_eq!(p.url_for("ABC123"), "https://gmgn.ai/sol/token/ABC123");
    }

    #[test]
    fn open_breaker_skips_network() {
        let breaker = Arc::new(CircuitBreaker::new(Duration::from_secs(60), 1));
        breaker.trip();
        let p = provider(breaker);
        assert!(!p.is_available());
        let err = p.fetch("ABC123").unwrap_err();
        assert!(matches!(err, SourceError::CircuitBreakerTripped { .. }));
    }

    /// Serves `/token/<id>` from a local listener; `route` maps the id to a status and body.
    fn serve(route: fn(&str) -> (u16, &'static str)) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                        break;
                    }
                }
                let path = request_line.split_whitespace().nth(1).unwrap_or("");
                let id = path.rsplit('/').next().unwrap_or("");
                let (status, body) = route(id);
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}/token/{{id}}")
    }

    fn route(id: &str) -> (u16, &'static str) {
        match id {
            "GOOD" => (200, r#"{"market_cap":5000}"#),
            "BAD" => (200, "<html>no data yet</html>"),
            "GONE" => (404, "not found"),
            "BUSY" => (429, "slow down"),
            _ => (503, "unavailable"),
        }
    }

    #[test]
    fn identifier_failures_leave_breaker_closed() {
        let url = serve(route);
        let p = provider_at(&url, Arc::new(CircuitBreaker::new(Duration::from_secs(60), 2)));
        for _ in 0..5 {
            assert!(matches!(p.fetch("BAD"), Err(SourceError::MissingField { .. })));
            assert!(matches!(p.fetch("GONE"), Err(SourceError::HttpStatus { status: 404, .. })));
        }
        assert!(p.is_available());
        assert_eq!(p.fetch("GOOD").unwrap().value, 5000.0);
    }

    #[test]
    fn server_errors_and_rate_limits_open_breaker() {
        let url = serve(route);
        let p = provider_at(&url, Arc::new(CircuitBreaker::new(Duration::from_secs(60), 2)));
        assert!(matches!(p.fetch("BUSY"), Err(SourceError::RateLimited { .. })));
        assert!(matches!(p.fetch("DOWN"), Err(SourceError::HttpStatus { status: 503, .. })));
        assert!(!p.is_available());
        assert!(matches!(p.fetch("GOOD"), Err(SourceError::CircuitBreakerTripped { .. })));
    }

    #[test]
    fn unreachable_host_leaves_breaker_closed() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let p = provider_at(
            &format!("http://127.0.0.1:{port}/token/{{id}}"),
            Arc::new(CircuitBreaker::new(Duration::from_secs(60), 1)),
        );
        assert!(matches!(p.fetch("GOOD"), Err(SourceError::NetworkUnreachable(_))));
        assert!(p.is_available());
    }
}
