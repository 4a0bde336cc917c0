//! TOML application configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration:
//! two providers (a gmgn token page scanned as text, the geckoterminal token
//! API as JSON) and the log-only notification channel.

use crate::dispatcher::DispatcherConfig;
use crate::notify::{telegram, LogNotifier, MessageTemplate, Notifier, NotifyError, TelegramNotifier};
use dipwatch_core::source::{CircuitBreaker, FieldExtractor, FieldPaths};
use dipwatch_core::{Cadence, FallbackSource, HttpProvider, MetricSource, RuleSet, SourceError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to build provider: {0}")]
    Source(#[from] SourceError),

    #[error("failed to build notifier: {0}")]
    Notify(#[from] NotifyError),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rules: RuleSet,
    pub cadence: Cadence,
    pub sources: Vec<SourceConfig>,
    pub notify: NotifyConfig,
    pub storage: StorageConfig,
    pub pool: PoolConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules: RuleSet::default(),
            cadence: Cadence::default(),
            sources: default_sources(),
            notify: NotifyConfig::default(),
            storage: StorageConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

/// One HTTP provider, in priority order within `sources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub tag: String,
    /// URL template; `{id}` is replaced by the identifier.
    pub url: String,
    pub extractor: FieldExtractor,
    /// Poll interval after this provider answers. Falls back to `cadence.default_ms`.
    #[serde(default)]
    pub cadence_ms: Option<u64>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_breaker_cooldown_secs() -> u64 {
    120
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            tag: "gmgn".into(),
            url: "https://gmgn.ai/sol/token/{id}".into(),
            extractor: FieldExtractor::Text(FieldPaths {
                market_cap: "market_cap".into(),
                volume: Some("volume_24h".into()),
                holders: Some("holder_count".into()),
                created_at: Some("creation_timestamp".into()),
            }),
            cadence_ms: Some(3_000),
            timeout_secs: default_timeout_secs(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
            breaker_threshold: default_breaker_threshold(),
        },
        SourceConfig {
            tag: "geckoterminal".into(),
            url: "https://api.geckoterminal.com/api/v2/networks/solana/tokens/{id}".into(),
            extractor: FieldExtractor::Json(FieldPaths {
                market_cap: "/data/attributes/fdv_usd".into(),
                volume: Some("/data/attributes/volume_usd/h24".into()),
                holders: None,
                created_at: None,
            }),
            cadence_ms: Some(5_000),
            timeout_secs: default_timeout_secs(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
            breaker_threshold: default_breaker_threshold(),
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Log,
    Telegram,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub channel: Channel,
    pub template: MessageTemplate,
    pub min_delay_ms: u64,
    pub chat_id: String,
    /// Environment variable holding the bot token.
    pub token_env: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: Channel::Log,
            template: MessageTemplate::default(),
            min_delay_ms: 1_000,
            chat_id: String::new(),
            token_env: "DIPWATCH_TELEGRAM_TOKEN".into(),
            api_base: telegram::DEFAULT_API_BASE.into(),
            timeout_secs: 10,
        }
    }
}

impl NotifyConfig {
    /// Minimum spacing between two sends.
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub admitted_path: PathBuf,
    pub journal_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            admitted_path: PathBuf::from("contracts.json"),
            journal_path: PathBuf::from("sent_contracts.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl AppConfig {
    /// Read, parse and validate the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a TOML document. Omitted sections and fields take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section; the first invalid field is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rules
            .validate()
            .map_err(|m| ConfigError::invalid("rules", m))?;
        self.effective_cadence()
            .validate()
            .map_err(|m| ConfigError::invalid("cadence", m))?;

        if self.sources.is_empty() {
            return Err(ConfigError::invalid("sources", "at least one provider is required"));
        }
        let mut tags = HashSet::new();
        for source in &self.sources {
            if source.tag.trim().is_empty() {
                return Err(ConfigError::invalid("sources.tag", "must not be empty"));
            }
            if !tags.insert(source.tag.as_str()) {
                return Err(ConfigError::invalid("sources.tag", format!("duplicate tag '{}'", source.tag)));
            }
            if !source.url.contains("{id}") {
                return Err(ConfigError::invalid(
                    format!("sources.{}.url", source.tag),
                    "must contain the {id} placeholder",
                ));
            }
            if source.timeout_secs == 0 {
                return Err(ConfigError::invalid(format!("sources.{}.timeout_secs", source.tag), "must be > 0"));
            }
            if source.breaker_threshold == 0 {
                return Err(ConfigError::invalid(
                    format!("sources.{}.breaker_threshold", source.tag),
                    "must be > 0",
                ));
            }
        }

        if self.pool.workers == 0 {
            return Err(ConfigError::invalid("pool.workers", "must be > 0"));
        }
        if self.notify.template.as_str().trim().is_empty() {
            return Err(ConfigError::invalid("notify.template", "must not be empty"));
        }
        if self.notify.channel == Channel::Telegram && self.notify.chat_id.trim().is_empty() {
            return Err(ConfigError::invalid("notify.chat_id", "required for the telegram channel"));
        }
        Ok(())
    }

    /// Global cadence with each provider's `cadence_ms` applied as an override.
    pub fn effective_cadence(&self) -> Cadence {
        self.sources.iter().fold(self.cadence.clone(), |cadence, s| match s.cadence_ms {
            Some(ms) => cadence.with_source(s.tag.clone(), Duration::from_millis(ms)),
            None => cadence,
        })
    }

    /// The configured providers wrapped in a priority fallback, one breaker each.
    pub fn build_source(&self) -> Result<FallbackSource, ConfigError> {
        let mut providers: Vec<Box<dyn MetricSource>> = Vec::with_capacity(self.sources.len());
        for s in &self.sources {
            let breaker = Arc::new(CircuitBreaker::new(
                Duration::from_secs(s.breaker_cooldown_secs),
                s.breaker_threshold,
            ));
            providers.push(Box::new(HttpProvider::new(
                s.tag.clone(),
                s.url.clone(),
                s.extractor.clone(),
                Duration::from_secs(s.timeout_secs),
                breaker,
            )?));
        }
        Ok(FallbackSource::new(providers))
    }

    /// Build the configured notification channel.
    pub fn build_notifier(&self) -> Result<Arc<dyn Notifier>, ConfigError> {
        let n = &self.notify;
        Ok(match n.channel {
            Channel::Log => Arc::new(LogNotifier),
            Channel::Telegram => Arc::new(TelegramNotifier::from_env(
                &n.api_base,
                &n.token_env,
                n.chat_id.clone(),
                Duration::from_secs(n.timeout_secs),
            )?),
        })
    }

    /// Dispatcher settings from the pool and notify sections.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.pool.workers,
            template: self.notify.template.clone(),
        }
    }
}
