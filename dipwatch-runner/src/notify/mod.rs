//! Outbound notification channel.
//!
//! A [`Notifier`] delivers one message. The [`NotificationQueue`] owns one
//! sender thread that drains messages in order with a minimum delay between
//! sends. Delivery failures are logged and dropped: a notification is never
//! retried and never reopens its work key.

pub mod queue;
pub mod telegram;

pub use queue::{NotificationQueue, QueueStats};
pub use telegram::TelegramNotifier;

use dipwatch_core::WorkKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid notifier configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {service}: status={status}, body={body}")]
    Api {
        service: String,
        status: u16,
        body: String,
    },

    #[error("notification queue is disconnected")]
    Disconnected,

    #[error("failed to start sender thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub trait Notifier: Send + Sync {
    fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Dry-run channel: logs each message instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!(message, "notification (log channel)");
        Ok(())
    }
}

/// Message text with `{id}` and `{reference}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageTemplate(String);

impl Default for MessageTemplate {
    fn default() -> Self {
        Self("{id}".into())
    }
}

impl MessageTemplate {
    /// Template text with `{id}` and `{reference}` placeholders.
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute the key into the template.
    pub fn render(&self, key: &WorkKey) -> String {
        self.0
            .replace("{id}", key.identifier().as_str())
            .replace("{reference}", &key.reference().to_string())
    }
}
