//! Telegram Bot API channel.

use super::{Notifier, NotifyError};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    chat_id: String,
}

impl std::fmt::Debug for TelegramNotifier {
    // endpoint embeds the bot token
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    /// Channel posting to `chat_id` through the bot `token`. Both must be non-empty.
    pub fn new(
        api_base: &str,
        token: &str,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        if token.trim().is_empty() {
            return Err(NotifyError::InvalidConfig("bot token is empty".into()));
        }
        let chat_id = chat_id.into();
        if chat_id.trim().is_empty() {
            return Err(NotifyError::InvalidConfig("chat_id is empty".into()));
        }
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token.trim()),
            chat_id,
        })
    }

    /// Read the bot token from the environment variable `token_var`.
    pub fn from_env(
        api_base: &str,
        token_var: &str,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let token = std::env::var(token_var).map_err(|_| {
            NotifyError::InvalidConfig(format!("environment variable {token_var} is not set"))
        })?;
        Self::new(api_base, &token, chat_id, timeout)
    }

    /// Destination chat.
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: message,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NotifyError::Api {
                service: "telegram".into(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_embeds_token() {
        let n = TelegramNotifier::new("https://api.example.org/", "123:abc", "@chat", Duration::from_secs(5)).unwrap();
        assert_eq!(n.endpoint, "https://api.example.org/bot123:abc/sendMessage");
        assert_eq!(n.chat_id(), "@chat");
    }

    #[test]
    fn debug_hides_token() {
        let n = TelegramNotifier::new(DEFAULT_API_BASE, "secret-token", "@chat", Duration::from_secs(5)).unwrap();
        assert!(!format!("{n:?}").contains("secret-token"));
    }

    #[test]
    fn rejects_empty_credentials() {
        assert!(TelegramNotifier::new(DEFAULT_API_BASE, " ", "@chat", Duration::from_secs(5)).is_err());
        assert!(TelegramNotifier::new(DEFAULT_API_BASE, "t", "", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn missing_token_variable_is_config_error() {
        let err = TelegramNotifier::from_env(
            DEFAULT_API_BASE,
            "DIPWATCH_TEST_TOKEN_NEVER_SET",
            "@chat",
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, NotifyError::InvalidConfig(_)));
    }
}
