// src/services/telegram.rs

//! Telegram Bot API notification channel.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::error::{AppError, Result};

/// Delivery channel for rendered alert messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message to one subscriber.
    async fn deliver(&self, subscriber_id: &str, text: &str) -> Result<()>;
}

/// Notifier backed by the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: Client,
    token: String,
    api_base: String,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    /// Create a notifier; fails when no bot token is configured.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            token: config.token()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, subscriber_id: &str, text: &str) -> Result<()> {
        let context = || format!("chat {subscriber_id}");
        let body = serde_json::json!({
            "chat_id": subscriber_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::transport(context(), e))?;

        let envelope: ApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::transport(context(), e))?;
        if !envelope.ok {
            return Err(AppError::transport(
                context(),
                envelope
                    .description
                    .unwrap_or_else(|| "sendMessage rejected".to_string()),
            ));
        }

        debug!(chat = %subscriber_id, "message delivered");
        Ok(())
    }
}
