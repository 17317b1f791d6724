// NOTIFY: chat notifier collaborator
// Failures are logged and never fatal to the scan cycle.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

pub struct TelegramNotifier {
    http: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        self.http
            .post(&url)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Used when no chat is configured; messages go to the debug log only.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        debug!(len = text.len(), "NOTIFY: no notifier configured, summary dropped");
        Ok(())
    }
}
