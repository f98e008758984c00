//! Telegram Bot API dispatcher — outbound message sending only.
//!
//! Implements the `Notifier` contract via `sendMessage`. Inbound transport
//! (update polling, menus, callbacks) is an external collaborator and lives
//! outside this crate.

use async_trait::async_trait;
use serde::Deserialize;

use larder_core::error::{LarderError, Result};
use larder_core::traits::Notifier;

/// Outbound Telegram channel for one bot token.
pub struct TelegramNotifier {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Send a plain-text message to a chat.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| LarderError::Dispatch(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| LarderError::Dispatch(format!("Invalid send response: {e}")))?;

        if !result.ok {
            return Err(LarderError::Dispatch(format!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Startup probe — verifies the token and logs the bot identity.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| LarderError::Dispatch(format!("getMe failed: {e}")))?;

        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| LarderError::Dispatch(format!("Invalid getMe response: {e}")))?;

        body.result
            .ok_or_else(|| LarderError::Dispatch("No bot info in getMe response".into()))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, recipient: i64, text: &str) -> Result<()> {
        self.send_message(recipient, text).await
    }
}

// --- Telegram API types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}
