//! Telegram Bot API client.
//!
//! Covers the three methods the bot needs: `sendMessage`, `sendPhoto` and
//! `getUpdates` (long polling for inbound commands).  All messages use
//! `parse_mode = "HTML"`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::Transport;
use crate::error::TransportError;

const API_BASE: &str = "https://api.telegram.org";

/// Envelope every Bot API response is wrapped in.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramClient {
    client: Client,
    bot_token: String,
    api_base: String,
}

impl TelegramClient {
    pub fn new(client: Client, bot_token: impl Into<String>) -> Self {
        Self::with_api_base(client, bot_token, API_BASE)
    }

    pub fn with_api_base(
        client: Client,
        bot_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            bot_token: bot_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Long-poll for updates after `offset`, waiting up to `timeout`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TransportError> {
        let body = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        // The request must outlive the server-side wait.
        self.call("getUpdates", &body, Some(timeout + Duration::from_secs(10)))
            .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<T, TransportError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);

        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        let parsed: ApiResponse<T> = serde_json::from_str(&text)
            .map_err(|_| TransportError::Api(format!("HTTP {status}: {text}")))?;
        if !parsed.ok {
            return Err(TransportError::Api(
                parsed.description.unwrap_or_else(|| format!("HTTP {status}")),
            ));
        }
        parsed
            .result
            .ok_or_else(|| TransportError::Api(format!("{method} returned no result")))
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_text(&self, recipient: &str, html: &str) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": recipient,
            "text": html,
            "parse_mode": "HTML",
            "disable_web_page_preview": false,
        });
        self.call::<Value>("sendMessage", &body, None).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        recipient: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": recipient,
            "photo": image_url,
            "caption": caption,
            "parse_mode": "HTML",
        });
        self.call::<Value>("sendPhoto", &body, None).await?;
        Ok(())
    }
}
