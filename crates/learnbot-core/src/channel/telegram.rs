use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TelegramConfig;
use crate::error::ChannelError;
use crate::types::{EventKind, InboundEvent, OutboundMessage, TextFormat, UserIdentity};
use crate::util::markdown::strip_markdown;
use crate::util::truncate_string;

use super::{ChatTransport, EventSource};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Server-side long polling timeout for `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

// ====== API Types ======

/// Telegram Update object (subset).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

/// Telegram Message object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

/// Telegram Chat object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

/// Telegram User object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl From<&TelegramUser> for UserIdentity {
    fn from(user: &TelegramUser) -> Self {
        UserIdentity {
            external_id: user.id.to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            handle: user.username.clone(),
        }
    }
}

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

// ====== Client ======

/// Thin Bot API client; implements the outbound side.
#[derive(Clone)]
pub struct TelegramClient {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, ChannelError> {
        Self::with_api_base(config, DEFAULT_API_BASE)
    }

    pub fn with_api_base(config: &TelegramConfig, api_base: &str) -> Result<Self, ChannelError> {
        let client = crate::util::http::client_builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .map_err(|e| ChannelError::Connection(e.to_string()))?;
        Ok(Self {
            token: config.token.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        Self::api_url_with_base(&self.api_base, &self.token, method)
    }

    /// Build a Bot API URL from a base, token and method name.
    fn api_url_with_base(base: &str, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", base, token, method)
    }

    /// Call a Bot API method and unwrap its `result`.
    async fn call<T>(&self, method: &str, body: serde_json::Value) -> Result<T, ChannelError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.without_url().to_string()))?;

        let status = response.status();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::Parse(e.without_url().to_string()))?;

        match parsed {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { description, error_code, .. } => {
                let code = error_code.unwrap_or(status.as_u16());
                let description = description.unwrap_or_else(|| "unknown error".to_string());
                Err(match code {
                    // Telegram answers 404 for a malformed token
                    401 | 404 => ChannelError::Auth(format!("{} ({})", description, code)),
                    _ => ChannelError::Send(format!("{} failed: {} ({})", method, description, code)),
                })
            }
        }
    }

    /// Long-poll for new updates starting at `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<serde_json::Value>, ChannelError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Acknowledge every update below `offset` without waiting for new ones.
    ///
    /// Telegram only forgets updates once a later `getUpdates` carries a
    /// higher offset, so a poller stopping right after a batch would
    /// otherwise see it again on restart.
    pub async fn confirm_offset(&self, offset: i64) -> Result<(), ChannelError> {
        let _: Vec<serde_json::Value> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": 0,
                    "limit": 1,
                    "allowed_updates": ["message"],
                }),
            )
            .await?;
        Ok(())
    }

    /// Parse a single update.
    pub fn parse_update(value: serde_json::Value) -> Result<TelegramUpdate, ChannelError> {
        serde_json::from_value(value).map_err(|e| ChannelError::Parse(e.to_string()))
    }

    /// Turn an update into an event; non-text and bot-sent messages yield `None`.
    pub fn event_from_update(update: &TelegramUpdate) -> Option<InboundEvent> {
        let message = update.message.as_ref()?;
        let from = message.from.as_ref()?;
        if from.is_bot {
            return None;
        }
        let text = message.text.as_deref()?;
        Some(InboundEvent::from_text(
            "telegram",
            message.chat.id.to_string(),
            UserIdentity::from(from),
            text,
        ))
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.call::<bool>(
            "sendChatAction",
            json!({ "chat_id": chat_id, "action": "typing" }),
        )
        .await
        .map(|_| ())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let body = match msg.format {
            TextFormat::Markdown => json!({
                "chat_id": msg.chat_id,
                "text": msg.content,
                "parse_mode": "Markdown",
            }),
            TextFormat::Plain => json!({ "chat_id": msg.chat_id, "text": msg.content }),
        };

        match self.call::<serde_json::Value>("sendMessage", body).await {
            Ok(_) => Ok(()),
            Err(ChannelError::Send(e)) if msg.format == TextFormat::Markdown => {
                // Fallback to plain text
                warn!("Markdown rejected ({}), falling back to plain text", e);
                self.call::<serde_json::Value>(
                    "sendMessage",
                    json!({ "chat_id": msg.chat_id, "text": strip_markdown(&msg.content) }),
                )
                .await
                .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}

// ====== Poller ======

/// Telegram event source using `getUpdates` long polling.
pub struct TelegramPoller {
    client: TelegramClient,
    offset: i64,
}

impl TelegramPoller {
    pub fn new(client: TelegramClient) -> Self {
        Self { client, offset: 0 }
    }

    /// Forward one batch; returns `false` once the receiver is gone.
    async fn forward(&mut self, updates: Vec<serde_json::Value>, tx: &mpsc::Sender<InboundEvent>) -> bool {
        for raw in updates {
            if let Some(id) = raw.get("update_id").and_then(|v| v.as_i64()) {
                self.offset = self.offset.max(id + 1);
            }
            let update = match TelegramClient::parse_update(raw) {
                Ok(u) => u,
                Err(e) => {
                    error!("Error parsing Telegram update: {}", e);
                    continue;
                }
            };
            let Some(event) = TelegramClient::event_from_update(&update) else {
                debug!("Skipping non-text update {}", update.update_id);
                continue;
            };
            if let EventKind::Text(ref text) = event.kind {
                debug!("Telegram message in {}: {}", event.chat_id, truncate_string(text, 50, "..."));
            }
            if tx.send(event).await.is_err() {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl EventSource for TelegramPoller {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn listen(
        &mut self,
        inbound_tx: mpsc::Sender<InboundEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), ChannelError> {
        info!("Starting Telegram bot (polling mode)...");

        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = self.client.get_updates(self.offset) => r,
            };

            match result {
                Ok(updates) => {
                    if !self.forward(updates, &inbound_tx).await {
                        warn!("Dispatcher gone, stopping Telegram polling");
                        break;
                    }
                }
                Err(e @ ChannelError::Auth(_)) => {
                    error!("Telegram rejected the bot token: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Telegram polling error: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }

        if self.offset > 0 {
            match tokio::time::timeout(CONFIRM_TIMEOUT, self.client.confirm_offset(self.offset)).await {
                Ok(Ok(())) => debug!(offset = self.offset, "Confirmed update offset"),
                Ok(Err(e)) => warn!("Failed to confirm update offset {}: {}", self.offset, e),
                Err(_) => warn!("Confirming update offset {} timed out", self.offset),
            }
        }

        info!("Telegram polling stopped");
        Ok(())
    }
}
