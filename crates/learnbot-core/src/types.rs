use serde::{Deserialize, Serialize};

/// Who sent an inbound event, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub external_id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub handle: Option<String>,
}

impl UserIdentity {
    pub fn new(external_id: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            first_name: first_name.into(),
            last_name: None,
            handle: None,
        }
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }
}

/// Bot commands the router understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// Any other `/command`; carries the lowercased name without the slash.
    Other(String),
}

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    Text(String),
}

/// Event received from a chat transport.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub channel: String,
    pub chat_id: String,
    pub sender: UserIdentity,
    pub kind: EventKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InboundEvent {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        sender: UserIdentity,
        kind: EventKind,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            sender,
            kind,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Build an event from raw message text, recognizing `/commands`.
    pub fn from_text(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        sender: UserIdentity,
        text: &str,
    ) -> Self {
        let kind = match crate::service::commands::parse_command(text) {
            Some(cmd) => EventKind::Command(cmd),
            None => EventKind::Text(text.to_string()),
        };
        Self::new(channel, chat_id, sender, kind)
    }

    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// Markup dialect of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

/// Message to send to a chat.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub chat_id: String,
    pub content: String,
    pub format: TextFormat,
}

impl OutboundMessage {
    pub fn new(chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            content: content.into(),
            format: TextFormat::Plain,
        }
    }

    pub fn markdown(chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            content: content.into(),
            format: TextFormat::Markdown,
        }
    }
}
