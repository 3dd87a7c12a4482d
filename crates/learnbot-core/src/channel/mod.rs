pub mod telegram;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;
use crate::types::{InboundEvent, OutboundMessage};

/// Outbound side of a chat transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name (e.g., "telegram").
    fn name(&self) -> &str;

    /// Show the "typing…" indicator in a chat.
    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError>;

    /// Send a message to a chat.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;
}

/// Inbound side of a chat transport.
#[async_trait]
pub trait EventSource: Send {
    fn name(&self) -> &str;

    /// Push events into `inbound_tx` until `shutdown` is cancelled.
    ///
    /// Returns `Ok` on a requested stop and `Err` when the source cannot
    /// continue (e.g. rejected credentials).
    async fn listen(
        &mut self,
        inbound_tx: mpsc::Sender<InboundEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), ChannelError>;
}
