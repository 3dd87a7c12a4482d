#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use learnbot_core::channel::{ChatTransport, EventSource};
use learnbot_core::error::ChannelError;
use learnbot_core::types::{InboundEvent, OutboundMessage, UserIdentity};
use learnbot_core::util::Clock;

/// Transport that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub typing: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.typing.lock().unwrap().push(chat_id.to_string());
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

/// Clock that advances one second on every reading.
pub struct StepClock(Mutex<DateTime<FixedOffset>>);

impl StepClock {
    pub fn new() -> Self {
        let start = DateTime::parse_from_rfc3339("2025-03-01T09:00:00+05:00").unwrap();
        Self(Mutex::new(start))
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let mut t = self.0.lock().unwrap();
        *t += Duration::seconds(1);
        *t
    }
}

/// Source that emits a fixed list of events, signals `done`, then idles
/// until cancelled.
///
/// With `watch` set, it records whether that address still accepted
/// connections at the moment it was cancelled.
pub struct ScriptedSource {
    pub events: Vec<InboundEvent>,
    pub started: Arc<AtomicBool>,
    pub done: CancellationToken,
    pub watch: Option<SocketAddr>,
    pub open_at_cancel: Arc<Mutex<Option<bool>>>,
}

impl ScriptedSource {
    pub fn new(events: Vec<InboundEvent>) -> Self {
        Self {
            events,
            started: Arc::new(AtomicBool::new(false)),
            done: CancellationToken::new(),
            watch: None,
            open_at_cancel: Arc::new(Mutex::new(None)),
        }
    }

    pub fn watching(mut self, addr: SocketAddr) -> Self {
        self.watch = Some(addr);
        self
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn listen(
        &mut self,
        inbound_tx: mpsc::Sender<InboundEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), ChannelError> {
        self.started.store(true, Ordering::SeqCst);
        for event in self.events.drain(..) {
            if inbound_tx.send(event).await.is_err() {
                break;
            }
        }
        self.done.cancel();
        shutdown.cancelled().await;
        if let Some(addr) = self.watch {
            let open = tokio::net::TcpStream::connect(addr).await.is_ok();
            *self.open_at_cancel.lock().unwrap() = Some(open);
        }
        Ok(())
    }
}

/// Source whose credentials are rejected immediately.
pub struct RejectedSource;

#[async_trait]
impl EventSource for RejectedSource {
    fn name(&self) -> &str {
        "rejected"
    }

    async fn listen(
        &mut self,
        _inbound_tx: mpsc::Sender<InboundEvent>,
        _shutdown: CancellationToken,
    ) -> Result<(), ChannelError> {
        Err(ChannelError::Auth("Unauthorized".into()))
    }
}

pub fn ann() -> UserIdentity {
    UserIdentity::new("5001", "Ann").with_handle("ann_learns")
}

pub fn event(sender: &UserIdentity, text: &str) -> InboundEvent {
    InboundEvent::from_text("telegram", sender.external_id.clone(), sender.clone(), text)
}
