use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::ChatTransport;
use crate::session::{SessionState, SessionStates};
use crate::types::{Command, EventKind, InboundEvent, OutboundMessage};

use super::messages::{welcome_text, ECHO_TEXT, HELP_TEXT};
use super::reconcile::{ReconcileMode, Reconciler};

const TYPING_TIMEOUT: Duration = Duration::from_secs(2);

/// A lane with no traffic for this long is closed; the next event reopens it.
const LANE_IDLE: Duration = Duration::from_secs(300);

/// Which handler an event goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/start`: create or refresh records, welcome, begin the session.
    Greeting,
    /// `/help`: refresh existing records only, send the help text.
    Help,
    /// Free text inside an active session.
    SessionMessage,
    /// Free text with no active session.
    Fallback,
    /// Unknown commands.
    Ignored,
}

/// Routes inbound events to handlers and replies through the transport.
pub struct Dispatcher {
    reconciler: Reconciler,
    transport: Arc<dyn ChatTransport>,
    sessions: SessionStates,
    lane_idle: Duration,
}

impl Dispatcher {
    pub fn new(reconciler: Reconciler, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            reconciler,
            transport,
            sessions: SessionStates::new(),
            lane_idle: LANE_IDLE,
        }
    }

    /// Close a session's lane after `idle` without traffic.
    pub fn with_lane_idle(mut self, idle: Duration) -> Self {
        self.lane_idle = idle;
        self
    }

    pub fn sessions(&self) -> &SessionStates {
        &self.sessions
    }

    pub fn route(&self, event: &InboundEvent) -> Route {
        match &event.kind {
            EventKind::Command(Command::Start) => Route::Greeting,
            EventKind::Command(Command::Help) => Route::Help,
            EventKind::Command(Command::Other(_)) => Route::Ignored,
            EventKind::Text(_) => match self.sessions.get(&event.session_key()) {
                Some(SessionState::AwaitingFirstMessage) => Route::SessionMessage,
                None => Route::Fallback,
            },
        }
    }

    /// Handle one event to completion. Never fails; problems are logged.
    pub async fn handle(&self, event: &InboundEvent) -> Route {
        let route = self.route(event);
        let session = event.session_key();
        let user_id = event.sender.external_id.as_str();
        debug!(session = %session, user_id, route = ?route, "Routing event");

        let reply = match route {
            Route::Ignored => {
                debug!(session = %session, "Ignoring unrecognized command: {:?}", event.kind);
                return route;
            }
            Route::Greeting => {
                self.announce_typing(&event.chat_id).await;
                self.reconciler
                    .reconcile_all(&event.sender, ReconcileMode::Full)
                    .await;
                if self.sessions.begin(&session).is_some() {
                    debug!(session = %session, "Session restarted");
                }
                info!(session = %session, user_id, "Welcomed {}", event.sender.first_name);
                OutboundMessage::markdown(&event.chat_id, welcome_text(&event.sender.first_name))
            }
            Route::Help => {
                self.announce_typing(&event.chat_id).await;
                self.reconciler
                    .reconcile_all(&event.sender, ReconcileMode::TouchOnly)
                    .await;
                OutboundMessage::markdown(&event.chat_id, HELP_TEXT)
            }
            Route::SessionMessage | Route::Fallback => {
                self.announce_typing(&event.chat_id).await;
                self.reconciler
                    .reconcile_all(&event.sender, ReconcileMode::Full)
                    .await;
                OutboundMessage::new(&event.chat_id, ECHO_TEXT)
            }
        };

        if let Err(e) = self.transport.send(&reply).await {
            error!(
                session = %session,
                user_id,
                transport = self.transport.name(),
                "Failed to send reply: {}",
                e
            );
        }
        route
    }

    async fn announce_typing(&self, chat_id: &str) {
        match tokio::time::timeout(TYPING_TIMEOUT, self.transport.send_typing(chat_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(chat_id, "Typing indicator failed: {}", e),
            Err(_) => warn!(chat_id, "Typing indicator timed out"),
        }
    }

    /// Consume events until `inbound_rx` closes, then drain every lane.
    ///
    /// Each session gets its own lane so its events are handled in arrival
    /// order while other sessions proceed concurrently. A lane that closed
    /// while idle is replaced by one that first waits for it to finish.
    pub async fn run(self: Arc<Self>, mut inbound_rx: mpsc::Receiver<InboundEvent>) {
        let mut lanes: HashMap<String, Lane> = HashMap::new();

        while let Some(event) = inbound_rx.recv().await {
            let key = event.session_key();
            let (event, previous) = match lanes.remove(&key) {
                Some(lane) => match lane.tx.send(event) {
                    Ok(()) => {
                        lanes.insert(key, lane);
                        continue;
                    }
                    Err(mpsc::error::SendError(event)) => (event, Some(lane.task)),
                },
                None => (event, None),
            };

            lanes.retain(|_, lane| !lane.task.is_finished());

            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(event);
            let task = tokio::spawn(self.clone().lane(key.clone(), rx, previous));
            lanes.insert(key, Lane { tx, task });
        }

        info!(
            "Inbound stream closed, draining {} session lanes ({} sessions active)",
            lanes.len(),
            self.sessions.active()
        );
        let tasks: Vec<JoinHandle<()>> = lanes.into_values().map(|lane| lane.task).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Session lane failed: {}", e);
            }
        }
    }

    async fn lane(
        self: Arc<Self>,
        key: String,
        mut rx: mpsc::UnboundedReceiver<InboundEvent>,
        previous: Option<JoinHandle<()>>,
    ) {
        if let Some(previous) = previous {
            if let Err(e) = previous.await {
                error!(session = %key, "Session lane failed: {}", e);
            }
        }

        loop {
            match tokio::time::timeout(self.lane_idle, rx.recv()).await {
                Ok(Some(event)) => {
                    self.handle(&event).await;
                }
                Ok(None) => break,
                Err(_) => {
                    rx.close();
                    while let Ok(event) = rx.try_recv() {
                        self.handle(&event).await;
                    }
                    // Idle and awaiting states answer free text the same way
                    self.sessions.end(&key);
                    debug!(session = %key, "Closing idle session lane");
                    break;
                }
            }
        }
    }
}

/// Sender side of a session lane and the task draining it.
struct Lane {
    tx: mpsc::UnboundedSender<InboundEvent>,
    task: JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableNames;
    use crate::error::ChannelError;
    use crate::store::memory::MemoryStore;
    use crate::store::StoreClient;
    use crate::types::{TextFormat, UserIdentity};
    use crate::util::SystemClock;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<OutboundMessage>>,
        typing: Mutex<Vec<String>>,
        fail_typing: bool,
        send_delay: Duration,
    }

    #[async_trait]
    impl ChatTransport for Recorder {
        fn name(&self) -> &str {
            "test"
        }

        async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
            self.typing.lock().unwrap().push(chat_id.to_string());
            if self.fail_typing {
                return Err(ChannelError::Connection("down".into()));
            }
            Ok(())
        }

        async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
            if !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    fn dispatcher(store: Arc<MemoryStore>, transport: Arc<Recorder>) -> Dispatcher {
        let reconciler = Reconciler::new(
            StoreClient::new(store, TableNames::default()),
            Arc::new(SystemClock),
        );
        Dispatcher::new(reconciler, transport)
    }

    fn event(chat: &str, text: &str) -> InboundEvent {
        InboundEvent::from_text("test", chat, UserIdentity::new(chat, "Ann"), text)
    }

    #[tokio::test]
    async fn test_routes() {
        let d = dispatcher(Arc::new(MemoryStore::new()), Arc::new(Recorder::default()));
        assert_eq!(d.route(&event("1", "/start")), Route::Greeting);
        assert_eq!(d.route(&event("1", "/help")), Route::Help);
        assert_eq!(d.route(&event("1", "/quiz")), Route::Ignored);
        assert_eq!(d.route(&event("1", "hi")), Route::Fallback);

        d.sessions().begin("test:1");
        assert_eq!(d.route(&event("1", "hi")), Route::SessionMessage);
        assert_eq!(d.route(&event("2", "hi")), Route::Fallback);
    }

    #[tokio::test]
    async fn test_greeting_begins_session() {
        let transport = Arc::new(Recorder::default());
        let d = dispatcher(Arc::new(MemoryStore::new()), transport.clone());

        assert_eq!(d.handle(&event("1", "/start")).await, Route::Greeting);
        assert_eq!(d.sessions().get("test:1"), Some(SessionState::AwaitingFirstMessage));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].format, TextFormat::Markdown);
        assert!(sent[0].content.contains("Hello *Ann*!"));
        assert_eq!(*transport.typing.lock().unwrap(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_ignored_command_sends_nothing() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(Recorder::default());
        let d = dispatcher(store.clone(), transport.clone());

        assert_eq!(d.handle(&event("1", "/quiz")).await, Route::Ignored);
        assert!(transport.sent.lock().unwrap().is_empty());
        assert!(transport.typing.lock().unwrap().is_empty());
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_typing_failure_still_replies() {
        let transport = Arc::new(Recorder {
            fail_typing: true,
            ..Default::default()
        });
        let d = dispatcher(Arc::new(MemoryStore::new()), transport.clone());

        d.handle(&event("1", "hi")).await;
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, ECHO_TEXT);
        assert_eq!(sent[0].format, TextFormat::Plain);
    }

    #[tokio::test]
    async fn test_help_does_not_create_records() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(Recorder::default());
        let d = dispatcher(store.clone(), transport.clone());

        d.handle(&event("1", "/help")).await;
        assert!(store.rows("tgbot_waitlist").is_empty());
        assert!(store.rows("simplelearn_users").is_empty());
        assert_eq!(transport.sent.lock().unwrap()[0].content, HELP_TEXT);
    }

    #[tokio::test]
    async fn test_run_preserves_session_order() {
        let transport = Arc::new(Recorder::default());
        let d = Arc::new(dispatcher(Arc::new(MemoryStore::new()), transport.clone()));
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(d.clone().run(rx));

        tx.send(event("1", "/start")).await.unwrap();
        tx.send(event("2", "/help")).await.unwrap();
        tx.send(event("1", "/help")).await.unwrap();
        tx.send(event("1", "hi")).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let sent = transport.sent.lock().unwrap();
        let chat1: Vec<&str> = sent
            .iter()
            .filter(|m| m.chat_id == "1")
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(chat1.len(), 3);
        assert!(chat1[0].starts_with("*Welcome"));
        assert_eq!(chat1[1], HELP_TEXT);
        assert_eq!(chat1[2], ECHO_TEXT);
        assert_eq!(sent.iter().filter(|m| m.chat_id == "2").count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reopened_lane_keeps_order() {
        let transport = Arc::new(Recorder {
            send_delay: Duration::from_millis(10),
            ..Default::default()
        });
        let d = Arc::new(
            dispatcher(Arc::new(MemoryStore::new()), transport.clone())
                .with_lane_idle(Duration::from_millis(5)),
        );
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(d.clone().run(rx));

        for i in 0..20 {
            let sender = UserIdentity::new("1", format!("N{}", i));
            tx.send(InboundEvent::from_text("test", "1", sender, "/start"))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(tx);
        handle.await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 20);
        for (i, msg) in sent.iter().enumerate() {
            assert!(
                msg.content.contains(&format!("Hello *N{}*!", i)),
                "reply {} out of order: {}",
                i,
                msg.content
            );
        }
    }

    #[tokio::test]
    async fn test_idle_lane_forgets_session() {
        let transport = Arc::new(Recorder::default());
        let d = Arc::new(
            dispatcher(Arc::new(MemoryStore::new()), transport.clone())
                .with_lane_idle(Duration::from_millis(10)),
        );
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(d.clone().run(rx));

        tx.send(event("1", "/start")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(d.sessions().get("test:1"), None);
        assert_eq!(d.sessions().active(), 0);

        tx.send(event("1", "hi")).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].content, ECHO_TEXT);
    }
}
