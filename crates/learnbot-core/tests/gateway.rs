mod common;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{ann, event, RecordingTransport, RejectedSource, ScriptedSource, StepClock};
use learnbot_core::config::TableNames;
use learnbot_core::error::{ChannelError, GatewayError, StoreError};
use learnbot_core::service::gateway::Gateway;
use learnbot_core::store::memory::MemoryStore;
use learnbot_core::store::StoreClient;

fn local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn gateway(
    store: Arc<MemoryStore>,
    transport: Arc<RecordingTransport>,
    source: Box<dyn learnbot_core::channel::EventSource>,
) -> Gateway {
    Gateway::new(
        StoreClient::new(store, TableNames::default()),
        transport,
        source,
        Arc::new(StepClock::new()),
    )
    .with_liveness_addr(local())
    .with_grace(Duration::from_secs(2))
}

#[tokio::test]
async fn test_unreachable_store_never_starts_source() {
    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    let transport = Arc::new(RecordingTransport::default());
    let source = ScriptedSource::new(vec![event(&ann(), "/start")]);
    let started = source.started.clone();

    let gw = gateway(store, transport.clone(), Box::new(source));
    let result = gw.run(std::future::pending::<()>()).await;

    assert!(matches!(
        result,
        Err(GatewayError::StoreUnreachable(StoreError::Unavailable(_)))
    ));
    assert!(!started.load(Ordering::SeqCst));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_events_are_handled_until_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::default());
    let user = ann();
    let source = ScriptedSource::new(vec![
        event(&user, "/start"),
        event(&user, "/help"),
        event(&user, "/unknown"),
        event(&user, "thanks"),
    ]);
    let done = source.done.clone();

    let gw = gateway(store.clone(), transport.clone(), Box::new(source));
    let result = gw.run(async move { done.cancelled().await }).await;

    assert!(result.is_ok());
    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].content.contains("Ann"));
    assert_eq!(store.rows("tgbot_waitlist").len(), 1);
    assert_eq!(store.rows("simplelearn_users").len(), 1);
}

#[tokio::test]
async fn test_rejected_token_stops_gateway() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::default());

    let gw = gateway(store, transport.clone(), Box::new(RejectedSource));
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        gw.run(std::future::pending::<()>()),
    )
    .await
    .expect("gateway returns on its own");

    assert!(matches!(
        result,
        Err(GatewayError::Channel(ChannelError::Auth(_)))
    ));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_liveness_answers_until_source_stops() {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::default());
    let source = ScriptedSource::new(vec![event(&ann(), "/start")]).watching(addr);
    let done = source.done.clone();
    let open_at_cancel = source.open_at_cancel.clone();

    let health = Arc::new(Mutex::new(None));
    let shutdown = {
        let health = health.clone();
        async move {
            done.cancelled().await;
            let client = reqwest::Client::builder()
                .pool_max_idle_per_host(0)
                .build()
                .unwrap();
            for _ in 0..50 {
                if let Ok(resp) = client.get(format!("http://{}/health", addr)).send().await {
                    *health.lock().unwrap() = Some(resp.status().as_u16());
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    };

    let gw = gateway(store, transport.clone(), Box::new(source)).with_liveness_addr(addr);
    let result = gw.run(shutdown).await;

    assert!(result.is_ok());
    assert_eq!(*health.lock().unwrap(), Some(200));
    assert_eq!(*open_at_cancel.lock().unwrap(), Some(false));
    assert_eq!(transport.sent().len(), 1);
}
