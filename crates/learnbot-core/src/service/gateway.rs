use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::channel::telegram::{TelegramClient, TelegramPoller};
use crate::channel::{ChatTransport, EventSource};
use crate::config::{Config, DEFAULT_PORT, DEFAULT_SHUTDOWN_GRACE_SECS};
use crate::error::{ChannelError, GatewayError, LearnbotError, StoreError};
use crate::store::postgrest::PostgrestStore;
use crate::store::StoreClient;
use crate::util::{Clock, SystemClock};

use super::dispatch::Dispatcher;
use super::liveness;
use super::reconcile::Reconciler;

const INBOUND_CAPACITY: usize = 256;

/// Runs the bot: liveness endpoint, startup check, event source and dispatcher.
pub struct Gateway {
    store: StoreClient,
    dispatcher: Arc<Dispatcher>,
    source: Box<dyn EventSource>,
    liveness_addr: SocketAddr,
    grace: Duration,
}

enum Stop {
    Signal,
    Source(Result<Result<(), ChannelError>, JoinError>),
}

impl Gateway {
    pub fn new(
        store: StoreClient,
        transport: Arc<dyn ChatTransport>,
        source: Box<dyn EventSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let reconciler = Reconciler::new(store.clone(), clock);
        Self {
            store,
            dispatcher: Arc::new(Dispatcher::new(reconciler, transport)),
            source,
            liveness_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }

    /// Wire up the Supabase store and Telegram transport from `config`.
    pub fn from_config(config: &Config) -> Result<Self, LearnbotError> {
        let store = StoreClient::new(
            Arc::new(PostgrestStore::new(&config.store)?),
            config.tables.clone(),
        );
        let telegram = TelegramClient::new(&config.telegram)?;
        let source = Box::new(TelegramPoller::new(telegram.clone()));

        Ok(Self::new(store, Arc::new(telegram), source, Arc::new(SystemClock))
            .with_liveness_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.liveness.port)))
            .with_grace(config.shutdown_grace))
    }

    pub fn with_liveness_addr(mut self, addr: SocketAddr) -> Self {
        self.liveness_addr = addr;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Run until `shutdown` resolves or the event source fails.
    pub async fn run<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()>,
    {
        let Gateway {
            store,
            dispatcher,
            mut source,
            liveness_addr,
            grace,
        } = self;

        let liveness_token = CancellationToken::new();
        let liveness_task = liveness::spawn(liveness_addr, liveness_token.clone());

        info!("Testing store connection...");
        if let Err(e) = store.check_connectivity().await {
            error!("Store connection failed: {}", e);
            for hint in remediation_hints(&e) {
                warn!("Hint: {}", hint);
            }
            stop_liveness(liveness_token, liveness_task, grace).await;
            error!("Bot not started due to store connection issues");
            return Err(GatewayError::StoreUnreachable(e));
        }
        info!("Store connection successful");

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let dispatch_task = tokio::spawn(dispatcher.run(inbound_rx));

        let source_token = CancellationToken::new();
        let source_name = source.name().to_string();
        let mut source_task = {
            let token = source_token.clone();
            tokio::spawn(async move { source.listen(inbound_tx, token).await })
        };
        info!(source = %source_name, "Bot is running");

        let stop = tokio::select! {
            _ = shutdown => Stop::Signal,
            res = &mut source_task => Stop::Source(res),
        };

        stop_liveness(liveness_token, liveness_task, grace).await;

        let result = match stop {
            Stop::Signal => {
                info!("Shutdown requested, stopping {}", source_name);
                source_token.cancel();
                match tokio::time::timeout(grace, &mut source_task).await {
                    Ok(res) => {
                        // Errors during a requested stop are not fatal
                        if let Err(e) = flatten(res) {
                            warn!(source = %source_name, "Source stopped with error: {}", e);
                        }
                        Ok(())
                    }
                    Err(_) => {
                        warn!(source = %source_name, "Source did not stop within {:?}", grace);
                        source_task.abort();
                        Ok(())
                    }
                }
            }
            Stop::Source(res) => {
                let res = flatten(res);
                if let Err(e) = &res {
                    error!(source = %source_name, "Source stopped: {}", e);
                }
                res
            }
        };

        match tokio::time::timeout(grace, dispatch_task).await {
            Ok(Ok(())) => info!("Dispatcher drained"),
            Ok(Err(e)) => error!("Dispatcher failed: {}", e),
            Err(_) => warn!("Dispatcher did not drain within {:?}", grace),
        }

        result
    }
}

fn flatten(res: Result<Result<(), ChannelError>, JoinError>) -> Result<(), GatewayError> {
    match res {
        Ok(inner) => inner.map_err(GatewayError::from),
        Err(e) => Err(GatewayError::Io(std::io::Error::other(e))),
    }
}

async fn stop_liveness(token: CancellationToken, task: JoinHandle<()>, grace: Duration) {
    token.cancel();
    if tokio::time::timeout(grace, task).await.is_err() {
        warn!("Liveness endpoint did not stop within {:?}", grace);
    }
}

/// Suggestions for fixing a failed startup connectivity check.
pub fn remediation_hints(err: &StoreError) -> Vec<&'static str> {
    match err {
        StoreError::Unauthorized { .. } => vec![
            "Check that SUPABASE_KEY is correct",
            "Use the service_role key, not the anon key",
        ],
        StoreError::Rejected { .. } | StoreError::SchemaMismatch { .. } => vec![
            "Verify that the waitlist table (WAITLIST_TABLE) exists",
            "Check that SUPABASE_KEY is correct",
        ],
        StoreError::Unavailable(_) => vec![
            "Check network connectivity to the Supabase server",
            "Verify SUPABASE_URL",
        ],
        StoreError::Conflict(_) | StoreError::Parse(_) => {
            vec!["Verify SUPABASE_URL points at a Supabase project"]
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_by_error() {
        let unauthorized = StoreError::Unauthorized {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert!(remediation_hints(&unauthorized)
            .iter()
            .any(|h| h.contains("service_role")));

        let down = StoreError::Unavailable("connection refused".into());
        assert!(remediation_hints(&down)
            .iter()
            .any(|h| h.contains("network")));

        let missing = StoreError::Rejected {
            status: 404,
            code: Some("42P01".into()),
            message: "relation does not exist".into(),
        };
        assert!(remediation_hints(&missing)
            .iter()
            .any(|h| h.contains("WAITLIST_TABLE")));
    }

    #[test]
    fn test_flatten_join_results() {
        assert!(flatten(Ok(Ok(()))).is_ok());
        assert!(matches!(
            flatten(Ok(Err(ChannelError::Auth("Unauthorized".into())))),
            Err(GatewayError::Channel(ChannelError::Auth(_)))
        ));
    }
}
