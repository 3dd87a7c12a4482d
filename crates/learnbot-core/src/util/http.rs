use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Base HTTP client settings shared by the store and Telegram clients.
///
/// No overall request timeout is set here; callers that need one add it.
pub fn client_builder() -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent(concat!("learnbot/", env!("CARGO_PKG_VERSION")))
}
