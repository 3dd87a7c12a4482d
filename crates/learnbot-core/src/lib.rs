pub mod error;
pub mod types;
pub mod config;
pub mod util;
pub mod store;
pub mod channel;
pub mod session;
pub mod service;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const LOGO: &str = "🎓";
