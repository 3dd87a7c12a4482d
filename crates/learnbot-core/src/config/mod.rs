use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_KEY: &str = "SUPABASE_KEY";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_PORT: &str = "PORT";
pub const ENV_WAITLIST_TABLE: &str = "WAITLIST_TABLE";
pub const ENV_PROFILE_TABLE: &str = "PROFILE_TABLE";
pub const ENV_SHUTDOWN_GRACE_SECS: &str = "SHUTDOWN_GRACE_SECS";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WAITLIST_TABLE: &str = "tgbot_waitlist";
pub const DEFAULT_PROFILE_TABLE: &str = "simplelearn_users";
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Root configuration for learnbot, read from the process environment.
#[derive(Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub telegram: TelegramConfig,
    pub liveness: LivenessConfig,
    pub tables: TableNames,
    pub shutdown_grace: Duration,
}

#[derive(Clone)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct LivenessConfig {
    pub port: u16,
}

/// Physical names of the two logical tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub waitlist: String,
    pub user_profile: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            waitlist: DEFAULT_WAITLIST_TABLE.to_string(),
            user_profile: DEFAULT_PROFILE_TABLE.to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("store_url", &self.store.url)
            .field("store_key", &mask(&self.store.service_key))
            .field("telegram_token", &mask(&self.telegram.token))
            .field("port", &self.liveness.port)
            .field("tables", &self.tables)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values count as absent. Fails on the first missing credential.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let url = require(ENV_SUPABASE_URL)?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: ENV_SUPABASE_URL,
                message: format!("expected an http(s) URL, got '{}'", url),
            });
        }
        let service_key = require(ENV_SUPABASE_KEY)?;
        let token = require(ENV_TELEGRAM_BOT_TOKEN)?;

        let port = match get(ENV_PORT) {
            Some(v) => v.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: ENV_PORT,
                message: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let grace_secs = match get(ENV_SHUTDOWN_GRACE_SECS) {
            Some(v) => v.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: ENV_SHUTDOWN_GRACE_SECS,
                message: e.to_string(),
            })?,
            None => DEFAULT_SHUTDOWN_GRACE_SECS,
        };

        let tables = TableNames {
            waitlist: get(ENV_WAITLIST_TABLE).unwrap_or_else(|| DEFAULT_WAITLIST_TABLE.to_string()),
            user_profile: get(ENV_PROFILE_TABLE).unwrap_or_else(|| DEFAULT_PROFILE_TABLE.to_string()),
        };

        Ok(Self {
            store: StoreConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            },
            telegram: TelegramConfig { token },
            liveness: LivenessConfig { port },
            tables,
            shutdown_grace: Duration::from_secs(grace_secs),
        })
    }
}

/// Report which known keys are present in the environment, without values.
pub fn env_presence() -> Vec<(&'static str, bool)> {
    [
        ENV_SUPABASE_URL,
        ENV_SUPABASE_KEY,
        ENV_TELEGRAM_BOT_TOKEN,
        ENV_PORT,
        ENV_WAITLIST_TABLE,
        ENV_PROFILE_TABLE,
        ENV_SHUTDOWN_GRACE_SECS,
    ]
    .into_iter()
    .map(|key| {
        let set = std::env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false);
        (key, set)
    })
    .collect()
}

fn mask(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("****{}", tail)
    }
}
