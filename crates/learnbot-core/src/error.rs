/// Core error types for learnbot.
#[derive(Debug, thiserror::Error)]
pub enum LearnbotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing service could not be reached or failed server-side.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store rejected credentials ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// A row with the same primary key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request reached the store but was refused (unknown column, bad filter, ...).
    #[error("Rejected ({status}{}): {message}", code_suffix(.code))]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Neither known touch-timestamp column was accepted.
    #[error("No touch column accepted by table {table}")]
    SchemaMismatch { table: String },

    #[error("Failed to parse store response: {0}")]
    Parse(String),
}

impl StoreError {
    /// Whether a retry with a different column set could succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, StoreError::Rejected { .. })
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(", {c}")).unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Failed to parse update: {0}")]
    Parse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Store connectivity check failed: {0}")]
    StoreUnreachable(#[source] StoreError),

    #[error("Event source stopped: {0}")]
    Channel(#[from] ChannelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_with_code() {
        let err = StoreError::Rejected {
            status: 400,
            code: Some("PGRST204".into()),
            message: "Could not find the 'last_interaction' column".into(),
        };
        assert_eq!(
            err.to_string(),
            "Rejected (400, PGRST204): Could not find the 'last_interaction' column"
        );
        assert!(err.is_rejection());
    }

    #[test]
    fn test_rejected_display_without_code() {
        let err = StoreError::Rejected {
            status: 404,
            code: None,
            message: "not found".into(),
        };
        assert_eq!(err.to_string(), "Rejected (404): not found");
    }

    #[test]
    fn test_unavailable_is_not_rejection() {
        assert!(!StoreError::Unavailable("timeout".into()).is_rejection());
        assert!(!StoreError::Conflict("dup".into()).is_rejection());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Missing("SUPABASE_URL");
        assert_eq!(
            err.to_string(),
            "Missing required environment variable SUPABASE_URL"
        );
        let wrapped: LearnbotError = err.into();
        assert!(wrapped.to_string().starts_with("Configuration error:"));
    }
}
