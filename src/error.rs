//! Error types for the panel bot.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Dialog error: {0}")]
    Dialog(#[from] DialogError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistent store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Messaging gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to send message to {destination}: {reason}")]
    SendFailed { destination: String, reason: String },

    #[error("Failed to delete messages in {chat}: {reason}")]
    DeleteFailed { chat: String, reason: String },

    #[error("Chat {0} not found")]
    ChatNotFound(String),

    #[error("Gateway disconnected: {0}")]
    Disconnected(String),

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Dialog engine errors.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Handler for state {state} failed: {reason}")]
    Handler { state: String, reason: String },

    #[error("Handler for state {state} panicked: {reason}")]
    HandlerPanicked { state: String, reason: String },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
