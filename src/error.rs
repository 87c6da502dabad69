use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed inbound message (logged and dropped by the channel worker)
    #[error("Decode error: {0}")]
    Decode(String),

    /// No correlated reply arrived before the deadline
    #[error("Request '{action}' timed out after {timeout_ms}ms")]
    Timeout { action: String, timeout_ms: u64 },

    /// The signaling channel closed while a request was outstanding
    #[error("Signaling channel closed")]
    ChannelClosed,

    /// Operation invoked against a precondition violation
    #[error("Invalid state: {0}")]
    State(String),

    /// Requested media kind is not in the negotiated capability set
    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Channel adapter failure (connect or send)
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Media engine error: {0}")]
    Media(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a caller may reasonably retry the failed request.
    ///
    /// Only timeouts qualify; a closed channel will not come back by itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Timeout { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
