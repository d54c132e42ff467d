//! Error types for the dispatch engine

use thiserror::Error;

/// Main error type for the dispatch engine
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Connection error when opening the dispatch channel
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON encode/decode error
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// Inbound message did not match any known shape
    #[error("Message parse error: {message}")]
    MessageParse {
        /// Error message
        message: String,
        /// Raw message data that failed to parse
        data: Option<serde_json::Value>,
    },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Endpoint URL could not be parsed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// No guard session or refresh token is available
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// REST contract call failed
    #[error("API error (status {status:?}): {message}")]
    Api {
        /// Error message
        message: String,
        /// HTTP status code, when the server answered
        status: Option<u16>,
    },

    /// Credential store could not be read or written
    #[error("Credential store error: {0}")]
    Store(String),

    /// Guard must acknowledge the not-responding warning first
    #[error("Status is locked until the not-responding warning is acknowledged")]
    AcknowledgementRequired,

    /// Intent needs a live intervention report and there is none
    #[error("No live intervention report")]
    NoLiveReport,

    /// A background engine task is no longer running
    #[error("Engine task stopped: {0}")]
    TaskStopped(String),
}

/// Result type alias for dispatch engine operations
pub type Result<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a message parse error
    pub fn message_parse(msg: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::MessageParse {
            message: msg.into(),
            data,
        }
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a not-authenticated error
    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::NotAuthenticated(msg.into())
    }

    /// Create an API error without an HTTP status
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api {
            message: msg.into(),
            status: None,
        }
    }

    /// Create an API error carrying the HTTP status the server answered with
    pub fn api_status(msg: impl Into<String>, status: u16) -> Self {
        Self::Api {
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create a credential store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a task-stopped error
    pub fn task_stopped(task: impl Into<String>) -> Self {
        Self::TaskStopped(task.into())
    }

    /// Whether this error means the user has to log in again
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::NotAuthenticated(_))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::api_status(err.to_string(), status.as_u16()),
            None if err.is_timeout() => Self::timeout(err.to_string()),
            None => Self::api(err.to_string()),
        }
    }
}
