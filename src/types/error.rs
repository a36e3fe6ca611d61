use super::constants::{ABORTED_MESSAGE, DEFAULT_ERROR_CODE};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised by the gateway connection itself.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// WebSocket protocol error (handshake failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// General connection error with descriptive message
    #[error("Connection error: {0}")]
    Connection(String),

    /// Proxy descriptor could not be parsed or the proxy refused the tunnel
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// Invalid gateway options
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error (malformed server address or proxy URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Attempted a socket write while the channel is not open
    #[error("Not connected")]
    NotConnected,
}

/// Convenience type alias for `Result<T, GatewayError>`.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures of a single relay task. Every variant ends up in an `error` frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The target could not be reached or the body could not be read
    #[error("{0}")]
    Transport(String),

    /// The target answered with a non-success status
    #[error("Failed with status: {0}")]
    HttpStatus(u16),

    /// The post-processing script failed
    #[error("{message}")]
    Script { message: String, code: Option<u16> },

    /// The task was cancelled before it produced an outcome
    #[error("{}", ABORTED_MESSAGE)]
    Cancelled,
}

impl TaskError {
    /// Code carried in the `error` frame.
    pub fn code(&self) -> u16 {
        match self {
            TaskError::HttpStatus(status) => *status,
            TaskError::Script {
                code: Some(code), ..
            } => *code,
            _ => DEFAULT_ERROR_CODE,
        }
    }
}

impl From<reqwest::Error> for TaskError {
    fn from(err: reqwest::Error) -> Self {
        TaskError::Transport(err.to_string())
    }
}
