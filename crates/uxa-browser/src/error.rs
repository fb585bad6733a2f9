//! Error types for the DevTools binding

use thiserror::Error;
use uxa_core::PageError;

#[derive(Error, Debug)]
pub enum CdpError {
    /// Browser binary missing or exited before announcing its endpoint
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid protocol message: {0}")]
    Json(#[from] serde_json::Error),

    /// The browser answered a command with an error object
    #[error("{method} failed ({code}): {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
    },

    /// A field the binding relies on was absent from a response
    #[error("{method} response missing {field}")]
    MissingField { method: String, field: &'static str },

    #[error("{method} timed out after {limit_ms}ms")]
    Timeout { method: String, limit_ms: u64 },

    #[error("devtools connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CdpResult<T> = std::result::Result<T, CdpError>;

impl From<CdpError> for PageError {
    fn from(err: CdpError) -> Self {
        match err {
            CdpError::Closed => PageError::Closed,
            CdpError::Timeout { method, limit_ms } => PageError::Timeout {
                operation: method,
                limit_ms,
            },
            CdpError::Io(e) => PageError::Io(e),
            other => PageError::Protocol(other.to_string()),
        }
    }
}
