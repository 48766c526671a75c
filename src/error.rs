use serde::Serialize;
use thiserror::Error;

/// Media stream kind, used to attribute encoder faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Engine-wide error type
///
/// Transport faults (`Connect`, `Send`) are recoverable: the session retries
/// them per its reconnect policy and only surfaces `RetryExhausted` to the
/// listener once attempts run out. `Config` is rejected synchronously at
/// `start()`. Encoder faults follow the per-media fault policy.
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Encoder error [{media}]: {reason}")]
    Encoder { media: MediaKind, reason: String },

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LiveError {
    /// Whether the session may recover from this fault via the reconnect policy
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LiveError::Connect(_) | LiveError::Send(_))
    }
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, LiveError>;
