//! Session event types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::LiveError;
use crate::session::SessionState;

/// Error kinds surfaced through events and statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Connect,
    Send,
    Encoder,
    RetryExhausted,
    Io,
}

impl From<&LiveError> for ErrorKind {
    fn from(err: &LiveError) -> Self {
        match err {
            LiveError::Config(_) => ErrorKind::Config,
            LiveError::Connect(_) => ErrorKind::Connect,
            LiveError::Send(_) => ErrorKind::Send,
            LiveError::Encoder { .. } => ErrorKind::Encoder,
            LiveError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            LiveError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Statistics snapshot delivered periodically and on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    /// Frames dropped (idle pushes, queue overflow, stale timestamps)
    pub dropped_frames: u64,
    /// Transport connect faults
    pub connect_faults: u64,
    /// Transport send faults
    pub send_faults: u64,
    /// Encoder faults (both media types)
    pub encoder_faults: u64,
    /// Video frames pushed by the caller
    pub frames_pushed: u64,
    /// Packets handed to the transport
    pub packets_sent: u64,
    /// Total payload bytes handed to the transport
    pub bytes_sent: u64,
    /// Outgoing bitrate estimate over the last stats window, in bits/s
    pub bitrate_bps_estimate: u64,
    /// Current pending video frame queue depth
    pub queue_depth: usize,
}

/// Session event enumeration
///
/// Serializes as `{"event": "session.state_changed", "data": {...}}`,
/// one entry per listener callback.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// Session state changed
    #[serde(rename = "session.state_changed")]
    StateChanged {
        /// New state
        state: SessionState,
        /// Previous state
        previous: SessionState,
    },

    /// A surfaced error (ConfigError is returned synchronously instead;
    /// transient transport faults appear only in statistics)
    #[serde(rename = "session.error")]
    Error {
        kind: ErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Periodic statistics update
    #[serde(rename = "session.statistics")]
    Statistics(StatsReport),
}

impl SessionEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "session.state_changed",
            Self::Error { .. } => "session.error",
            Self::Statistics(_) => "session.statistics",
        }
    }

    /// Build an error event from an engine error, stamped now
    pub fn error(err: &LiveError) -> Self {
        Self::Error {
            kind: ErrorKind::from(err),
            message: err.to_string(),
            timestamp: Utc::now(),
        }
    }
}
