use std::fmt;

use bytes::Bytes;
use monitor_core::{FailureClass, MonitorEvent, MonitorView, TransportFailure};

/// What the engine hands back to the presentation thread.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutput {
    View(MonitorView),
    Event(MonitorEvent),
    Download(Result<Bytes, ChannelError>),
}

/// The monitor loop thread has exited; no further output will arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("monitor loop has stopped")]
pub struct MonitorClosed;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ChannelError {
    pub kind: FailureKind,
    pub message: String,
}

impl ChannelError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self.kind {
            FailureKind::Timeout => FailureClass::Timeout,
            _ => FailureClass::Other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

impl From<&ChannelError> for TransportFailure {
    fn from(err: &ChannelError) -> Self {
        TransportFailure {
            class: err.class(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    /// The backend answered but declined the submission.
    Rejected,
    Decode,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Rejected => write!(f, "rejected"),
            FailureKind::Decode => write!(f, "invalid response body"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}
