use std::fmt;

use runwatch_core::RunId;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("timeout")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("undecodable response: {0}")]
    Decode(String),
    #[error("runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl ChannelError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ChannelError::InvalidUrl(_) => FailureKind::InvalidUrl,
            ChannelError::HttpStatus(code) => FailureKind::HttpStatus(*code),
            ChannelError::Timeout => FailureKind::Timeout,
            ChannelError::Network(_) | ChannelError::Runtime(_) => FailureKind::Network,
            ChannelError::Decode(_) => FailureKind::Decode,
        }
    }
}

/// Coarse failure class, for logs and tests that do not care about messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "decode error"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("run rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("engine stopped")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The server started a run; the id is absent if it did not report one.
    Started { run_id: Option<RunId> },
    /// The server declined without error (for example, a run is already going).
    Skipped { reason: String },
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
