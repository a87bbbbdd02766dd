//! Error taxonomy for the stream and state-synchronization core.
//!
//! Every variant is handled inside the component that produces it. None of
//! them stop the console event loop.

/// Errors raised by sessions, the control channel, the frame pipeline and
/// the REST collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    /// Connect, send or HTTP transport failure. Triggers a reconnect.
    Transport(String),
    /// Malformed frame, pose or image payload. The item is dropped.
    Decode(String),
    /// Unknown or unsupported event/message type. Ignored and logged.
    Protocol(String),
    /// Pose update that raced a disconnect-clear. The clear wins.
    StateConflict(String),
    /// REST endpoint answered with a non-success status.
    Http {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, verbatim.
        message: String,
    },
}

impl ConsoleError {
    /// Short category name used in log lines and indicators.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::Protocol(_) => "protocol",
            Self::StateConflict(_) => "state-conflict",
            Self::Http { .. } => "http",
        }
    }
}

impl std::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Transport error: {msg}"),
            Self::Decode(msg) => write!(f, "Decode error: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::StateConflict(msg) => write!(f, "State conflict: {msg}"),
            Self::Http { status, message } => write!(f, "HTTP {status}: {message}"),
        }
    }
}

impl std::error::Error for ConsoleError {}

impl From<reqwest::Error> for ConsoleError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(format!("HTTP request failed: {e}"))
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(format!("invalid JSON: {e}"))
    }
}
