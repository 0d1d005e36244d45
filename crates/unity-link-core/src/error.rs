//! Error types for the Unity link

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for Unity link operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Classification of a transport failure, used to pick a backoff cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Nothing listening on the port
    Refused,
    /// Peer reset or aborted the connection
    Reset,
    /// A bounded operation ran out of time
    TimedOut,
    /// Peer closed the stream mid-exchange
    Closed,
    /// Anything else
    Other,
}

impl TransportKind {
    /// Map an I/O error kind onto a transport class
    pub fn from_io_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::ConnectionRefused => TransportKind::Refused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportKind::Reset,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportKind::TimedOut,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::NotConnected => TransportKind::Closed,
            _ => TransportKind::Other,
        }
    }

    /// Failures the peer typically recovers from within a fraction of a second
    pub fn is_fast(self) -> bool {
        matches!(
            self,
            TransportKind::Refused | TransportKind::Reset | TransportKind::TimedOut
        )
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Refused => "refused",
            TransportKind::Reset => "reset",
            TransportKind::TimedOut => "timed out",
            TransportKind::Closed => "closed",
            TransportKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Unity link error types
#[derive(Debug, Error)]
pub enum LinkError {
    /// Caller passed a malformed command; never retried
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Connect, send or receive failed at the socket level
    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportKind,
        message: String,
    },

    /// Peer greeting did not negotiate an acceptable wire format
    #[error("Handshake rejected: {0}")]
    Handshake(String),

    /// Frame boundaries could not be recovered from the stream
    #[error("Framing error: {0}")]
    Framing(String),

    /// Peer answered with an error status
    #[error("Unity error: {0}")]
    Peer(String),

    /// Well-formed exchange with an unexpected reply shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No session could be established
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),
}

impl LinkError {
    /// Build a transport error from an I/O failure, keeping its class
    pub fn io(context: &str, err: io::Error) -> Self {
        LinkError::Transport {
            kind: TransportKind::from_io_kind(err.kind()),
            message: format!("{}: {}", context, err),
        }
    }

    /// Build a timeout transport error
    pub fn timed_out(context: impl Into<String>) -> Self {
        LinkError::Transport {
            kind: TransportKind::TimedOut,
            message: context.into(),
        }
    }

    /// Build an error for a stream the peer closed
    pub fn closed(context: impl Into<String>) -> Self {
        LinkError::Transport {
            kind: TransportKind::Closed,
            message: context.into(),
        }
    }

    /// Whether reconnecting and trying again could help
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LinkError::Transport { .. } | LinkError::Handshake(_) | LinkError::Framing(_)
        )
    }

    /// Whether this is a transient socket failure eligible for the short backoff cap
    pub fn is_fast_transient(&self) -> bool {
        match self {
            LinkError::Transport { kind, .. } => kind.is_fast(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Serialization(err.to_string())
    }
}
