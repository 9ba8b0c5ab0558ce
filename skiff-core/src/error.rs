//! Skiff Error Types
//!
//! Every fallible client operation returns [`SkiffError`]. Nothing is retried
//! or swallowed internally: errors surface to the caller of the operation that
//! triggered them.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for Skiff operations
#[derive(Error, Debug)]
pub enum SkiffError {
    /// Socket failure during connect, send or receive (including EOF)
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// Received data does not match the frame grammar or expected frame type
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Unsubscribe referenced a subscription id that is not registered
    #[error("Not subscribed: sid {0}")]
    NotSubscribed(u64),

    /// Server URL could not be parsed
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Handshake timeout
    #[error("Handshake timeout after {0:?}")]
    HandshakeTimeout(Duration),

    /// Broker reported an error with `-ERR`
    #[error("Broker error: {0}")]
    Broker(String),

    /// Payload exceeds the broker's advertised `max_payload`
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Frame-level protocol violations.
///
/// Always fatal to the read that produced them: the stream is never
/// resynchronized by skipping data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame type is unknown or not valid in the current context
    #[error("Unexpected frame: {0:?}")]
    UnexpectedFrame(String),

    /// Frame type recognized but its fields do not parse
    #[error("Malformed {verb} frame: {reason}")]
    MalformedFrame { verb: &'static str, reason: String },
}

/// Result type alias for Skiff operations
pub type Result<T> = std::result::Result<T, SkiffError>;

impl ProtocolError {
    /// Create an unexpected frame error from the offending line
    pub fn unexpected(line: impl Into<String>) -> Self {
        Self::UnexpectedFrame(line.into())
    }

    /// Create a malformed frame error for `verb`
    pub fn malformed(verb: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            verb,
            reason: reason.into(),
        }
    }
}

impl SkiffError {
    /// Create an invalid URL error
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    /// Check if this is a frame grammar or frame type error
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Check if this is a connection error
    ///
    /// Connection errors leave the transport unusable; the caller decides
    /// whether to `reconnect`.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Transport(e) => !matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            Self::HandshakeTimeout(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = SkiffError::from(ProtocolError::malformed("MSG", "invalid size \"abc\""));
        assert!(err.is_protocol_error());
        assert_eq!(
            err.to_string(),
            "Protocol error: Malformed MSG frame: invalid size \"abc\""
        );
    }

    #[test]
    fn test_connection_error_classification() {
        let eof = SkiffError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "closed"));
        assert!(eof.is_connection_error());

        let timeout = SkiffError::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(!timeout.is_connection_error());

        assert!(!SkiffError::NotSubscribed(3).is_connection_error());
    }
}
