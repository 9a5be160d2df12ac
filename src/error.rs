//! Error types for fcp-client.

use thiserror::Error;

/// Main error type for all session operations.
#[derive(Debug, Error)]
pub enum FcpError {
    /// I/O error on the node stream or a payload source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream to the node could not be opened.
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        /// Address that was dialled.
        target: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Operation attempted while the session is closed or terminated.
    #[error("Connection is not connected")]
    NotConnected,

    /// `connect` was called on a session that has already been used.
    #[error("Session already connected")]
    AlreadyConnected,

    /// Malformed or unexpected line in the inbound stream.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Payload could not be transferred in full, or its length is unusable.
    #[error("Payload error: {0}")]
    Payload(String),
}

impl FcpError {
    /// Build a decode error for an unexpected line.
    pub(crate) fn unexpected_line(line: &str) -> Self {
        FcpError::Decode(format!("Unexpected line: {line}"))
    }

    /// Build a payload error for a transfer that ended early.
    pub(crate) fn short_payload(copied: u64, expected: u64) -> Self {
        FcpError::Payload(format!(
            "stream ended after {copied} of {expected} payload bytes"
        ))
    }
}

/// Result type alias using FcpError.
pub type Result<T> = std::result::Result<T, FcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            FcpError::NotConnected.to_string(),
            "Connection is not connected"
        );
        assert_eq!(
            FcpError::unexpected_line("garbage").to_string(),
            "Decode error: Unexpected line: garbage"
        );
        assert_eq!(
            FcpError::short_payload(3, 5).to_string(),
            "Payload error: stream ended after 3 of 5 payload bytes"
        );
    }

    #[test]
    fn test_connect_error_keeps_source() {
        use std::error::Error as _;

        let err = FcpError::Connect {
            target: "localhost:9481".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };

        assert!(err.to_string().starts_with("Failed to connect to localhost:9481"));
        assert!(err.source().is_some());
    }
}
