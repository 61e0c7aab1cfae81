//! Client error types

use slotkv_protocol::{FrameHeader, ProtocolError};
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised by the slotkv client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Framing or socket error on the connection
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Failed to connect to the server
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        /// Server address
        addr: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The server did not answer in time
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// The server closed the connection
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// The client has not been initialized or was closed
    #[error("Client not initialized")]
    NotInitialized,

    /// The server answered with a frame for a different request
    #[error("Expected response {expected}, got {actual}")]
    UnexpectedResponse {
        /// Header of the request
        expected: FrameHeader,
        /// Header received
        actual: FrameHeader,
    },

    /// A value does not match the configured value length
    #[error("Value length {actual} does not match configured length {expected}")]
    InvalidValueLength {
        /// Configured fixed value length
        expected: usize,
        /// Length of the value supplied
        actual: usize,
    },

    /// The key maps to the value reserved for empty index buckets
    #[error("Key {0} is reserved")]
    ReservedKey(u64),

    /// Configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the error came from the transport, so reconnecting and
    /// retrying the request may succeed.
    pub const fn is_transport(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_network(),
            Self::Connect { .. } | Self::Timeout(_) | Self::ConnectionClosed => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(ClientError::Protocol(ProtocolError::Network(io)).is_transport());
        assert!(ClientError::Timeout(Duration::from_secs(1)).is_transport());
        assert!(ClientError::ConnectionClosed.is_transport());

        assert!(!ClientError::NotInitialized.is_transport());
        assert!(!ClientError::ReservedKey(u64::MAX).is_transport());
        assert!(!ClientError::Protocol(ProtocolError::UnexpectedResponse(0x13)).is_transport());
    }

    #[test]
    fn test_error_messages() {
        let err = ClientError::UnexpectedResponse {
            expected: FrameHeader::from_byte(0x16),
            actual: FrameHeader::from_byte(0x12),
        };
        assert_eq!(err.to_string(), "Expected response READ@1, got SET@1");
    }
}
