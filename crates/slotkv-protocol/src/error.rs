//! Error types for protocol operations

use thiserror::Error;

/// Errors raised while encoding or decoding frames.
///
/// An incomplete frame is never an error: decoders report it as `Ok(None)`
/// and wait for more input.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying transport failure
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// Instance id does not fit in the header nibble
    #[error("Instance id {0} out of range (max {max})", max = crate::MAX_INSTANCES - 1)]
    InstanceOutOfRange(u8),

    /// A SET value does not match the configured value length
    #[error("Value length {actual} does not match configured length {expected}")]
    InvalidValueLength {
        /// Configured fixed value length
        expected: usize,
        /// Length of the value supplied
        actual: usize,
    },

    /// A length-prefixed payload is larger than the codec accepts
    #[error("Frame payload of {len} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        /// Announced payload length
        len: usize,
        /// Codec limit
        limit: usize,
    },

    /// The peer answered with a header the client cannot interpret
    #[error("Unexpected response header {0:#04x}")]
    UnexpectedResponse(u8),
}

impl ProtocolError {
    /// Check if the error came from the transport rather than from frame
    /// contents.
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
