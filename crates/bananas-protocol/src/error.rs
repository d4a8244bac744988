//! Error types for the content wire protocol.
//!
//! All errors use thiserror for consistent error handling across the codebase.

use thiserror::Error;

/// Wire-protocol violations.
///
/// Any of these closes the offending connection; they never propagate
/// across connections.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// The size of the packet is not as announced in its length prefix
    #[error("packet announces {announced} bytes but carries {actual}")]
    InvalidSize {
        /// Length taken from the 2-byte prefix
        announced: u16,
        /// Actual number of bytes in the frame
        actual: usize,
    },

    /// The type byte is not a valid incoming packet type
    #[error("invalid packet type {0}")]
    InvalidType(u8),

    /// The packet payload could not be decoded
    #[error("invalid packet data: {0}")]
    InvalidData(String),

    /// The packet is too big to transmit
    #[error("packet of {0} bytes exceeds the send MTU")]
    TooBig(usize),
}

impl PacketError {
    /// Shorthand for an [`PacketError::InvalidData`] with a formatted reason.
    pub fn invalid_data(reason: impl Into<String>) -> Self {
        Self::InvalidData(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PacketError::InvalidSize {
            announced: 10,
            actual: 7,
        };
        assert_eq!(err.to_string(), "packet announces 10 bytes but carries 7");

        let err = PacketError::TooBig(2000);
        assert_eq!(err.to_string(), "packet of 2000 bytes exceeds the send MTU");
    }
}
