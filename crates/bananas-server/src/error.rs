//! Error types for the content server.
//!
//! All errors use thiserror for consistent error handling across the codebase.

use thiserror::Error;

use bananas_index::IndexError;
use bananas_protocol::PacketError;
use bananas_storage::StorageError;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required flag for the selected mode is missing
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    /// A flag value could not be interpreted
    #[error("invalid configuration value for {flag}: {reason}")]
    InvalidValue {
        /// Flag name
        flag: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Server runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the content listener
    #[error("failed to bind content server to {addr}: {source}")]
    ContentBindFailed {
        /// Address that failed to bind
        addr: std::net::SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind the web listener
    #[error("failed to bind web server to {addr}: {source}")]
    WebBindFailed {
        /// Address that failed to bind
        addr: std::net::SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reload error
    #[error(transparent)]
    Reload(#[from] ReloadError),

    /// Metric registration failed
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Server shutdown error
    #[error("server shutdown error: {0}")]
    Shutdown(String),
}

/// Failures of a catalog reload; the previous snapshot stays in service.
#[derive(Debug, Error)]
pub enum ReloadError {
    /// Enumerating the storage backend failed
    #[error("storage enumeration failed: {0}")]
    Storage(#[from] StorageError),

    /// The index build failed
    #[error("index build failed: {0}")]
    Index(#[from] IndexError),

    /// The isolated build worker died
    #[error("reload worker failed: {0}")]
    Worker(String),
}

/// Per-connection failures; none of these outlive the connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer violated the wire protocol
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// The peer went away or the transport is closing; never logged as an
    /// error
    #[error("socket closed")]
    SocketClosed,

    /// A storage backend failed while serving this connection
    #[error("storage failed: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ConnectionError {
    fn from(err: StorageError) -> Self {
        match err {
            // A mid-transfer read failure looks like a closed socket to the
            // client; it reconnects and retries.
            StorageError::StreamRead(_) => Self::SocketClosed,
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_read_downgrades_to_socket_closed() {
        let err: ConnectionError = StorageError::StreamRead("reset".to_string()).into();
        assert!(matches!(err, ConnectionError::SocketClosed));

        let err: ConnectionError = StorageError::NotFound("x".to_string()).into();
        assert!(matches!(err, ConnectionError::Storage(_)));
    }
}
