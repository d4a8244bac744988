//! Error types for content blob backends.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The archive for an entry does not exist
    #[error("expected archive {0} to exist")]
    NotFound(String),

    /// Enumerating or opening a local path failed
    #[error("storage I/O on {path}: {source}")]
    Io {
        /// Path the operation touched
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The object-store client failed outside of a streaming read
    #[error("object store: {0}")]
    Backend(#[from] object_store::Error),

    /// A read failed mid-transfer; downgraded to a closed socket towards
    /// the client, which is expected to reconnect
    #[error("stream read failed: {0}")]
    StreamRead(String),
}
