//! Error types for index loading.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors aborting a whole index build.
///
/// Per-entry problems are not fatal: they are logged and the entry is
/// skipped, so a single broken YAML file never takes the catalog down.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Failed to read part of the index tree
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Too many entries share one md5-tail base; the 24-bit id space has
    /// collided past the 8-bit counter
    #[error("more than 255 entries share content-id base {base:#08x}; aborting reload")]
    ContentIdSpaceExhausted {
        /// The colliding 24-bit base
        base: u32,
    },
}

/// Reasons a single entry version fails to load; logged, never propagated.
#[derive(Debug, Error)]
pub enum EntryError {
    /// The record file could not be read
    #[error("unreadable record: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML could not be parsed into a version record
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A field violates the client's length limits
    #[error("validation failed: {0}")]
    Validation(String),

    /// The partial digest does not match any stored archive
    #[error("md5sum-partial {0} does not match any stored file")]
    UnknownPartial(String),

    /// The entry would not fit a metadata frame
    #[error("entry would exceed the content packet size ({0} bytes)")]
    Oversize(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_message_names_base() {
        let err = IndexError::ContentIdSpaceExhausted { base: 0x00ab_cdef };
        assert!(err.to_string().contains("0xabcdef"));
    }
}
