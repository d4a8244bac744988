//! Content blob backends for the OpenTTD content server.
//!
//! A backend enumerates the content tree and opens read streams by
//! `(type, unique_id, md5sum)`. Two implementations exist: the local
//! filesystem and an S3-compatible object store, both laying blobs out as
//! `{folder-name}/{unique_id_hex}/{md5_hex}.tar.gz`.

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod local;
pub mod object;

use async_trait::async_trait;
use bytes::Bytes;

use bananas_protocol::{ContentType, Md5Sum, UniqueId};

pub use error::StorageError;
pub use local::LocalStorage;
pub use object::ObjectStorage;

/// A scoped read stream over one archive.
///
/// Dropping the stream releases the underlying resource.
#[async_trait]
pub trait ContentStream: Send {
    /// Read up to `count` bytes; an empty result never occurs before
    /// [`ContentStream::eof`] turns true.
    async fn read(&mut self, count: usize) -> Result<Bytes, StorageError>;

    /// Whether the archive has been fully consumed.
    fn eof(&self) -> bool;
}

/// A content blob backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Hex project ids stored under one category folder.
    async fn list_projects(&self, content_type: ContentType) -> Result<Vec<String>, StorageError>;

    /// Archive filenames stored under one project folder.
    async fn list_archives(
        &self,
        content_type: ContentType,
        unique_id_hex: &str,
    ) -> Result<Vec<String>, StorageError>;

    /// Open a read stream over one archive.
    async fn get_stream(
        &self,
        content_type: ContentType,
        unique_id: UniqueId,
        md5sum: Md5Sum,
    ) -> Result<Box<dyn ContentStream>, StorageError>;

    /// Drop per-process caches (listings, lazily built clients) so a
    /// reload starts from a clean slate.
    fn clear_cache(&self);
}

/// Relative blob path shared by both backends.
pub(crate) fn archive_path(
    content_type: ContentType,
    unique_id: UniqueId,
    md5sum: Md5Sum,
) -> String {
    format!(
        "{}/{}/{}.tar.gz",
        content_type.folder_name(),
        unique_id.to_hex(),
        md5sum.to_hex()
    )
}
