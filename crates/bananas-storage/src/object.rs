//! Object-store backend for S3-compatible content buckets.
//!
//! The client is built lazily on first use so the backend can be
//! constructed before credentials or the network are available, and the
//! flat key listing is fetched once per reload to keep the listing API
//! call count independent of the catalog size.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use object_store::aws::AmazonS3Builder;
use object_store::{ObjectStore, path::Path as ObjectPath};
use parking_lot::Mutex;
use tracing::info;

use bananas_protocol::{ContentType, Md5Sum, UniqueId};

use crate::error::StorageError;
use crate::{ContentStream, Storage, archive_path};

/// Backend serving blobs from an S3-compatible bucket.
pub struct ObjectStorage {
    bucket: String,
    endpoint: Option<String>,
    client: Mutex<Option<Arc<dyn ObjectStore>>>,
    listing: Mutex<Option<Arc<Vec<String>>>>,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ObjectStorage {
    /// Serve blobs from the given bucket; credentials come from the
    /// environment.
    pub fn new(bucket: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint,
            client: Mutex::new(None),
            listing: Mutex::new(None),
        }
    }

    fn client(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let mut guard = self.client.lock();
        if let Some(client) = guard.as_ref() {
            return Ok(Arc::clone(client));
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&self.bucket);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        let client: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
        *guard = Some(Arc::clone(&client));
        Ok(client)
    }

    /// The flat key listing of the whole bucket, fetched once per reload.
    async fn listing(&self) -> Result<Arc<Vec<String>>, StorageError> {
        if let Some(listing) = self.listing.lock().as_ref() {
            return Ok(Arc::clone(listing));
        }

        let client = self.client()?;
        let mut keys = Vec::new();
        let mut stream = client.list(None);
        while let Some(meta) = stream.next().await {
            keys.push(meta?.location.to_string());
        }
        drop(stream);
        info!("Cached {} object keys from bucket {}", keys.len(), self.bucket);

        let listing = Arc::new(keys);
        *self.listing.lock() = Some(Arc::clone(&listing));
        Ok(listing)
    }

    async fn segments_under(
        &self,
        prefix: String,
        segment: usize,
    ) -> Result<Vec<String>, StorageError> {
        let listing = self.listing().await?;
        let names: BTreeSet<String> = listing
            .iter()
            .filter(|key| key.starts_with(&prefix))
            .filter_map(|key| key.split('/').nth(segment))
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    async fn list_projects(&self, content_type: ContentType) -> Result<Vec<String>, StorageError> {
        self.segments_under(format!("{}/", content_type.folder_name()), 1)
            .await
    }

    async fn list_archives(
        &self,
        content_type: ContentType,
        unique_id_hex: &str,
    ) -> Result<Vec<String>, StorageError> {
        self.segments_under(
            format!("{}/{unique_id_hex}/", content_type.folder_name()),
            2,
        )
        .await
    }

    async fn get_stream(
        &self,
        content_type: ContentType,
        unique_id: UniqueId,
        md5sum: Md5Sum,
    ) -> Result<Box<dyn ContentStream>, StorageError> {
        let key = archive_path(content_type, unique_id, md5sum);
        let client = self.client()?;

        let result = match client.get(&ObjectPath::from(key.as_str())).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key));
            }
            Err(err) => return Err(err.into()),
        };

        let remaining = result.meta.size;
        Ok(Box::new(ObjectStream {
            stream: result.into_stream(),
            buffer: BytesMut::new(),
            remaining,
        }))
    }

    fn clear_cache(&self) {
        // Reset both the lazily built client and the key listing; the next
        // reload rebuilds them from scratch.
        *self.client.lock() = None;
        *self.listing.lock() = None;
    }
}

/// Read stream over one object; chunk boundaries of the transport are
/// hidden behind an internal buffer.
struct ObjectStream {
    stream: BoxStream<'static, object_store::Result<Bytes>>,
    buffer: BytesMut,
    remaining: usize,
}

#[async_trait]
impl ContentStream for ObjectStream {
    async fn read(&mut self, count: usize) -> Result<Bytes, StorageError> {
        while self.buffer.len() < count {
            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => return Err(StorageError::StreamRead(err.to_string())),
                None => break,
            }
        }

        let take = count.min(self.buffer.len());
        if take == 0 && self.remaining > 0 {
            return Err(StorageError::StreamRead(
                "object ended before its announced size".to_string(),
            ));
        }
        let chunk = self.buffer.split_to(take).freeze();
        self.remaining = self.remaining.saturating_sub(chunk.len());
        Ok(chunk)
    }

    fn eof(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_cache_resets_lazy_state() {
        let storage = ObjectStorage::new("bananas", None);
        *storage.listing.lock() = Some(Arc::new(vec!["newgrf/01020304/ab.tar.gz".to_string()]));
        storage.clear_cache();
        assert!(storage.listing.lock().is_none());
        assert!(storage.client.lock().is_none());
    }

    #[tokio::test]
    async fn test_segment_filtering_from_cached_listing() {
        let storage = ObjectStorage::new("bananas", None);
        *storage.listing.lock() = Some(Arc::new(vec![
            "newgrf/01020304/aaaa.tar.gz".to_string(),
            "newgrf/01020304/bbbb.tar.gz".to_string(),
            "newgrf/0a0b0c0d/cccc.tar.gz".to_string(),
            "scenario/11111111/dddd.tar.gz".to_string(),
        ]));

        let projects = storage.list_projects(ContentType::NewGrf).await.unwrap();
        assert_eq!(projects, vec!["01020304", "0a0b0c0d"]);

        let archives = storage
            .list_archives(ContentType::NewGrf, "01020304")
            .await
            .unwrap();
        assert_eq!(archives, vec!["aaaa.tar.gz", "bbbb.tar.gz"]);

        let scenarios = storage.list_projects(ContentType::Scenario).await.unwrap();
        assert_eq!(scenarios, vec!["11111111"]);
    }
}
