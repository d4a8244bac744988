//! Local filesystem backend.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use bananas_protocol::{ContentType, Md5Sum, UniqueId};

use crate::error::StorageError;
use crate::{ContentStream, Storage, archive_path};

/// Backend serving blobs from a directory tree.
#[derive(Debug)]
pub struct LocalStorage {
    folder: PathBuf,
}

impl LocalStorage {
    /// Serve blobs from the given root folder.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    async fn list_names(&self, dir: PathBuf) -> Result<Vec<String>, StorageError> {
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StorageError::Io { path: dir, source }),
        };

        let mut names = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(dir_entry)) => {
                    names.push(dir_entry.file_name().to_string_lossy().into_owned());
                }
                Ok(None) => break,
                Err(source) => return Err(StorageError::Io { path: dir, source }),
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_projects(&self, content_type: ContentType) -> Result<Vec<String>, StorageError> {
        self.list_names(self.folder.join(content_type.folder_name()))
            .await
    }

    async fn list_archives(
        &self,
        content_type: ContentType,
        unique_id_hex: &str,
    ) -> Result<Vec<String>, StorageError> {
        self.list_names(
            self.folder
                .join(content_type.folder_name())
                .join(unique_id_hex),
        )
        .await
    }

    async fn get_stream(
        &self,
        content_type: ContentType,
        unique_id: UniqueId,
        md5sum: Md5Sum,
    ) -> Result<Box<dyn ContentStream>, StorageError> {
        let path = self
            .folder
            .join(archive_path(content_type, unique_id, md5sum));

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.display().to_string()));
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        let filesize = file
            .metadata()
            .await
            .map_err(|source| StorageError::Io { path, source })?
            .len();

        Ok(Box::new(FileStream {
            file,
            remaining: filesize,
        }))
    }

    fn clear_cache(&self) {
        // Nothing cached: the filesystem is authoritative on every call.
    }
}

/// Read stream over a local file; eof tracks the size seen at open time.
struct FileStream {
    file: File,
    remaining: u64,
}

#[async_trait]
impl ContentStream for FileStream {
    async fn read(&mut self, count: usize) -> Result<Bytes, StorageError> {
        let mut buf = vec![0u8; count.min(self.remaining as usize)];
        let read = self
            .file
            .read(&mut buf)
            .await
            .map_err(|err| StorageError::StreamRead(err.to_string()))?;
        if read == 0 && self.remaining > 0 {
            // The file shrank under us; without this check the sender
            // would spin on empty frames forever.
            return Err(StorageError::StreamRead(
                "file truncated mid-transfer".to_string(),
            ));
        }
        buf.truncate(read);
        self.remaining -= read as u64;
        Ok(Bytes::from(buf))
    }

    fn eof(&self) -> bool {
        self.remaining == 0
    }
}
