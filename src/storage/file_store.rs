// src/storage/file_store.rs
//! Static file host backend.
//!
//! Documents live at `<root>/<collection>/<name>` and are served by the
//! HTTP layer under `<base_url>/<collection>/<name>`, so a document's URL
//! is known before it is written and self-referencing documents need a
//! single write.
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never sees a truncated document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::fs;
use uuid::Uuid;

use crate::error::PublicationError;
use crate::storage::publisher::{
    join_url, strip_base, DocumentKey, DocumentPublisher, Publication, StorageHandle, StoredDocument,
};
use crate::utils::crypto::document_etag;

#[derive(Debug, Clone)]
pub struct FileStore {
    base_url: String,
    root: PathBuf,
}

impl FileStore {
    /// # Arguments
    /// * `base_url` - Public URL the `root` directory is served under
    /// * `root` - Directory holding the published collections
    pub fn new(base_url: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        FileStore { base_url: base_url.into(), root: root.into() }
    }

    fn path_for(&self, relative: &str) -> Result<PathBuf, PublicationError> {
        let safe = !relative.is_empty()
            && relative
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
        if !safe {
            return Err(PublicationError::NotFound(relative.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn write_atomically(path: &Path, body: &[u8]) -> Result<(), PublicationError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&staging, body).await?;
        if let Err(e) = fs::rename(&staging, path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read(&self, handle: &StorageHandle) -> Result<Vec<u8>, PublicationError> {
        match fs::read(self.path_for(&handle.0)?).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PublicationError::NotFound(handle.0.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn publication(&self, relative: String, body: &[u8]) -> Publication {
        Publication {
            url: join_url(&self.base_url, &relative),
            handle: StorageHandle(relative),
            version: document_etag(body),
        }
    }
}

#[async_trait]
impl DocumentPublisher for FileStore {
    fn resolve_url(&self, key: &DocumentKey) -> Option<String> {
        Some(join_url(&self.base_url, &key.path()))
    }

    fn locate(&self, url: &str) -> Option<StorageHandle> {
        strip_base(&self.base_url, url).map(|path| StorageHandle(path.to_string()))
    }

    async fn create(&self, key: &DocumentKey, body: &[u8]) -> Result<Publication, PublicationError> {
        let relative = key.path();
        let path = self.path_for(&relative)?;

        if fs::try_exists(&path).await? {
            let existing = fs::read(&path).await?;
            return Err(PublicationError::Conflict {
                handle: relative,
                expected: "absent".into(),
                found: document_etag(&existing),
            });
        }

        Self::write_atomically(&path, body).await?;
        debug!("wrote {}", path.display());
        Ok(self.publication(relative, body))
    }

    async fn overwrite(
        &self,
        handle: &StorageHandle,
        body: &[u8],
        expected_version: Option<&str>,
    ) -> Result<Publication, PublicationError> {
        let current = self.read(handle).await?;
        if let Some(expected) = expected_version {
            let found = document_etag(&current);
            if found != expected {
                return Err(PublicationError::Conflict {
                    handle: handle.0.clone(),
                    expected: expected.to_string(),
                    found,
                });
            }
        }

        Self::write_atomically(&self.path_for(&handle.0)?, body).await?;
        debug!("rewrote {}", handle);
        Ok(self.publication(handle.0.clone(), body))
    }

    async fn fetch(&self, handle: &StorageHandle) -> Result<StoredDocument, PublicationError> {
        let body = self.read(handle).await?;
        Ok(StoredDocument { version: document_etag(&body), body })
    }

    async fn remove(&self, handle: &StorageHandle) -> Result<(), PublicationError> {
        match fs::remove_file(self.path_for(&handle.0)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PublicationError::NotFound(handle.0.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
