// src/storage/memory_store.rs
//! In-process document host.
//!
//! Behaves like the static file host (URL = base URL + collection + name)
//! with atomic compare-and-swap overwrites. The `server_assigned` variant
//! hides URLs until the first write, the way gist-like hosts do, which
//! drives the engine's two-phase publication path.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::PublicationError;
use crate::storage::publisher::{
    join_url, strip_base, DocumentKey, DocumentPublisher, Publication, StorageHandle, StoredDocument,
};
use crate::utils::crypto::document_etag;

pub struct MemoryStore {
    base_url: String,
    server_assigned: bool,
    documents: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        MemoryStore {
            base_url: base_url.into(),
            server_assigned: false,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Host that only reveals a document's URL after creating it.
    pub fn server_assigned(base_url: impl Into<String>) -> Self {
        MemoryStore { server_assigned: true, ..MemoryStore::new(base_url) }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // a panic while holding the lock cannot leave a half-written map entry
        self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publication(&self, path: String, body: &[u8]) -> Publication {
        Publication {
            url: join_url(&self.base_url, &path),
            handle: StorageHandle(path),
            version: document_etag(body),
        }
    }
}

#[async_trait]
impl DocumentPublisher for MemoryStore {
    fn resolve_url(&self, key: &DocumentKey) -> Option<String> {
        if self.server_assigned {
            return None;
        }
        Some(join_url(&self.base_url, &key.path()))
    }

    fn locate(&self, url: &str) -> Option<StorageHandle> {
        strip_base(&self.base_url, url).map(|path| StorageHandle(path.to_string()))
    }

    async fn create(&self, key: &DocumentKey, body: &[u8]) -> Result<Publication, PublicationError> {
        let path = if self.server_assigned {
            format!("{}/{}/{}", key.collection, Uuid::new_v4().simple(), key.name)
        } else {
            key.path()
        };

        let mut documents = self.lock();
        if let Some(existing) = documents.get(&path) {
            return Err(PublicationError::Conflict {
                handle: path,
                expected: "absent".into(),
                found: document_etag(existing),
            });
        }
        documents.insert(path.clone(), body.to_vec());
        Ok(self.publication(path, body))
    }

    async fn overwrite(
        &self,
        handle: &StorageHandle,
        body: &[u8],
        expected_version: Option<&str>,
    ) -> Result<Publication, PublicationError> {
        let mut documents = self.lock();
        let current = documents
            .get(&handle.0)
            .ok_or_else(|| PublicationError::NotFound(handle.0.clone()))?;

        if let Some(expected) = expected_version {
            let found = document_etag(current);
            if found != expected {
                return Err(PublicationError::Conflict {
                    handle: handle.0.clone(),
                    expected: expected.to_string(),
                    found,
                });
            }
        }

        documents.insert(handle.0.clone(), body.to_vec());
        Ok(self.publication(handle.0.clone(), body))
    }

    async fn fetch(&self, handle: &StorageHandle) -> Result<StoredDocument, PublicationError> {
        let documents = self.lock();
        let body = documents
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| PublicationError::NotFound(handle.0.clone()))?;
        Ok(StoredDocument { version: document_etag(&body), body })
    }

    async fn remove(&self, handle: &StorageHandle) -> Result<(), PublicationError> {
        self.lock()
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| PublicationError::NotFound(handle.0.clone()))
    }
}
