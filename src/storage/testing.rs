// src/storage/testing.rs
//! Fault injection around [`MemoryStore`] for service tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PublicationError;
use crate::storage::memory_store::MemoryStore;
use crate::storage::publisher::{
    DocumentKey, DocumentPublisher, Publication, StorageHandle, StoredDocument,
};

/// What to do with overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteFault {
    /// Fail every overwrite with a server error.
    Reject,
    /// Report a version conflict on the first `n` overwrites.
    Conflict(u32),
}

pub struct FaultyPublisher {
    store: Arc<MemoryStore>,
    fault: OverwriteFault,
    pub overwrites: AtomicU32,
}

impl FaultyPublisher {
    pub fn new(store: Arc<MemoryStore>, fault: OverwriteFault) -> Self {
        FaultyPublisher {
            store,
            fault,
            overwrites: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DocumentPublisher for FaultyPublisher {
    fn resolve_url(&self, key: &DocumentKey) -> Option<String> {
        self.store.resolve_url(key)
    }

    fn locate(&self, url: &str) -> Option<StorageHandle> {
        self.store.locate(url)
    }

    async fn create(&self, key: &DocumentKey, body: &[u8]) -> Result<Publication, PublicationError> {
        self.store.create(key, body).await
    }

    async fn overwrite(
        &self,
        handle: &StorageHandle,
        body: &[u8],
        expected_version: Option<&str>,
    ) -> Result<Publication, PublicationError> {
        let call = self.overwrites.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            OverwriteFault::Reject => Err(PublicationError::Rejected {
                status: 500,
                body: "storage unavailable".into(),
            }),
            OverwriteFault::Conflict(n) if call < n => Err(PublicationError::Conflict {
                handle: handle.0.clone(),
                expected: expected_version.unwrap_or_default().to_string(),
                found: "moved".into(),
            }),
            OverwriteFault::Conflict(_) => self.store.overwrite(handle, body, expected_version).await,
        }
    }

    async fn fetch(&self, handle: &StorageHandle) -> Result<StoredDocument, PublicationError> {
        self.store.fetch(handle).await
    }

    async fn remove(&self, handle: &StorageHandle) -> Result<(), PublicationError> {
        self.store.remove(handle).await
    }
}
