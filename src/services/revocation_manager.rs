// src/services/revocation_manager.rs
//! Revocation list lifecycle.
//!
//! The manager owns every write to a revocation list: creation, the
//! optional second write that fills in self references, and revocations.
//!
//! # Self references
//! A list's `id` is its own public URL and its `issuer` is the issuer
//! profile's URL. When the backend can compute URLs up front, the list is
//! written once with both already correct. Otherwise it is created with an
//! empty `id` and [`RevocationListManager::finalize`] rewrites it once the
//! URL is known. A list in that intermediate state is refused by
//! [`RevocationListManager::revoke`].
//!
//! # Concurrency
//! Writes to one list are serialised through a per-handle async mutex, and
//! each overwrite names the version it read, so a writer in another process
//! causes a retry instead of a lost update.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{IssuanceError, PublicationError, Result};
use crate::models::revocation_list::RevocationList;
use crate::storage::publisher::{DocumentKey, DocumentPublisher, StorageHandle};
use crate::utils::serialization::{iso_timestamp, parse_document, render_document};

pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// A revocation list as last written by this manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedList {
    pub url: String,
    pub handle: StorageHandle,
    pub version: String,
    pub document: RevocationList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationOutcome {
    Revoked,
    AlreadyRevoked,
}

type WriterMap = Mutex<HashMap<StorageHandle, Arc<AsyncMutex<()>>>>;

pub struct RevocationListManager {
    publisher: Arc<dyn DocumentPublisher>,
    collection: String,
    conflict_retries: u32,
    writers: WriterMap,
}

/// Claim on a list's writer lock. The map entry is dropped together with the
/// last outstanding lease, so only lists with a write in flight are tracked.
struct WriterLease<'a> {
    writers: &'a WriterMap,
    handle: StorageHandle,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for WriterLease<'_> {
    fn drop(&mut self) {
        let mut writers = self.writers.lock().unwrap_or_else(|p| p.into_inner());
        // the map's reference and this lease's
        if Arc::strong_count(&self.lock) == 2 {
            writers.remove(&self.handle);
        }
    }
}

fn render(list: &RevocationList) -> Result<Vec<u8>> {
    render_document(list).map_err(|e| IssuanceError::Publication(e.into()))
}

impl RevocationListManager {
    pub fn new(publisher: Arc<dyn DocumentPublisher>, collection: impl Into<String>) -> Self {
        RevocationListManager {
            publisher,
            collection: collection.into(),
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Pre-allocates a storage slot for a new list.
    pub fn allocate(&self) -> DocumentKey {
        DocumentKey::generate(&self.collection)
    }

    /// URL the list stored under `key` will have, if the backend knows it in advance.
    pub fn planned_url(&self, key: &DocumentKey) -> Option<String> {
        self.publisher.resolve_url(key)
    }

    /// Handle of a list published by this manager's backend.
    pub fn locate(&self, url: &str) -> Result<StorageHandle> {
        self.publisher.locate(url).ok_or_else(|| {
            IssuanceError::Validation(format!("{} is not a revocation list this host publishes", url))
        })
    }

    fn writer(&self, handle: &StorageHandle) -> WriterLease<'_> {
        let mut writers = self.writers.lock().unwrap_or_else(|p| p.into_inner());
        let lock = writers.entry(handle.clone()).or_default().clone();
        WriterLease { writers: &self.writers, handle: handle.clone(), lock }
    }

    /// Writes a new, empty list for the issuer at `issuer_url`.
    ///
    /// With a pre-computable URL the list is complete after this call.
    /// Otherwise its `id` is empty and [`finalize`](Self::finalize) must follow.
    pub async fn create(&self, key: &DocumentKey, issuer_url: &str) -> Result<PublishedList> {
        let own_url = self.planned_url(key).unwrap_or_default();
        let document = RevocationList::new(own_url, issuer_url);

        let publication = self.publisher.create(key, &render(&document)?).await?;
        info!("created revocation list {} ({})", publication.url, publication.handle);

        Ok(PublishedList {
            url: publication.url,
            handle: publication.handle,
            version: publication.version,
            document,
        })
    }

    /// Rewrites the list with its own URL as `id` and `issuer_url` as issuer.
    ///
    /// # Errors
    /// [`IssuanceError::IncompletePublication`] carrying the list's handle if
    /// the rewrite fails; the stored list is then still in its first-write state.
    pub async fn finalize(&self, list: &PublishedList, issuer_url: &str) -> Result<PublishedList> {
        let lease = self.writer(&list.handle);
        let _guard = lease.lock.lock().await;

        let document = RevocationList {
            id: list.url.clone(),
            issuer: issuer_url.to_string(),
            ..list.document.clone()
        };
        if document == list.document {
            return Ok(list.clone());
        }

        let publication = self
            .publisher
            .overwrite(&list.handle, &render(&document)?, Some(&list.version))
            .await
            .map_err(|source| IssuanceError::IncompletePublication {
                handle: list.handle.clone(),
                source,
            })?;
        debug!("finalized revocation list {}", publication.url);

        Ok(PublishedList {
            url: publication.url,
            handle: publication.handle,
            version: publication.version,
            document,
        })
    }

    /// Deletes a list, used to compensate a failed registration.
    pub async fn discard(&self, handle: &StorageHandle) -> Result<()> {
        self.publisher.remove(handle).await?;
        warn!("discarded revocation list {}", handle);
        Ok(())
    }

    pub async fn fetch(&self, handle: &StorageHandle) -> Result<RevocationList> {
        let stored = self.publisher.fetch(handle).await?;
        parse_document(&stored.body).map_err(|e| IssuanceError::Publication(e.into()))
    }

    /// Adds `assertion_id` to the list. Revoking an id twice leaves the list
    /// as it was after the first call.
    pub async fn revoke(
        &self,
        handle: &StorageHandle,
        assertion_id: &str,
        reason: Option<String>,
    ) -> Result<RevocationOutcome> {
        if assertion_id.trim().is_empty() {
            return Err(IssuanceError::Validation("assertion id is required".into()));
        }

        let lease = self.writer(handle);
        let _guard = lease.lock.lock().await;

        for attempt in 0..=self.conflict_retries {
            let stored = self.publisher.fetch(handle).await?;
            let mut list: RevocationList = parse_document(&stored.body)
                .map_err(|e| IssuanceError::Publication(e.into()))?;

            if !list.is_complete() {
                return Err(IssuanceError::Validation(format!(
                    "revocation list {} has not been finalized",
                    handle
                )));
            }

            if !list.revoke(assertion_id, iso_timestamp(Utc::now()), reason.clone()) {
                debug!("{} already revoked on {}", assertion_id, list.id);
                return Ok(RevocationOutcome::AlreadyRevoked);
            }

            match self
                .publisher
                .overwrite(handle, &render(&list)?, Some(&stored.version))
                .await
            {
                Ok(_) => {
                    info!("revoked {} on {}", assertion_id, list.id);
                    return Ok(RevocationOutcome::Revoked);
                }
                Err(PublicationError::Conflict { .. }) => {
                    warn!(
                        "revocation list {} changed during update (attempt {}), re-reading",
                        handle,
                        attempt + 1
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IssuanceError::RevocationConflict(handle.to_string()))
    }
}
