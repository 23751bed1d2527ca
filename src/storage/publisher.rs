// src/storage/publisher.rs
//! Publication collaborator abstraction.
//!
//! A publisher persists JSON documents at publicly resolvable URLs and lets
//! the engine overwrite them later. Backends:
//! - [`FileStore`](crate::storage::file_store::FileStore): static file host, URLs known before the first write
//! - [`MemoryStore`](crate::storage::memory_store::MemoryStore): in-process, same URL scheme
//! - [`GistClient`](crate::storage::gist_client::GistClient): GitHub gists, URLs assigned by the host
//!
//! Every stored document carries a content version (see
//! [`document_etag`](crate::utils::crypto::document_etag)). Overwrites may
//! name the version they expect to replace; a mismatch is a
//! [`PublicationError::Conflict`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PublicationError;

/// Opaque backend reference to a stored document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct StorageHandle(pub String);

impl fmt::Display for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a new document should go: a collection (directory) and file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKey {
    pub collection: String,
    pub name: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, name: impl Into<String>) -> Self {
        DocumentKey { collection: collection.into(), name: name.into() }
    }

    /// Pre-allocates a random `<uuid>.json` name in `collection`.
    pub fn generate(collection: &str) -> Self {
        DocumentKey::new(collection, format!("{}.json", Uuid::new_v4()))
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.name)
    }
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub url: String,
    pub handle: StorageHandle,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub body: Vec<u8>,
    pub version: String,
}

#[async_trait]
pub trait DocumentPublisher: Send + Sync {
    /// Public URL a document stored under `key` will have, when the backend
    /// can compute it before writing. `None` means the host assigns it.
    fn resolve_url(&self, key: &DocumentKey) -> Option<String>;

    /// Maps a public URL produced by this backend back to its handle.
    fn locate(&self, url: &str) -> Option<StorageHandle>;

    /// Writes a new document. Fails with `Conflict` if `key` is taken.
    async fn create(&self, key: &DocumentKey, body: &[u8]) -> Result<Publication, PublicationError>;

    /// Replaces an existing document, optionally only if it is still at
    /// `expected_version`.
    async fn overwrite(
        &self,
        handle: &StorageHandle,
        body: &[u8],
        expected_version: Option<&str>,
    ) -> Result<Publication, PublicationError>;

    async fn fetch(&self, handle: &StorageHandle) -> Result<StoredDocument, PublicationError>;

    async fn remove(&self, handle: &StorageHandle) -> Result<(), PublicationError>;
}

/// Largest `max_retries` a [`RetryPolicy`] should be configured with.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Upper bound on a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Timeout and retry bounds applied at the publication boundary.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry up to [`MAX_BACKOFF`].
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Wraps a backend with per-call timeouts and bounded retries of transient
/// failures. Conflicts and missing documents are returned immediately.
pub struct RetryingPublisher {
    inner: Arc<dyn DocumentPublisher>,
    policy: RetryPolicy,
}

impl RetryingPublisher {
    pub fn new(inner: Arc<dyn DocumentPublisher>, policy: RetryPolicy) -> Self {
        RetryingPublisher { inner, policy }
    }

    async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, PublicationError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, PublicationError>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(PublicationError::Timeout(self.policy.timeout.as_millis() as u64)),
            };

            match outcome {
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt);
                    attempt += 1;
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation,
                        attempt,
                        self.policy.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl DocumentPublisher for RetryingPublisher {
    fn resolve_url(&self, key: &DocumentKey) -> Option<String> {
        self.inner.resolve_url(key)
    }

    fn locate(&self, url: &str) -> Option<StorageHandle> {
        self.inner.locate(url)
    }

    async fn create(&self, key: &DocumentKey, body: &[u8]) -> Result<Publication, PublicationError> {
        self.run("create", || self.inner.create(key, body)).await
    }

    async fn overwrite(
        &self,
        handle: &StorageHandle,
        body: &[u8],
        expected_version: Option<&str>,
    ) -> Result<Publication, PublicationError> {
        self.run("overwrite", || self.inner.overwrite(handle, body, expected_version))
            .await
    }

    async fn fetch(&self, handle: &StorageHandle) -> Result<StoredDocument, PublicationError> {
        self.run("fetch", || self.inner.fetch(handle)).await
    }

    async fn remove(&self, handle: &StorageHandle) -> Result<(), PublicationError> {
        self.run("remove", || self.inner.remove(handle)).await
    }
}

/// Joins a base URL and a relative document path.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Inverse of [`join_url`]: the relative path of `url` under `base_url`.
pub(crate) fn strip_base<'a>(base_url: &str, url: &'a str) -> Option<&'a str> {
    let rest = url.strip_prefix(base_url.trim_end_matches('/'))?;
    let path = rest.strip_prefix('/')?;
    let safe = !path.is_empty()
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    safe.then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` fetches with a transient error.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        error: fn() -> PublicationError,
    }

    #[async_trait]
    impl DocumentPublisher for Flaky {
        fn resolve_url(&self, _key: &DocumentKey) -> Option<String> {
            None
        }

        fn locate(&self, _url: &str) -> Option<StorageHandle> {
            None
        }

        async fn create(&self, _key: &DocumentKey, _body: &[u8]) -> Result<Publication, PublicationError> {
            Err(PublicationError::Unsupported("create"))
        }

        async fn overwrite(
            &self,
            _handle: &StorageHandle,
            _body: &[u8],
            _expected_version: Option<&str>,
        ) -> Result<Publication, PublicationError> {
            Err(PublicationError::Unsupported("overwrite"))
        }

        async fn fetch(&self, _handle: &StorageHandle) -> Result<StoredDocument, PublicationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            Ok(StoredDocument { body: b"{}".to_vec(), version: "v".into() })
        }

        async fn remove(&self, _handle: &StorageHandle) -> Result<(), PublicationError> {
            Ok(())
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(500),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    fn flaky(failures: u32, error: fn() -> PublicationError) -> Arc<Flaky> {
        Arc::new(Flaky { failures, calls: AtomicU32::new(0), error })
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let inner = flaky(2, || PublicationError::Rejected { status: 503, body: String::new() });
        let publisher = RetryingPublisher::new(inner.clone(), policy(3));

        let doc = publisher.fetch(&StorageHandle("x".into())).await.unwrap();
        assert_eq!(doc.body, b"{}");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let inner = flaky(10, || PublicationError::Timeout(1));
        let publisher = RetryingPublisher::new(inner.clone(), policy(2));

        let err = publisher.fetch(&StorageHandle("x".into())).await.unwrap_err();
        assert!(matches!(err, PublicationError::Timeout(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let inner = flaky(10, || PublicationError::NotFound("x".into()));
        let publisher = RetryingPublisher::new(inner.clone(), policy(5));

        let err = publisher.fetch(&StorageHandle("x".into())).await.unwrap_err();
        assert!(matches!(err, PublicationError::NotFound(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    /// Answers fetches only after `delay`.
    struct Slow {
        delay: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DocumentPublisher for Slow {
        fn resolve_url(&self, _key: &DocumentKey) -> Option<String> {
            None
        }

        fn locate(&self, _url: &str) -> Option<StorageHandle> {
            None
        }

        async fn create(&self, _key: &DocumentKey, _body: &[u8]) -> Result<Publication, PublicationError> {
            Err(PublicationError::Unsupported("create"))
        }

        async fn overwrite(
            &self,
            _handle: &StorageHandle,
            _body: &[u8],
            _expected_version: Option<&str>,
        ) -> Result<Publication, PublicationError> {
            Err(PublicationError::Unsupported("overwrite"))
        }

        async fn fetch(&self, _handle: &StorageHandle) -> Result<StoredDocument, PublicationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(StoredDocument { body: b"{}".to_vec(), version: "v".into() })
        }

        async fn remove(&self, _handle: &StorageHandle) -> Result<(), PublicationError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_is_cut_off() {
        let inner = Arc::new(Slow { delay: Duration::from_secs(60), calls: AtomicU32::new(0) });
        let publisher = RetryingPublisher::new(inner.clone(), policy(2));

        let started = tokio::time::Instant::now();
        let err = publisher.fetch(&StorageHandle("x".into())).await.unwrap_err();
        assert!(matches!(err, PublicationError::Timeout(500)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_within_timeout_succeeds() {
        let inner = Arc::new(Slow { delay: Duration::from_millis(100), calls: AtomicU32::new(0) });
        let publisher = RetryingPublisher::new(inner.clone(), policy(2));

        assert!(publisher.fetch(&StorageHandle("x".into())).await.is_ok());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_many_retries_do_not_overflow_backoff() {
        let inner = flaky(u32::MAX, || PublicationError::Timeout(1));
        let publisher = RetryingPublisher::new(
            inner.clone(),
            RetryPolicy { timeout: Duration::from_millis(500), max_retries: 40, backoff: Duration::ZERO },
        );

        let err = publisher.fetch(&StorageHandle("x".into())).await.unwrap_err();
        assert!(matches!(err, PublicationError::Timeout(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 41);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RetryPolicy { backoff: Duration::from_millis(200), ..RetryPolicy::default() };
        assert_eq!(policy.delay(0), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(1600));
        assert_eq!(policy.delay(20), MAX_BACKOFF);
        assert_eq!(policy.delay(40), MAX_BACKOFF);
    }

    #[test]
    fn test_url_helpers() {
        assert_eq!(join_url("https://h/", "/a/b.json"), "https://h/a/b.json");
        assert_eq!(strip_base("https://h", "https://h/a/b.json"), Some("a/b.json"));
        assert_eq!(strip_base("https://h/", "https://h/a/b.json"), Some("a/b.json"));
        assert_eq!(strip_base("https://h", "https://h/../etc/passwd"), None);
        assert_eq!(strip_base("https://h", "https://other/a.json"), None);
        assert_eq!(strip_base("https://h", "https://h"), None);
    }
}
