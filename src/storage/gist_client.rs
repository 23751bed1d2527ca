// src/storage/gist_client.rs
//! GitHub gist document host.
//!
//! Gist ids are assigned by GitHub on creation, so a document's public URL
//! cannot be known before its first write. Documents published here go
//! through the two-phase create/update path.
//!
//! Handles have the form `<gist id>/<file name>`. Public URLs use the
//! revision-less raw form
//! `https://gist.githubusercontent.com/<owner>/<gist id>/raw/<file name>`,
//! which always serves the latest revision.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::PublicationError;
use crate::storage::publisher::{
    DocumentKey, DocumentPublisher, Publication, StorageHandle, StoredDocument,
};
use crate::utils::crypto::document_etag;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_RAW_URL: &str = "https://gist.githubusercontent.com";

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Gist {
    id: String,
    #[serde(default)]
    files: std::collections::HashMap<String, GistFile>,
}

#[derive(Clone)]
pub struct GistClient {
    http: Client,
    api_url: String,
    raw_url: String,
    token: String,
    owner: String,
}

impl GistClient {
    /// # Arguments
    /// * `api_url` - GitHub REST API root
    /// * `token` - Token with the `gist` scope
    /// * `owner` - Account login the gists are created under
    pub fn new(api_url: impl Into<String>, token: impl Into<String>, owner: impl Into<String>) -> Self {
        GistClient {
            http: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            raw_url: DEFAULT_RAW_URL.to_string(),
            token: token.into(),
            owner: owner.into(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "blockcerts-engine")
    }

    fn raw_link(&self, gist_id: &str, file: &str) -> String {
        format!("{}/{}/{}/raw/{}", self.raw_url, self.owner, gist_id, file)
    }

    fn split_handle(handle: &StorageHandle) -> Result<(&str, &str), PublicationError> {
        handle
            .0
            .split_once('/')
            .filter(|(id, file)| !id.is_empty() && !file.is_empty())
            .ok_or_else(|| PublicationError::NotFound(handle.0.clone()))
    }

    async fn check(response: Response, handle: &str) -> Result<Response, PublicationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PublicationError::NotFound(handle.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublicationError::Rejected { status: status.as_u16(), body })
    }

    fn files_payload(file: &str, body: &[u8]) -> Result<Value, PublicationError> {
        let content = std::str::from_utf8(body).map_err(|_| PublicationError::Rejected {
            status: 400,
            body: "document is not valid UTF-8".into(),
        })?;
        let mut files = Map::new();
        files.insert(file.to_string(), json!({ "content": content }));
        Ok(Value::Object(files))
    }
}

#[async_trait]
impl DocumentPublisher for GistClient {
    fn resolve_url(&self, _key: &DocumentKey) -> Option<String> {
        None
    }

    fn locate(&self, url: &str) -> Option<StorageHandle> {
        let rest = url.strip_prefix(&self.raw_url)?.strip_prefix('/')?;
        let mut parts = rest.split('/');
        let (_owner, id, raw, file) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if raw != "raw" || parts.next().is_some() {
            return None;
        }
        Some(StorageHandle(format!("{}/{}", id, file)))
    }

    async fn create(&self, key: &DocumentKey, body: &[u8]) -> Result<Publication, PublicationError> {
        let payload = json!({
            "description": key.collection,
            "public": true,
            "files": Self::files_payload(&key.name, body)?,
        });

        let response = self
            .authorized(self.http.post(format!("{}/gists", self.api_url)))
            .json(&payload)
            .send()
            .await?;
        let gist: Gist = Self::check(response, &key.path()).await?.json().await?;
        debug!("created gist {} for {}", gist.id, key.path());

        Ok(Publication {
            url: self.raw_link(&gist.id, &key.name),
            handle: StorageHandle(format!("{}/{}", gist.id, key.name)),
            version: document_etag(body),
        })
    }

    async fn overwrite(
        &self,
        handle: &StorageHandle,
        body: &[u8],
        expected_version: Option<&str>,
    ) -> Result<Publication, PublicationError> {
        let (gist_id, file) = Self::split_handle(handle)?;

        if let Some(expected) = expected_version {
            let current = self.fetch(handle).await?;
            if current.version != expected {
                return Err(PublicationError::Conflict {
                    handle: handle.0.clone(),
                    expected: expected.to_string(),
                    found: current.version,
                });
            }
        }

        let payload = json!({ "files": Self::files_payload(file, body)? });
        let response = self
            .authorized(self.http.patch(format!("{}/gists/{}", self.api_url, gist_id)))
            .json(&payload)
            .send()
            .await?;
        Self::check(response, &handle.0).await?;

        Ok(Publication {
            url: self.raw_link(gist_id, file),
            handle: handle.clone(),
            version: document_etag(body),
        })
    }

    async fn fetch(&self, handle: &StorageHandle) -> Result<StoredDocument, PublicationError> {
        let (gist_id, file) = Self::split_handle(handle)?;
        let response = self
            .authorized(self.http.get(format!("{}/gists/{}", self.api_url, gist_id)))
            .send()
            .await?;
        let gist: Gist = Self::check(response, &handle.0).await?.json().await?;

        let body = gist
            .files
            .get(file)
            .and_then(|f| f.content.clone())
            .ok_or_else(|| PublicationError::NotFound(handle.0.clone()))?
            .into_bytes();
        Ok(StoredDocument { version: document_etag(&body), body })
    }

    async fn remove(&self, handle: &StorageHandle) -> Result<(), PublicationError> {
        let (gist_id, _) = Self::split_handle(handle)?;
        let response = self
            .authorized(self.http.delete(format!("{}/gists/{}", self.api_url, gist_id)))
            .send()
            .await?;
        Self::check(response, &handle.0).await?;
        Ok(())
    }
}
