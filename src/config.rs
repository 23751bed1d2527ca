// src/config.rs
//! Layered service settings.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. environment variables prefixed `BLOCKCERTS`, nested with `__`,
//!    e.g. `BLOCKCERTS__PUBLICATION__BASE_URL`

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::services::credential_issuer::Collections;
use crate::storage::gist_client::DEFAULT_API_URL;
use crate::storage::publisher::{RetryPolicy, MAX_RETRIES_LIMIT};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings { host: "127.0.0.1".into(), port: 3000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    File,
    Gist,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GistSettings {
    pub api_url: Option<String>,
    pub token: String,
    pub owner: String,
}

impl GistSettings {
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublicationSettings {
    pub backend: Backend,
    /// Public URL the documents are served under.
    pub base_url: String,
    /// Directory the file backend writes to.
    pub public_dir: PathBuf,
    pub profile_collection: String,
    pub revocation_collection: String,
    pub credential_collection: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub gist: GistSettings,
}

impl Default for PublicationSettings {
    fn default() -> Self {
        let collections = Collections::default();
        let retry = RetryPolicy::default();
        PublicationSettings {
            backend: Backend::File,
            base_url: "http://127.0.0.1:3000".into(),
            public_dir: PathBuf::from("public"),
            profile_collection: collections.profiles,
            revocation_collection: collections.revocations,
            credential_collection: collections.credentials,
            timeout_ms: retry.timeout.as_millis() as u64,
            max_retries: retry.max_retries,
            backoff_ms: retry.backoff.as_millis() as u64,
            gist: GistSettings::default(),
        }
    }
}

impl PublicationSettings {
    pub fn collections(&self) -> Collections {
        Collections {
            profiles: self.profile_collection.clone(),
            revocations: self.revocation_collection.clone(),
            credentials: self.credential_collection.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub publication: PublicationSettings,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default")
    }

    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("BLOCKCERTS").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Checks combinations the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publication.backend == Backend::Gist
            && (self.publication.gist.token.is_empty() || self.publication.gist.owner.is_empty())
        {
            return Err(ConfigError::Message(
                "the gist backend needs publication.gist.token and publication.gist.owner".into(),
            ));
        }
        if self.publication.backend != Backend::Gist && self.publication.base_url.trim().is_empty() {
            return Err(ConfigError::Message("publication.base_url is required".into()));
        }
        if self.publication.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Message(format!(
                "publication.max_retries must be at most {}",
                MAX_RETRIES_LIMIT
            )));
        }
        if self.publication.timeout_ms == 0 {
            return Err(ConfigError::Message("publication.timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
