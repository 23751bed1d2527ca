// src/services/verifier.rs
//! Issuer chain verification.
//!
//! Resolves the documents a credential points at through the publisher and
//! checks that they reference each other: the profile's `id` is its own URL,
//! its `revocationList` names a list whose `id` is that URL and whose
//! `issuer` is the profile. Revocation status is read from that list.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{IssuanceError, Result};
use crate::models::credential::BlockcertsCredential;
use crate::models::issuer_profile::IssuerProfile;
use crate::models::revocation_list::{RevocationList, RevokedAssertion};
use crate::storage::publisher::DocumentPublisher;
use crate::utils::serialization::parse_document;
use crate::wallet::key_management::KOBLITZ_KEY_PREFIX;

/// A published profile and revocation list that reference each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerChain {
    pub profile: IssuerProfile,
    pub revocation_list: RevocationList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub credential: String,
    pub issuer: String,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation: Option<RevokedAssertion>,
}

pub struct IssuerChainVerifier {
    publisher: Arc<dyn DocumentPublisher>,
}

fn broken(message: String) -> IssuanceError {
    IssuanceError::Validation(message)
}

impl IssuerChainVerifier {
    pub fn new(publisher: Arc<dyn DocumentPublisher>) -> Self {
        IssuerChainVerifier { publisher }
    }

    async fn load<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let handle = self
            .publisher
            .locate(url)
            .ok_or_else(|| broken(format!("{} is not published by this host", url)))?;
        let stored = self.publisher.fetch(&handle).await?;
        parse_document(&stored.body).map_err(|e| IssuanceError::Publication(e.into()))
    }

    /// Fetches the issuer profile at `profile_url` and its revocation list,
    /// failing if either self reference is broken.
    pub async fn check_issuer(&self, profile_url: &str) -> Result<IssuerChain> {
        let profile: IssuerProfile = self.load(profile_url).await?;
        if profile.id != profile_url {
            return Err(broken(format!(
                "issuer profile at {} identifies itself as {:?}",
                profile_url, profile.id
            )));
        }
        if !profile.public_key.iter().all(|k| k.id.starts_with(KOBLITZ_KEY_PREFIX)) {
            return Err(broken(format!("issuer profile {} lists a malformed key", profile_url)));
        }

        let revocation_list: RevocationList = self.load(&profile.revocation_list).await?;
        if revocation_list.id != profile.revocation_list {
            return Err(broken(format!(
                "revocation list at {} identifies itself as {:?}",
                profile.revocation_list, revocation_list.id
            )));
        }
        if revocation_list.issuer != profile.id {
            return Err(broken(format!(
                "revocation list {} names issuer {:?}, expected {}",
                revocation_list.id, revocation_list.issuer, profile.id
            )));
        }

        debug!("issuer chain {} -> {} is consistent", profile.id, revocation_list.id);
        Ok(IssuerChain { profile, revocation_list })
    }

    /// Verifies the credential's shape and issuer chain and reports whether
    /// it has been revoked.
    pub async fn credential_status(&self, credential: &BlockcertsCredential) -> Result<CredentialStatus> {
        if !credential.has_blockcerts_shape() {
            return Err(broken(format!("{} is not a Blockcerts credential", credential.id)));
        }
        let chain = self.check_issuer(&credential.issuer).await?;
        let revocation = chain
            .revocation_list
            .revoked_assertions
            .iter()
            .find(|a| a.id == credential.id)
            .cloned();

        Ok(CredentialStatus {
            credential: credential.id.clone(),
            issuer: chain.profile.id,
            revoked: revocation.is_some(),
            revocation,
        })
    }

    /// Same as [`credential_status`](Self::credential_status) for a published credential.
    pub async fn published_credential_status(&self, credential_url: &str) -> Result<CredentialStatus> {
        let credential: BlockcertsCredential = self.load(credential_url).await?;
        self.credential_status(&credential).await
    }
}
