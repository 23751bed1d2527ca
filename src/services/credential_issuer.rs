// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Drives the issuance flow end to end:
//! 1. derive key material from the institution's private key
//! 2. publish the revocation list and the issuer profile that points at it
//! 3. sign a DID-JWT assertion and assemble the Blockcerts credential
//! 4. optionally publish the credential, and later revoke it
//!
//! Publication is delegated to a [`DocumentPublisher`]; signing to an
//! [`AssertionSigner`]. Any failure aborts the flow with a specific error,
//! and documents already written for a failed registration are removed.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{IssuanceError, Result};
use crate::models::credential::BlockcertsCredential;
use crate::services::credential_assembler::{assemble_credential, CredentialRequest, RecipientData};
use crate::services::profile_builder::{
    build_issuer_profile, render_issuer_profile, IssuerProfileInput,
};
use crate::services::revocation_manager::{PublishedList, RevocationListManager, RevocationOutcome};
use crate::storage::publisher::{DocumentKey, DocumentPublisher, Publication, StorageHandle};
use crate::utils::serialization::{iso_timestamp, render_document};
use crate::wallet::jwt_signer::AssertionSigner;
use crate::wallet::key_management::{derive_key, DerivedKeyMaterial, PrivateKeySecret};

/// Collection (directory) names documents are published under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collections {
    pub profiles: String,
    pub revocations: String,
    pub credentials: String,
}

impl Default for Collections {
    fn default() -> Self {
        Collections {
            profiles: "issuer_profiles".into(),
            revocations: "issuer_revocations".into(),
            credentials: "certificates".into(),
        }
    }
}

/// Identity of the institution registering as an issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerRegistration {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub homepage: Option<String>,
}

/// What the institution store keeps after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRecord {
    pub profile_url: String,
    pub profile_handle: StorageHandle,
    pub revocation_list_url: String,
    pub revocation_handle: StorageHandle,
    pub key_id: String,
    pub address: String,
    pub created: String,
}

/// Inputs for one credential, minus the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub recipient: RecipientData,
    pub transcript: Map<String, Value>,
    pub issuer_profile_url: String,
    pub wallet_address: String,
}

#[derive(Clone)]
pub struct CredentialIssuer {
    publisher: Arc<dyn DocumentPublisher>,
    revocations: Arc<RevocationListManager>,
    signer: Arc<dyn AssertionSigner>,
    collections: Collections,
}

impl CredentialIssuer {
    pub fn new(
        publisher: Arc<dyn DocumentPublisher>,
        signer: Arc<dyn AssertionSigner>,
        collections: Collections,
    ) -> Self {
        let revocations = Arc::new(RevocationListManager::new(
            publisher.clone(),
            collections.revocations.clone(),
        ));
        CredentialIssuer { publisher, revocations, signer, collections }
    }

    pub fn revocations(&self) -> &RevocationListManager {
        &self.revocations
    }

    /// Publishes a revocation list and an issuer profile for the key.
    ///
    /// When the backend knows URLs in advance every document is written once
    /// with its final self references. Otherwise the documents are created
    /// with placeholders and rewritten once their URLs exist.
    pub async fn register_issuer(
        &self,
        registration: IssuerRegistration,
        secret: &PrivateKeySecret,
    ) -> Result<IssuerRecord> {
        let key_material = derive_key(secret)?;
        let mut input = IssuerProfileInput {
            name: registration.name,
            email: registration.email,
            key_material,
            created_date: iso_timestamp(Utc::now()),
            profile_url: String::new(),
            revocation_list_url: String::new(),
            image: registration.image,
            homepage: registration.homepage,
        };
        // fail before anything is written
        build_issuer_profile(&input)?;

        let profile_key = DocumentKey::generate(&self.collections.profiles);
        let list_key = self.revocations.allocate();

        let (profile, list) = match (
            self.publisher.resolve_url(&profile_key),
            self.revocations.planned_url(&list_key),
        ) {
            (Some(profile_url), Some(_)) => {
                self.register_single_write(&mut input, profile_url, &profile_key, &list_key)
                    .await?
            }
            _ => self.register_two_phase(&mut input, &profile_key, &list_key).await?,
        };

        info!(
            "registered issuer {} at {} (revocation list {})",
            input.key_material.address, profile.url, list.url
        );
        Ok(record(&input.key_material, &input.created_date, profile, list))
    }

    async fn register_single_write(
        &self,
        input: &mut IssuerProfileInput,
        profile_url: String,
        profile_key: &DocumentKey,
        list_key: &DocumentKey,
    ) -> Result<(Publication, PublishedList)> {
        let list = self.revocations.create(list_key, &profile_url).await?;

        input.profile_url = profile_url;
        input.revocation_list_url = list.url.clone();

        let written = match render_issuer_profile(input) {
            Ok(body) => self.publisher.create(profile_key, &body).await.map_err(IssuanceError::from),
            Err(e) => Err(e),
        };
        match written {
            Ok(profile) => Ok((profile, list)),
            Err(e) => {
                self.compensate(&[&list.handle]).await;
                Err(e)
            }
        }
    }

    async fn register_two_phase(
        &self,
        input: &mut IssuerProfileInput,
        profile_key: &DocumentKey,
        list_key: &DocumentKey,
    ) -> Result<(Publication, PublishedList)> {
        let draft_list = self.revocations.create(list_key, "").await?;
        input.revocation_list_url = draft_list.url.clone();

        let draft_profile = match render_issuer_profile(input) {
            Ok(body) => self.publisher.create(profile_key, &body).await.map_err(IssuanceError::from),
            Err(e) => Err(e),
        };
        let draft_profile = match draft_profile {
            Ok(profile) => profile,
            Err(e) => {
                self.compensate(&[&draft_list.handle]).await;
                return Err(e);
            }
        };

        input.profile_url = draft_profile.url.clone();
        let finalized = async {
            let body = render_issuer_profile(input)?;
            let profile = self
                .publisher
                .overwrite(&draft_profile.handle, &body, Some(&draft_profile.version))
                .await
                .map_err(|source| IssuanceError::IncompletePublication {
                    handle: draft_profile.handle.clone(),
                    source,
                })?;
            let list = self.revocations.finalize(&draft_list, &profile.url).await?;
            Ok::<_, IssuanceError>((profile, list))
        }
        .await;

        if finalized.is_err() {
            self.compensate(&[&draft_profile.handle, &draft_list.handle]).await;
        }
        finalized
    }

    /// Best-effort removal of documents left by a failed registration.
    async fn compensate(&self, handles: &[&StorageHandle]) {
        for handle in handles {
            match self.publisher.remove(handle).await {
                Ok(()) => info!("removed orphaned document {}", handle),
                Err(e) => error!("could not remove orphaned document {}: {}", handle, e),
            }
        }
    }

    /// Signs and assembles a credential. The key is only used for the
    /// duration of this call.
    pub async fn issue_credential(
        &self,
        request: IssueRequest,
        secret: &PrivateKeySecret,
    ) -> Result<BlockcertsCredential> {
        let key_material = derive_key(secret)?;
        if !key_material.matches_address(&request.wallet_address) {
            return Err(IssuanceError::Validation(
                "wallet address does not belong to the signing key".into(),
            ));
        }
        if request.issuer_profile_url.trim().is_empty() {
            return Err(IssuanceError::Assembly("issuer profile URL is required".into()));
        }

        let mut claims = Map::new();
        claims.insert("name".into(), json!(request.recipient.name));
        let jwt = self.signer.sign(secret, &key_material.did(), claims)?;

        let credential = assemble_credential(&CredentialRequest {
            recipient: request.recipient,
            transcript: request.transcript,
            issuer_profile_url: request.issuer_profile_url,
            jwt,
            key_id: key_material.key_id,
            wallet_address: request.wallet_address,
        })?;
        info!("assembled credential {} for issuer {}", credential.id, credential.issuer);
        Ok(credential)
    }

    /// Stores a finished credential in the credential collection.
    pub async fn publish_credential(&self, credential: &BlockcertsCredential) -> Result<Publication> {
        let name = credential.id.strip_prefix("urn:uuid:").unwrap_or(&credential.id);
        let key = DocumentKey::new(&self.collections.credentials, format!("{}.json", name));
        let body = render_document(credential).map_err(|e| IssuanceError::Publication(e.into()))?;

        let publication = self.publisher.create(&key, &body).await?;
        info!("published credential {} at {}", credential.id, publication.url);
        Ok(publication)
    }

    /// Records `assertion_id` on the revocation list published at `revocation_list_url`.
    pub async fn revoke_credential(
        &self,
        revocation_list_url: &str,
        assertion_id: &str,
        reason: Option<String>,
    ) -> Result<RevocationOutcome> {
        let handle = self.revocations.locate(revocation_list_url)?;
        self.revocations.revoke(&handle, assertion_id, reason).await
    }
}

fn record(
    key_material: &DerivedKeyMaterial,
    created: &str,
    profile: Publication,
    list: PublishedList,
) -> IssuerRecord {
    IssuerRecord {
        profile_url: profile.url,
        profile_handle: profile.handle,
        revocation_list_url: list.url,
        revocation_handle: list.handle,
        key_id: key_material.key_id.clone(),
        address: key_material.address.clone(),
        created: created.to_string(),
    }
}
