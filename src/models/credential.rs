// src/models/credential.rs
//! Blockcerts verifiable credential data model.
//!
//! Implements the W3C Verifiable Credentials v1 envelope with the
//! Blockcerts v3 extensions (`credentialSubject.publicKey`, `display`).
//! Field order matches what verifiers and the issuing institution's tooling
//! expect when diffing documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CREDENTIAL_CONTEXT: [&str; 2] = [
    "https://www.w3.org/2018/credentials/v1",
    "https://w3id.org/blockcerts/v3",
];

pub const CREDENTIAL_TYPE: [&str; 2] = ["VerifiableCredential", "BlockcertsCredential"];

/// Subject of an issued transcript credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSubject {
    /// Signed DID-JWT assertion binding the claims to the issuer key.
    pub id: String,
    pub name: String,
    pub email: String,
    /// `ecdsa-koblitz-pubkey:<wallet address>`
    pub public_key: String,
    /// Transcript fields, in the order they were extracted.
    pub claim: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    pub content_media_type: String,
    pub content: String,
}

/// A Blockcerts credential. Immutable once issued; revocation goes through
/// the issuer's revocation list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockcertsCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    /// `urn:uuid:<v4 uuid>`
    pub id: String,
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    /// URL of the published issuer profile.
    pub issuer: String,
    pub issuance_date: String,
    pub credential_subject: CredentialSubject,
    pub display: Display,
}

impl BlockcertsCredential {
    /// Checks the fixed parts of the envelope a verifier keys on.
    pub fn has_blockcerts_shape(&self) -> bool {
        self.context.iter().map(String::as_str).eq(CREDENTIAL_CONTEXT)
            && self.credential_type.iter().map(String::as_str).eq(CREDENTIAL_TYPE)
            && self
                .id
                .strip_prefix("urn:uuid:")
                .and_then(|raw| uuid::Uuid::parse_str(raw).ok())
                .map_or(false, |uuid| uuid.get_version_num() == 4)
            && !self.issuer.is_empty()
            && !self.credential_subject.id.is_empty()
    }
}
