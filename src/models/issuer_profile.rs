// src/models/issuer_profile.rs
//! Blockcerts issuer profile document.
//!
//! Field names and nesting follow the Open Badges v2 / Blockcerts v2
//! profile shape so standard verifiers can resolve the issuer's key and
//! revocation list from it.

use serde::{Deserialize, Serialize};

use crate::wallet::key_management::PublicJwk;

pub const PROFILE_CONTEXT: [&str; 2] = [
    "https://w3id.org/openbadges/v2",
    "https://w3id.org/blockcerts/v2",
];

pub const PROFILE_TYPE: &str = "Profile";
pub const VERIFICATION_METHOD_TYPE: &str = "JsonWebKey2020";
pub const VERIFICATION_KEY_FRAGMENT: &str = "#secp256k1-verification-public-key";

/// Entry of the profile's `publicKey` array.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProfileKey {
    pub id: String,
    pub created: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    pub public_key_jwk: PublicJwk,
}

/// Issuer profile. `id` is the URL the document itself is published at.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerProfile {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub profile_type: String,
    pub name: String,
    /// Issuer homepage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub email: String,
    pub public_key: Vec<ProfileKey>,
    pub verification_method: Vec<VerificationMethod>,
    pub assertion_method: Vec<String>,
    pub revocation_list: String,
    pub image: String,
}

impl IssuerProfile {
    /// Verification method id anchored on the profile URL.
    pub fn verification_method_id(profile_url: &str) -> String {
        format!("{}{}", profile_url, VERIFICATION_KEY_FRAGMENT)
    }
}
