// src/services/profile_builder.rs
//! Issuer profile rendering.
//!
//! A pure transformation from issuer identity and key material to the
//! profile document. `profile_url` and `revocation_list_url` may be empty
//! when the backend only assigns URLs on first write; the profile is then
//! re-rendered once they are known. Rendering the same input twice yields
//! the same bytes.

use crate::error::{IssuanceError, Result};
use crate::models::issuer_profile::{
    IssuerProfile, ProfileKey, VerificationMethod, PROFILE_CONTEXT, PROFILE_TYPE,
    VERIFICATION_METHOD_TYPE,
};
use crate::utils::serialization::render_document;
use crate::wallet::key_management::DerivedKeyMaterial;

#[derive(Debug, Clone)]
pub struct IssuerProfileInput {
    pub name: String,
    pub email: String,
    pub key_material: DerivedKeyMaterial,
    /// ISO-8601 timestamp of key registration.
    pub created_date: String,
    pub profile_url: String,
    pub revocation_list_url: String,
    /// Logo, usually a data URL.
    pub image: String,
    pub homepage: Option<String>,
}

pub fn build_issuer_profile(input: &IssuerProfileInput) -> Result<IssuerProfile> {
    if input.name.trim().is_empty() {
        return Err(IssuanceError::Validation("issuer name is required".into()));
    }
    if input.email.trim().is_empty() {
        return Err(IssuanceError::Validation("issuer email is required".into()));
    }

    let method_id = IssuerProfile::verification_method_id(&input.profile_url);

    Ok(IssuerProfile {
        context: PROFILE_CONTEXT.iter().map(|c| c.to_string()).collect(),
        id: input.profile_url.clone(),
        profile_type: PROFILE_TYPE.to_string(),
        name: input.name.clone(),
        url: input.homepage.clone(),
        email: input.email.clone(),
        public_key: vec![ProfileKey {
            id: input.key_material.key_id.clone(),
            created: input.created_date.clone(),
        }],
        verification_method: vec![VerificationMethod {
            id: method_id.clone(),
            method_type: VERIFICATION_METHOD_TYPE.to_string(),
            controller: input.profile_url.clone(),
            public_key_jwk: input.key_material.jwk.clone(),
        }],
        assertion_method: vec![method_id],
        revocation_list: input.revocation_list_url.clone(),
        image: input.image.clone(),
    })
}

/// Builds and serialises the profile in one step.
pub fn render_issuer_profile(input: &IssuerProfileInput) -> Result<Vec<u8>> {
    let profile = build_issuer_profile(input)?;
    render_document(&profile).map_err(|e| IssuanceError::Validation(e.to_string()))
}
