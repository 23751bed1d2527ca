// src/models/revocation_list.rs
//! Blockcerts revocation list document.
//!
//! The list only ever grows: an assertion id appears in
//! `revokedAssertions` at most once.

use serde::{Deserialize, Serialize};

pub const REVOCATION_CONTEXT: &str = "https://w3id.org/openbadges/v2";
pub const REVOCATION_LIST_TYPE: &str = "RevocationList";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RevokedAssertion {
    pub id: String,
    pub revoked_on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RevocationList {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub list_type: String,
    pub issuer: String,
    pub revoked_assertions: Vec<RevokedAssertion>,
}

impl RevocationList {
    /// Empty list with the given self URL and issuer profile URL.
    pub fn new(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        RevocationList {
            context: REVOCATION_CONTEXT.to_string(),
            id: id.into(),
            list_type: REVOCATION_LIST_TYPE.to_string(),
            issuer: issuer.into(),
            revoked_assertions: Vec::new(),
        }
    }

    pub fn is_revoked(&self, assertion_id: &str) -> bool {
        self.revoked_assertions.iter().any(|entry| entry.id == assertion_id)
    }

    /// Appends `assertion_id` unless already present.
    ///
    /// Returns `false` when the list was left unchanged.
    pub fn revoke(
        &mut self,
        assertion_id: &str,
        revoked_on: String,
        reason: Option<String>,
    ) -> bool {
        if self.is_revoked(assertion_id) {
            return false;
        }
        self.revoked_assertions.push(RevokedAssertion {
            id: assertion_id.to_string(),
            revoked_on,
            revocation_reason: reason,
        });
        true
    }

    /// Both self references are filled in.
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.issuer.is_empty()
    }
}
