// src/error.rs
//! Error taxonomy for the credential and revocation engine.
//!
//! Pure builders (key derivation, profile rendering, credential assembly)
//! fail fast with a specific [`IssuanceError`]. Storage failures are
//! reported as [`PublicationError`] and wrapped on their way up.
//!
//! No variant ever carries private key material.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::storage::publisher::StorageHandle;

/// Failures raised by a Publication Collaborator backend.
#[derive(Debug, Error)]
pub enum PublicationError {
    /// No document is stored under the given handle.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Optimistic write rejected because the stored version moved.
    #[error("version conflict on {handle}: expected {expected}, found {found}")]
    Conflict {
        handle: String,
        expected: String,
        found: String,
    },

    /// A single attempt exceeded the configured timeout.
    #[error("publication timed out after {0} ms")]
    Timeout(u64),

    /// The remote host answered with a non-success status.
    #[error("publication rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend cannot perform the requested operation.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

impl PublicationError {
    /// Whether a retry of the same call could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PublicationError::Timeout(_) | PublicationError::Io(_) => true,
            PublicationError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| s.is_server_error())
            }
            PublicationError::Rejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Errors surfaced by the issuance and revocation flow.
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// Malformed hex, wrong length or out-of-range secp256k1 scalar.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// A required profile or credential field is missing or inconsistent.
    #[error("validation error: {0}")]
    Validation(String),

    /// The JWT signer could not produce a token.
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("publication failed: {0}")]
    Publication(#[from] PublicationError),

    /// A credential is missing its issuer or signed assertion.
    #[error("credential assembly failed: {0}")]
    Assembly(String),

    /// Concurrent writers kept moving the revocation list.
    #[error("revocation list {0} changed concurrently, giving up")]
    RevocationConflict(String),

    /// The first write of a two-phase publication succeeded but the follow-up did not.
    #[error("publication of {handle} left incomplete: {source}")]
    IncompletePublication {
        handle: StorageHandle,
        #[source]
        source: PublicationError,
    },
}

impl IssuanceError {
    fn status(&self) -> StatusCode {
        match self {
            IssuanceError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            IssuanceError::Validation(_) | IssuanceError::Assembly(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IssuanceError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IssuanceError::Publication(PublicationError::NotFound(_)) => StatusCode::NOT_FOUND,
            IssuanceError::Publication(PublicationError::Conflict { .. })
            | IssuanceError::RevocationConflict(_) => StatusCode::CONFLICT,
            IssuanceError::Publication(_) | IssuanceError::IncompletePublication { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for IssuanceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T, E = IssuanceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PublicationError::Timeout(100).is_transient());
        assert!(PublicationError::Rejected { status: 503, body: String::new() }.is_transient());
        assert!(PublicationError::Rejected { status: 429, body: String::new() }.is_transient());
        assert!(!PublicationError::Rejected { status: 404, body: String::new() }.is_transient());
        assert!(!PublicationError::NotFound("x".into()).is_transient());
        assert!(!PublicationError::Conflict {
            handle: "h".into(),
            expected: "a".into(),
            found: "b".into(),
        }
        .is_transient());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(IssuanceError::InvalidKey("bad".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(IssuanceError::Assembly("x".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(IssuanceError::RevocationConflict("u".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            IssuanceError::Publication(PublicationError::NotFound("k".into())).status(),
            StatusCode::NOT_FOUND
        );
    }
}
