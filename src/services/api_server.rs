// src/services/api_server.rs
//! API Server for the credential and revocation engine
//!
//! REST surface over [`CredentialIssuer`] and [`IssuerChainVerifier`]:
//! - issuer registration (profile and revocation list publication)
//! - credential issuance, with optional publication
//! - revocation
//! - credential status lookup
//!
//! When documents are published to a local directory the same router serves
//! that directory, so every published URL resolves.
//!
//! Private keys arrive in request bodies. They are deserialized straight into
//! [`PrivateKeySecret`] and wiped when the handler returns.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use log::info;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::error::IssuanceError;
use crate::models::credential::BlockcertsCredential;
use crate::services::credential_issuer::{CredentialIssuer, IssueRequest, IssuerRecord, IssuerRegistration};
use crate::services::revocation_manager::RevocationOutcome;
use crate::services::verifier::{CredentialStatus, IssuerChainVerifier};
use crate::wallet::key_management::PrivateKeySecret;

/// Request payload for registering an issuer
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterIssuerRequest {
    #[serde(flatten)]
    registration: IssuerRegistration,
    private_key: PrivateKeySecret,
}

/// Request payload for issuing a credential
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCertificateRequest {
    #[serde(flatten)]
    request: IssueRequest,
    private_key: PrivateKeySecret,
    /// Store the credential under the credential collection as well.
    #[serde(default)]
    publish: bool,
}

#[derive(Serialize)]
struct IssueCertificateResponse {
    credential: BlockcertsCredential,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

/// Request payload for revoking a credential
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeRequest {
    revocation_list_url: String,
    assertion_id: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RevokeResponse {
    assertion_id: String,
    outcome: RevocationOutcome,
}

#[derive(Deserialize)]
struct StatusQuery {
    credential: String,
}

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    credential_issuer: Arc<CredentialIssuer>,
    verifier: Arc<IssuerChainVerifier>,
    /// Directory served statically, if documents are published locally
    public_dir: Option<PathBuf>,
}

impl ApiServer {
    pub fn new(
        credential_issuer: CredentialIssuer,
        verifier: IssuerChainVerifier,
        public_dir: Option<PathBuf>,
    ) -> Self {
        ApiServer {
            credential_issuer: Arc::new(credential_issuer),
            verifier: Arc::new(verifier),
            public_dir,
        }
    }

    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/issuers", post(Self::register_issuer_handler))
            .route("/certificates", post(Self::issue_certificate_handler))
            .route("/certificates/status", get(Self::certificate_status_handler))
            .route("/revocations", post(Self::revoke_handler))
            .with_state(Arc::new(self.clone()));

        match &self.public_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router,
        }
    }

    /// Binds `addr` and serves requests until the process stops.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// Registers an issuer
    ///
    /// # Endpoint
    /// POST /issuers
    ///
    /// # Request Body
    /// `name`, `email`, optional `image` and `homepage`, and `privateKey`
    ///
    /// # Responses
    /// - 201 Created: the issuer record (profile and revocation list URLs, key id, address)
    /// - 400 Bad Request: invalid private key
    /// - 422 Unprocessable Entity: missing name or email
    /// - 502 Bad Gateway: publication failed
    async fn register_issuer_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RegisterIssuerRequest>,
    ) -> Result<(StatusCode, Json<IssuerRecord>), IssuanceError> {
        let record = state
            .credential_issuer
            .register_issuer(payload.registration, &payload.private_key)
            .await?;
        Ok((StatusCode::CREATED, Json(record)))
    }

    /// Issues a credential
    ///
    /// # Endpoint
    /// POST /certificates
    ///
    /// # Request Body
    /// `recipient`, `transcript`, `issuerProfileUrl`, `walletAddress`,
    /// `privateKey` and optionally `publish`
    ///
    /// # Responses
    /// - 200 OK: the credential, plus its URL when published
    /// - 400 Bad Request: invalid private key
    /// - 422 Unprocessable Entity: wallet does not match the key, missing fields
    async fn issue_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<IssueCertificateRequest>,
    ) -> Result<Json<IssueCertificateResponse>, IssuanceError> {
        let credential = state
            .credential_issuer
            .issue_credential(payload.request, &payload.private_key)
            .await?;

        let url = if payload.publish {
            Some(state.credential_issuer.publish_credential(&credential).await?.url)
        } else {
            None
        };
        Ok(Json(IssueCertificateResponse { credential, url }))
    }

    /// Revokes a credential
    ///
    /// # Endpoint
    /// POST /revocations
    ///
    /// # Responses
    /// - 200 OK: `revoked`, or `already_revoked` if the id was on the list
    /// - 409 Conflict: the list kept changing underneath the update
    /// - 422 Unprocessable Entity: unknown list URL or unfinalized list
    async fn revoke_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RevokeRequest>,
    ) -> Result<Json<RevokeResponse>, IssuanceError> {
        let outcome = state
            .credential_issuer
            .revoke_credential(&payload.revocation_list_url, &payload.assertion_id, payload.reason)
            .await?;
        Ok(Json(RevokeResponse { assertion_id: payload.assertion_id, outcome }))
    }

    /// Reports whether a published credential is revoked
    ///
    /// # Endpoint
    /// GET /certificates/status?credential=<url>
    ///
    /// # Responses
    /// - 200 OK: issuer and revocation status
    /// - 404 Not Found: no document at that URL
    /// - 422 Unprocessable Entity: broken issuer chain
    async fn certificate_status_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<StatusQuery>,
    ) -> Result<Json<CredentialStatus>, IssuanceError> {
        Ok(Json(state.verifier.published_credential_status(&query.credential).await?))
    }
}
