// src/main.rs

//! # Blockcerts engine - HTTP service entry point
//!
//! Loads settings, picks a publication backend and starts the API server.
//!
//! ## Configuration
//! `config/default.toml` if present, then `BLOCKCERTS__*` environment
//! variables (a `.env` file is loaded first). See [`Settings`].
//!
//! ## Backends
//! - `file`: writes under `publication.public_dir` and serves it at `publication.base_url`
//! - `gist`: GitHub gists owned by `publication.gist.owner`
//! - `memory`: in-process, lost on restart

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};

use blockcerts_engine::config::{Backend, Settings};
use blockcerts_engine::services::api_server::ApiServer;
use blockcerts_engine::services::credential_issuer::CredentialIssuer;
use blockcerts_engine::services::verifier::IssuerChainVerifier;
use blockcerts_engine::storage::file_store::FileStore;
use blockcerts_engine::storage::gist_client::GistClient;
use blockcerts_engine::storage::memory_store::MemoryStore;
use blockcerts_engine::storage::publisher::{DocumentPublisher, RetryingPublisher};
use blockcerts_engine::wallet::jwt_signer::Es256kSigner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let settings = Settings::load().context("failed to load settings")?;
    settings.validate().context("invalid settings")?;
    let publication = &settings.publication;

    let (backend, public_dir): (Arc<dyn DocumentPublisher>, _) = match publication.backend {
        Backend::File => {
            std::fs::create_dir_all(&publication.public_dir).with_context(|| {
                format!("cannot create {}", publication.public_dir.display())
            })?;
            let store = FileStore::new(&publication.base_url, &publication.public_dir);
            (Arc::new(store), Some(publication.public_dir.clone()))
        }
        Backend::Gist => {
            let client = GistClient::new(
                publication.gist.api_url(),
                &publication.gist.token,
                &publication.gist.owner,
            );
            (Arc::new(client), None)
        }
        Backend::Memory => {
            warn!("using the in-memory backend, published documents do not survive a restart");
            (Arc::new(MemoryStore::new(&publication.base_url)), None)
        }
    };
    let publisher: Arc<dyn DocumentPublisher> =
        Arc::new(RetryingPublisher::new(backend, publication.retry_policy()));

    let credential_issuer = CredentialIssuer::new(
        publisher.clone(),
        Arc::new(Es256kSigner::default()),
        publication.collections(),
    );
    let verifier = IssuerChainVerifier::new(publisher);
    let api_server = ApiServer::new(credential_issuer, verifier, public_dir);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("invalid server address")?;
    info!("publishing with the {:?} backend", publication.backend);
    info!("Available endpoints:");
    info!("- POST /issuers");
    info!("- POST /certificates");
    info!("- POST /revocations");
    info!("- GET  /certificates/status?credential=<url>");

    api_server.run(addr).await.context("API server stopped")?;
    Ok(())
}
