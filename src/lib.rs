// src/lib.rs

//! # Blockcerts credential and revocation engine
//!
//! Turns an institution's secp256k1 private key into a published issuer
//! identity (issuer profile plus revocation list), issues Blockcerts v3
//! credentials carrying an ES256K DID-JWT, and maintains the revocation list
//! afterwards.
//!
//! ## Layout
//! 1. **wallet**: key derivation and JWT signing
//! 2. **models**: the published JSON documents
//! 3. **services**: profile, revocation and credential builders, orchestration, HTTP API
//! 4. **storage**: publication backends (static files, GitHub gists, memory)
//! 5. **utils**: hashing and document serialization

pub mod config;
pub mod error;
pub mod models;  // Published document types
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;  // Key material, signing

pub use error::{IssuanceError, PublicationError, Result};
