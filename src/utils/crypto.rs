// src/utils/crypto.rs
//! Keccak-256 helpers shared by address derivation and document versioning.

use ethers::utils::{hex, keccak256};

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Content version tag for a stored document.
///
/// Two writes of the same bytes produce the same tag, so an overwrite that
/// changes nothing does not invalidate a concurrent reader's expectation.
pub fn document_etag(body: &[u8]) -> String {
    hex::encode(hash_data(body))
}
