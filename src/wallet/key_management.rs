// src/wallet/key_management.rs
//! Key derivation for Blockcerts issuers.
//!
//! Turns a caller-supplied secp256k1 private key into the public material
//! an issuer profile advertises:
//! - uncompressed public key (hex)
//! - JSON Web Key with url-safe base64 `x`/`y` coordinates
//! - `ecdsa-koblitz-pubkey:` key identifier
//! - EIP-55 Ethereum address used for `did:ethr` and the credential key reference
//!
//! The private key lives in a [`PrivateKeySecret`] for exactly one request and
//! is zeroised when dropped. Nothing in this module logs it or copies it into
//! an output document.

use std::fmt;

use ethers::types::Address;
use ethers::utils::{hex, to_checksum};
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Deserializer, Serialize};
use zeroize::Zeroizing;

use crate::error::{IssuanceError, Result};
use crate::utils::crypto::hash_data;

/// Prefix Blockcerts uses for secp256k1 ("koblitz") key references.
pub const KOBLITZ_KEY_PREFIX: &str = "ecdsa-koblitz-pubkey:";

/// Formats a Blockcerts key reference for a public key hex or wallet address.
pub fn koblitz_key_ref(key: &str) -> String {
    format!("{}{}", KOBLITZ_KEY_PREFIX, key)
}

/// Request-scoped hex private key.
///
/// Accepts an optional `0x` prefix. The buffer is wiped on drop, and `Debug`
/// never prints it.
pub struct PrivateKeySecret {
    hex: Zeroizing<String>,
}

impl PrivateKeySecret {
    pub fn new(raw: impl Into<String>) -> Self {
        PrivateKeySecret { hex: Zeroizing::new(raw.into()) }
    }

    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let bytes = Zeroizing::new(signing_key.to_bytes().to_vec());
        PrivateKeySecret::new(format!("0x{}", hex::encode(bytes.as_slice())))
    }

    /// Parses the secret into an ECDSA signing key.
    ///
    /// # Errors
    /// [`IssuanceError::InvalidKey`] if the string is not hex, is not 32 bytes
    /// long, or is not a valid non-zero scalar below the curve order.
    pub(crate) fn signing_key(&self) -> Result<SigningKey> {
        let trimmed = self.hex.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = Zeroizing::new(
            hex::decode(digits)
                .map_err(|_| IssuanceError::InvalidKey("key is not valid hex".into()))?,
        );
        if bytes.len() != 32 {
            return Err(IssuanceError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        SigningKey::from_slice(&bytes).map_err(|_| {
            IssuanceError::InvalidKey("scalar is zero or exceeds the secp256k1 order".into())
        })
    }
}

impl fmt::Debug for PrivateKeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeySecret(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for PrivateKeySecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(PrivateKeySecret::new)
    }
}

/// Public half of a secp256k1 key as a JSON Web Key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
}

/// Everything an issuer can publish about its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeyMaterial {
    /// Lowercase hex of the 65-byte uncompressed point (`04 || X || Y`).
    pub public_key_hex: String,
    pub jwk: PublicJwk,
    /// `ecdsa-koblitz-pubkey:<public_key_hex>`
    pub key_id: String,
    /// EIP-55 checksummed Ethereum address.
    pub address: String,
}

impl DerivedKeyMaterial {
    /// Builds the material from a verifying key. Pure function of the point.
    pub fn from_verifying_key(verifying_key: &VerifyingKey) -> Self {
        let point = verifying_key.to_encoded_point(false);
        let bytes = point.as_bytes();

        let public_key_hex = hex::encode(bytes);
        let jwk = PublicJwk {
            kty: "EC".to_string(),
            crv: "secp256k1".to_string(),
            x: base64::encode_config(&bytes[1..33], base64::URL_SAFE_NO_PAD),
            y: base64::encode_config(&bytes[33..65], base64::URL_SAFE_NO_PAD),
        };

        // Ethereum address: last 20 bytes of keccak(X || Y)
        let digest = hash_data(&bytes[1..]);
        let address = to_checksum(&Address::from_slice(&digest[12..]), None);

        DerivedKeyMaterial {
            key_id: koblitz_key_ref(&public_key_hex),
            public_key_hex,
            jwk,
            address,
        }
    }

    /// `did:ethr` identifier used as JWT issuer and audience.
    pub fn did(&self) -> String {
        format!("did:ethr:{}", self.address)
    }

    /// Key reference in the wallet-address form carried by credentials.
    pub fn address_key_ref(&self) -> String {
        koblitz_key_ref(&self.address)
    }

    /// Case-insensitive comparison against a wallet address supplied by a caller.
    pub fn matches_address(&self, wallet_address: &str) -> bool {
        self.address.eq_ignore_ascii_case(wallet_address.trim())
    }
}

/// Derives public key material from a private key.
///
/// No I/O. Calling it twice with the same key yields identical output.
pub fn derive_key(secret: &PrivateKeySecret) -> Result<DerivedKeyMaterial> {
    let signing_key = secret.signing_key()?;
    Ok(DerivedKeyMaterial::from_verifying_key(signing_key.verifying_key()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const KNOWN_ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

    #[test]
    fn test_known_key_derives_expected_address() {
        let material = derive_key(&PrivateKeySecret::new(KNOWN_KEY)).unwrap();
        assert_eq!(material.address, KNOWN_ADDRESS);
        assert_eq!(material.did(), format!("did:ethr:{}", KNOWN_ADDRESS));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = derive_key(&PrivateKeySecret::new(KNOWN_KEY)).unwrap();
        let second = derive_key(&PrivateKeySecret::new(KNOWN_KEY)).unwrap();
        assert_eq!(first, second);

        // prefix is optional
        let unprefixed = derive_key(&PrivateKeySecret::new(&KNOWN_KEY[2..])).unwrap();
        assert_eq!(first, unprefixed);
    }

    #[test]
    fn test_key_material_shape() {
        let material = derive_key(&PrivateKeySecret::new(KNOWN_KEY)).unwrap();

        assert_eq!(material.public_key_hex.len(), 130);
        assert!(material.public_key_hex.starts_with("04"));
        assert_eq!(material.public_key_hex, material.public_key_hex.to_lowercase());
        assert_eq!(material.key_id, format!("ecdsa-koblitz-pubkey:{}", material.public_key_hex));

        assert_eq!(material.jwk.kty, "EC");
        assert_eq!(material.jwk.crv, "secp256k1");
        // 32 bytes -> 43 unpadded base64url characters
        assert_eq!(material.jwk.x.len(), 43);
        assert_eq!(material.jwk.y.len(), 43);
        assert!(!material.jwk.x.contains('=') && !material.jwk.x.contains('+'));

        let x = base64::decode_config(&material.jwk.x, base64::URL_SAFE_NO_PAD).unwrap();
        assert_eq!(hex::encode(x), material.public_key_hex[2..66]);
    }

    #[test]
    fn test_address_matching_ignores_case() {
        let material = derive_key(&PrivateKeySecret::new(KNOWN_KEY)).unwrap();
        assert!(material.matches_address(&KNOWN_ADDRESS.to_lowercase()));
        assert!(material.matches_address(KNOWN_ADDRESS));
        assert!(!material.matches_address("0x0000000000000000000000000000000000000000"));
        assert_eq!(
            material.address_key_ref().to_lowercase(),
            format!("ecdsa-koblitz-pubkey:{}", KNOWN_ADDRESS.to_lowercase())
        );
    }

    #[test]
    fn test_malformed_keys_are_rejected() {
        for bad in [
            "not-hex",
            "0x00",
            "",
            "0x0000000000000000000000000000000000000000000000000000000000000000",
            // the group order itself
            "0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141",
        ] {
            let result = derive_key(&PrivateKeySecret::new(bad));
            assert!(
                matches!(result, Err(IssuanceError::InvalidKey(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_error_and_debug_never_echo_the_key() {
        let secret = PrivateKeySecret::new("0xzz0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f3623");
        let err = derive_key(&secret).unwrap_err();
        assert!(!err.to_string().contains("zz0883"));
        assert_eq!(format!("{:?}", secret), "PrivateKeySecret(<redacted>)");
    }

    #[test]
    fn test_generated_keys_are_valid_and_distinct() {
        let a = derive_key(&PrivateKeySecret::generate()).unwrap();
        let b = derive_key(&PrivateKeySecret::generate()).unwrap();
        assert_ne!(a.key_id, b.key_id);
    }
}
