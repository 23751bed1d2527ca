// src/wallet/jwt_signer.rs
//! ES256K DID-JWT signing.
//!
//! Produces compact JWS tokens (`header.payload.signature`) signed with
//! ECDSA over secp256k1 and SHA-256, the `ES256K` algorithm `did-jwt`
//! verifiers expect. Signatures are 64-byte `r || s` with low-S
//! normalisation, encoded url-safe base64 without padding.

use chrono::Utc;
use ethers::utils::hex;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, VerifyingKey};
use serde_json::{json, Map, Value};

use crate::error::{IssuanceError, Result};
use crate::wallet::key_management::PrivateKeySecret;

pub const ES256K: &str = "ES256K";

/// Signing collaborator used by the issuance flow.
///
/// Implementations must return an error rather than a malformed token when
/// the key cannot sign.
pub trait AssertionSigner: Send + Sync {
    /// Signs `{...claims, aud: issuer_did, iss: issuer_did}`. `aud` and `iss`
    /// always name `issuer_did`, whatever `claims` carries.
    fn sign(
        &self,
        secret: &PrivateKeySecret,
        issuer_did: &str,
        claims: Map<String, Value>,
    ) -> Result<String>;
}

/// Default signer producing `did-jwt` compatible ES256K tokens.
///
/// Tokens carry no `iat` unless `include_issued_at` is set, the same shape
/// `did-jwt` produces for `iat: undefined`. Without `iat` a key signs the
/// same claims to the same token.
#[derive(Debug, Clone, Default)]
pub struct Es256kSigner {
    pub include_issued_at: bool,
}

fn encode_segment(bytes: &[u8]) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    base64::decode_config(segment, base64::URL_SAFE_NO_PAD)
        .map_err(|_| IssuanceError::Signing("token segment is not base64url".into()))
}

impl AssertionSigner for Es256kSigner {
    fn sign(
        &self,
        secret: &PrivateKeySecret,
        issuer_did: &str,
        claims: Map<String, Value>,
    ) -> Result<String> {
        if issuer_did.trim().is_empty() {
            return Err(IssuanceError::Signing("issuer DID is required".into()));
        }

        let signing_key = secret.signing_key().map_err(|e| match e {
            IssuanceError::InvalidKey(reason) => IssuanceError::Signing(reason),
            other => other,
        })?;

        let header = json!({ "typ": "JWT", "alg": ES256K });

        let mut payload = Map::new();
        if self.include_issued_at {
            payload.insert("iat".into(), json!(Utc::now().timestamp()));
        }
        payload.extend(claims);
        payload.insert("aud".into(), json!(issuer_did));
        payload.insert("iss".into(), json!(issuer_did));

        let header_bytes = serde_json::to_vec(&header)
            .map_err(|e| IssuanceError::Signing(e.to_string()))?;
        let payload_bytes = serde_json::to_vec(&Value::Object(payload))
            .map_err(|e| IssuanceError::Signing(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            encode_segment(&header_bytes),
            encode_segment(&payload_bytes)
        );

        let signature: Signature = signing_key
            .try_sign(signing_input.as_bytes())
            .map_err(|e| IssuanceError::Signing(e.to_string()))?;

        Ok(format!("{}.{}", signing_input, encode_segment(&signature.to_bytes())))
    }
}

/// Verifies an ES256K token against an uncompressed or compressed public key
/// (hex) and returns its payload.
pub fn verify_es256k(token: &str, public_key_hex: &str) -> Result<Map<String, Value>> {
    let mut parts = token.split('.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(IssuanceError::Signing("token must have three segments".into())),
    };

    let header: Value = serde_json::from_slice(&decode_segment(header)?)
        .map_err(|e| IssuanceError::Signing(e.to_string()))?;
    if header.get("alg").and_then(Value::as_str) != Some(ES256K) {
        return Err(IssuanceError::Signing("unexpected token algorithm".into()));
    }

    let key_bytes = hex::decode(public_key_hex.trim_start_matches("0x"))
        .map_err(|_| IssuanceError::Signing("public key is not valid hex".into()))?;
    let verifying_key = VerifyingKey::from_sec1_bytes(&key_bytes)
        .map_err(|_| IssuanceError::Signing("public key is not a secp256k1 point".into()))?;

    let signing_input = &token[..token.len() - signature.len() - 1];
    let signature = Signature::from_slice(&decode_segment(signature)?)
        .map_err(|e| IssuanceError::Signing(e.to_string()))?;

    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| IssuanceError::Signing("signature does not match".into()))?;

    match serde_json::from_slice(&decode_segment(payload)?) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(IssuanceError::Signing("payload is not a JSON object".into())),
        Err(e) => Err(IssuanceError::Signing(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::derive_key;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn name_claim(name: &str) -> Map<String, Value> {
        let mut claims = Map::new();
        claims.insert("name".into(), json!(name));
        claims
    }

    #[test]
    fn test_signed_token_verifies_with_derived_key() {
        let secret = PrivateKeySecret::new(KEY);
        let material = derive_key(&secret).unwrap();
        let did = material.did();

        let token = Es256kSigner::default()
            .sign(&secret, &did, name_claim("Test Univ"))
            .unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = verify_es256k(&token, &material.public_key_hex).unwrap();
        assert_eq!(claims["iss"], json!(did));
        assert_eq!(claims["aud"], json!(did));
        assert_eq!(claims["name"], json!("Test Univ"));
        assert!(!claims.contains_key("iat"));
    }

    #[test]
    fn test_issued_at_on_request() {
        let secret = PrivateKeySecret::new(KEY);
        let material = derive_key(&secret).unwrap();
        let signer = Es256kSigner { include_issued_at: true };

        let token = signer.sign(&secret, &material.did(), Map::new()).unwrap();
        let claims = verify_es256k(&token, &material.public_key_hex).unwrap();
        assert!(claims["iat"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_header_declares_es256k() {
        let secret = PrivateKeySecret::new(KEY);
        let token = Es256kSigner::default()
            .sign(&secret, "did:ethr:0xabc", Map::new())
            .unwrap();
        let header = decode_segment(token.split('.').next().unwrap()).unwrap();
        assert_eq!(String::from_utf8(header).unwrap(), r#"{"typ":"JWT","alg":"ES256K"}"#);
    }

    #[test]
    fn test_tokens_without_iat_are_reproducible() {
        let secret = PrivateKeySecret::new(KEY);
        let signer = Es256kSigner::default();
        let a = signer.sign(&secret, "did:ethr:0xabc", name_claim("x")).unwrap();
        let b = signer.sign(&secret, "did:ethr:0xabc", name_claim("x")).unwrap();
        // RFC 6979 nonces
        assert_eq!(a, b);
    }

    #[test]
    fn test_claims_cannot_override_issuer_or_audience() {
        let secret = PrivateKeySecret::new(KEY);
        let material = derive_key(&secret).unwrap();
        let mut claims = Map::new();
        claims.insert("iss".into(), json!("did:ethr:0xforged"));
        claims.insert("aud".into(), json!("did:ethr:0xelsewhere"));
        claims.insert("name".into(), json!("Ada"));

        let token = Es256kSigner::default().sign(&secret, &material.did(), claims).unwrap();
        let payload = verify_es256k(&token, &material.public_key_hex).unwrap();
        assert_eq!(payload["iss"], json!(material.did()));
        assert_eq!(payload["aud"], json!(material.did()));
        assert_eq!(payload["name"], json!("Ada"));
    }

    #[test]
    fn test_invalid_key_is_a_signing_error() {
        let err = Es256kSigner::default()
            .sign(&PrivateKeySecret::new("0x00"), "did:ethr:0xabc", Map::new())
            .unwrap_err();
        assert!(matches!(err, IssuanceError::Signing(_)));
    }

    #[test]
    fn test_empty_issuer_is_rejected() {
        let err = Es256kSigner::default()
            .sign(&PrivateKeySecret::new(KEY), " ", Map::new())
            .unwrap_err();
        assert!(matches!(err, IssuanceError::Signing(_)));
    }

    #[test]
    fn test_tampered_token_fails_verification() {
        let secret = PrivateKeySecret::new(KEY);
        let material = derive_key(&secret).unwrap();
        let token = Es256kSigner::default()
            .sign(&secret, &material.did(), name_claim("a"))
            .unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload = encode_segment(br#"{"aud":"x","iss":"x","name":"b"}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(verify_es256k(&forged, &material.public_key_hex).is_err());

        let other = derive_key(&PrivateKeySecret::generate()).unwrap();
        assert!(verify_es256k(&token, &other.public_key_hex).is_err());
    }
}
