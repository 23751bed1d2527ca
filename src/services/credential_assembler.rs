// src/services/credential_assembler.rs
//! Credential assembly.
//!
//! Builds the Blockcerts document for one issuance event from recipient
//! data, extracted transcript fields, the published issuer profile URL and
//! the signed assertion. Nothing here touches storage or the network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{IssuanceError, Result};
use crate::models::credential::{
    BlockcertsCredential, CredentialSubject, Display, CREDENTIAL_CONTEXT, CREDENTIAL_TYPE,
};
use crate::utils::serialization::iso_timestamp;
use crate::wallet::key_management::{koblitz_key_ref, KOBLITZ_KEY_PREFIX};

pub const DISPLAY_MEDIA_TYPE: &str = "text/html";

/// Student the transcript belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipientData {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct CredentialRequest {
    pub recipient: RecipientData,
    /// Transcript fields as extracted, kept in order.
    pub transcript: Map<String, Value>,
    pub issuer_profile_url: String,
    /// Compact DID-JWT produced by the signer.
    pub jwt: String,
    /// `ecdsa-koblitz-pubkey:` id of the signing key.
    pub key_id: String,
    pub wallet_address: String,
}

/// Assembles a credential with a fresh `urn:uuid` id issued now.
pub fn assemble_credential(request: &CredentialRequest) -> Result<BlockcertsCredential> {
    assemble_credential_at(request, Uuid::new_v4(), Utc::now())
}

/// Assembles a credential with an explicit id and issuance instant.
pub fn assemble_credential_at(
    request: &CredentialRequest,
    id: Uuid,
    issued_at: DateTime<Utc>,
) -> Result<BlockcertsCredential> {
    if request.issuer_profile_url.trim().is_empty() {
        return Err(IssuanceError::Assembly("issuer profile URL is required".into()));
    }
    if request.jwt.trim().is_empty() {
        return Err(IssuanceError::Assembly("signed assertion is required".into()));
    }
    if !request.key_id.starts_with(KOBLITZ_KEY_PREFIX) {
        return Err(IssuanceError::Assembly(format!(
            "key id must start with {}",
            KOBLITZ_KEY_PREFIX
        )));
    }
    if request.wallet_address.trim().is_empty() {
        return Err(IssuanceError::Assembly("wallet address is required".into()));
    }
    if request.recipient.name.trim().is_empty() || request.recipient.email.trim().is_empty() {
        return Err(IssuanceError::Validation("recipient name and email are required".into()));
    }

    Ok(BlockcertsCredential {
        context: CREDENTIAL_CONTEXT.iter().map(|c| c.to_string()).collect(),
        id: format!("urn:uuid:{}", id),
        credential_type: CREDENTIAL_TYPE.iter().map(|t| t.to_string()).collect(),
        issuer: request.issuer_profile_url.clone(),
        issuance_date: iso_timestamp(issued_at),
        credential_subject: CredentialSubject {
            id: request.jwt.clone(),
            name: request.recipient.name.clone(),
            email: request.recipient.email.clone(),
            public_key: koblitz_key_ref(request.wallet_address.trim()),
            claim: request.transcript.clone(),
        },
        display: render_display(&request.recipient, &request.transcript),
    })
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// HTML summary shown by wallets and verifiers.
fn render_display(recipient: &RecipientData, transcript: &Map<String, Value>) -> Display {
    let mut content = format!("<html><body><h1>{}</h1><dl>", escape_html(&recipient.name));
    for (field, value) in transcript {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        content.push_str(&format!("<dt>{}</dt><dd>{}</dd>", escape_html(field), escape_html(&text)));
    }
    content.push_str("</dl></body></html>");

    Display { content_media_type: DISPLAY_MEDIA_TYPE.to_string(), content }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> CredentialRequest {
        let mut transcript = Map::new();
        transcript.insert("degree".into(), json!("BSc Computer Science"));
        transcript.insert("gpa".into(), json!(3.8));
        CredentialRequest {
            recipient: RecipientData { name: "Ada Student".into(), email: "ada@b.edu".into() },
            transcript,
            issuer_profile_url: "https://u.edu/issuer_profiles/p.json".into(),
            jwt: "eyJ0eXAiOiJKV1QifQ.e30.c2ln".into(),
            key_id: "ecdsa-koblitz-pubkey:04ab".into(),
            wallet_address: "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23".into(),
        }
    }

    #[test]
    fn test_credential_document_shape() {
        let id = Uuid::parse_str("0b8f8f9c-3c9e-4c7e-9a59-1f7d4ed2f0a1").unwrap();
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&Utc);
        let credential = assemble_credential_at(&request(), id, at).unwrap();

        let value = serde_json::to_value(&credential).unwrap();
        assert_eq!(value["@context"], json!(["https://www.w3.org/2018/credentials/v1", "https://w3id.org/blockcerts/v3"]));
        assert_eq!(value["id"], json!("urn:uuid:0b8f8f9c-3c9e-4c7e-9a59-1f7d4ed2f0a1"));
        assert_eq!(value["type"], json!(["VerifiableCredential", "BlockcertsCredential"]));
        assert_eq!(value["issuer"], json!("https://u.edu/issuer_profiles/p.json"));
        assert_eq!(value["issuanceDate"], json!("2024-05-01T10:00:00.000Z"));
        assert_eq!(
            value["credentialSubject"],
            json!({
                "id": "eyJ0eXAiOiJKV1QifQ.e30.c2ln",
                "name": "Ada Student",
                "email": "ada@b.edu",
                "publicKey": "ecdsa-koblitz-pubkey:0x2c7536E3605D9C16a7a3D7b1898e529396a65c23",
                "claim": { "degree": "BSc Computer Science", "gpa": 3.8 }
            })
        );
        assert_eq!(value["display"]["contentMediaType"], json!("text/html"));
        assert!(credential.has_blockcerts_shape());
    }

    #[test]
    fn test_fresh_ids_per_issuance() {
        let a = assemble_credential(&request()).unwrap();
        let b = assemble_credential(&request()).unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.has_blockcerts_shape());
    }

    #[test]
    fn test_missing_issuer_or_assertion_fails() {
        let mut no_issuer = request();
        no_issuer.issuer_profile_url = String::new();
        no_issuer.jwt = "abc".into();
        assert!(matches!(assemble_credential(&no_issuer), Err(IssuanceError::Assembly(_))));

        let mut no_jwt = request();
        no_jwt.issuer_profile_url = "https://x".into();
        no_jwt.jwt = String::new();
        assert!(matches!(assemble_credential(&no_jwt), Err(IssuanceError::Assembly(_))));

        let mut bad_key = request();
        bad_key.key_id = "04ab".into();
        assert!(matches!(assemble_credential(&bad_key), Err(IssuanceError::Assembly(_))));
    }

    #[test]
    fn test_missing_recipient_is_a_validation_error() {
        let mut anonymous = request();
        anonymous.recipient.email = String::new();
        assert!(matches!(assemble_credential(&anonymous), Err(IssuanceError::Validation(_))));
    }

    #[test]
    fn test_display_escapes_transcript_values() {
        let mut req = request();
        req.transcript.insert("note".into(), json!("<script>alert('x')</script>"));
        let credential = assemble_credential(&req).unwrap();

        let content = &credential.display.content;
        assert!(content.starts_with("<html><body><h1>Ada Student</h1>"));
        assert!(content.contains("<dt>degree</dt><dd>BSc Computer Science</dd>"));
        assert!(content.contains("<dt>gpa</dt><dd>3.8</dd>"));
        assert!(content.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!content.contains("<script>"));
    }
}
