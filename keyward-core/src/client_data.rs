//! `CollectedClientData` parsing and the checks shared by both ceremonies.
//!
//! The JSON is parsed only to read fields. Signatures and attestations are
//! always computed over the hash of the bytes exactly as the client sent them.

use serde::Deserialize;

use crate::base64url;
use crate::crypto;
use crate::error::{DecodeError, Result, WebAuthnError};

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenBindingStatus {
    Present,
    Supported,
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenBinding {
    pub status: TokenBindingStatus,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub kind: String,
    /// base64url, as sent by the client.
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: Option<bool>,
    #[serde(default)]
    pub token_binding: Option<TokenBinding>,
}

/// What a ceremony expects of the client data.
#[derive(Debug, Clone, Copy)]
pub struct ClientDataExpectations<'a> {
    pub kind: &'static str,
    pub challenge: &'a [u8],
    pub origins: &'a [String],
    pub allow_cross_origin: bool,
}

impl CollectedClientData {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let client_data: Self = serde_json::from_slice(raw)
            .map_err(|err| DecodeError::ClientData(err.to_string()))?;

        if let Some(TokenBinding {
            status: TokenBindingStatus::Present,
            id: None,
        }) = &client_data.token_binding
        {
            return Err(DecodeError::ClientData(
                "token binding status is present but id is missing".into(),
            )
            .into());
        }

        Ok(client_data)
    }

    /// Check type, challenge and origin, in that order.
    ///
    /// The challenge is compared byte for byte after base64url decoding; a
    /// challenge that does not decode cannot match.
    pub fn verify(&self, expected: &ClientDataExpectations<'_>) -> Result<()> {
        if self.kind != expected.kind {
            return Err(WebAuthnError::TypeMismatch {
                expected: expected.kind,
                received: self.kind.clone(),
            });
        }

        match base64url::decode("challenge", &self.challenge) {
            Ok(challenge) if challenge == expected.challenge => {}
            _ => return Err(WebAuthnError::ChallengeMismatch),
        }

        if !expected.origins.iter().any(|origin| *origin == self.origin) {
            return Err(WebAuthnError::OriginMismatch {
                received: self.origin.clone(),
            });
        }

        if self.cross_origin == Some(true) && !expected.allow_cross_origin {
            return Err(WebAuthnError::InvalidResponse(
                "cross-origin ceremony not permitted".into(),
            ));
        }

        Ok(())
    }
}

/// SHA-256 of the raw clientDataJSON.
pub fn client_data_hash(raw: &[u8]) -> [u8; 32] {
    crypto::sha256(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: [u8; 16] = [0xA5; 16];

    fn client_data_json(kind: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
        serde_json::json!({
            "type": kind,
            "challenge": base64url::encode(challenge),
            "origin": origin,
        })
        .to_string()
        .into_bytes()
    }

    fn expectations<'a>(origins: &'a [String]) -> ClientDataExpectations<'a> {
        ClientDataExpectations {
            kind: TYPE_GET,
            challenge: &CHALLENGE,
            origins,
            allow_cross_origin: false,
        }
    }

    #[test]
    fn test_matching_client_data() {
        let origins = vec!["https://example.com".to_string()];
        let raw = client_data_json(TYPE_GET, &CHALLENGE, "https://example.com");
        let client_data = CollectedClientData::parse(&raw).unwrap();
        client_data.verify(&expectations(&origins)).unwrap();
    }

    #[test]
    fn test_type_checked_first() {
        let origins = vec!["https://example.com".to_string()];
        let raw = client_data_json(TYPE_CREATE, &[0; 16], "https://evil.example");
        let err = CollectedClientData::parse(&raw)
            .unwrap()
            .verify(&expectations(&origins))
            .unwrap_err();
        assert!(matches!(
            err,
            WebAuthnError::TypeMismatch {
                expected: TYPE_GET,
                ..
            }
        ));
    }

    #[test]
    fn test_flipped_challenge_bit() {
        let origins = vec!["https://example.com".to_string()];
        let mut challenge = CHALLENGE;
        challenge[7] ^= 0x01;
        let raw = client_data_json(TYPE_GET, &challenge, "https://example.com");
        let err = CollectedClientData::parse(&raw)
            .unwrap()
            .verify(&expectations(&origins))
            .unwrap_err();
        assert!(matches!(err, WebAuthnError::ChallengeMismatch));
    }

    #[test]
    fn test_undecodable_challenge_is_a_mismatch() {
        let origins = vec!["https://example.com".to_string()];
        let raw = serde_json::json!({
            "type": TYPE_GET,
            "challenge": "not base64url!",
            "origin": "https://example.com",
        })
        .to_string();
        let err = CollectedClientData::parse(raw.as_bytes())
            .unwrap()
            .verify(&expectations(&origins))
            .unwrap_err();
        assert!(matches!(err, WebAuthnError::ChallengeMismatch));
    }

    #[test]
    fn test_origin_must_match_exactly() {
        let origins = vec!["https://example.com".to_string()];
        for origin in [
            "http://example.com",
            "https://example.com:8443",
            "https://sub.example.com",
            "https://example.com/",
        ] {
            let raw = client_data_json(TYPE_GET, &CHALLENGE, origin);
            let err = CollectedClientData::parse(&raw)
                .unwrap()
                .verify(&expectations(&origins))
                .unwrap_err();
            assert!(
                matches!(err, WebAuthnError::OriginMismatch { ref received } if received == origin),
                "{origin} accepted"
            );
        }
    }

    #[test]
    fn test_cross_origin_policy() {
        let origins = vec!["https://example.com".to_string()];
        let raw = serde_json::json!({
            "type": TYPE_GET,
            "challenge": base64url::encode(&CHALLENGE),
            "origin": "https://example.com",
            "crossOrigin": true,
        })
        .to_string();
        let client_data = CollectedClientData::parse(raw.as_bytes()).unwrap();
        assert!(client_data.verify(&expectations(&origins)).is_err());

        let permissive = ClientDataExpectations {
            allow_cross_origin: true,
            ..expectations(&origins)
        };
        client_data.verify(&permissive).unwrap();
    }

    #[test]
    fn test_token_binding_validation() {
        let present_without_id = br#"{"type":"webauthn.get","challenge":"AAAA","origin":"https://example.com","tokenBinding":{"status":"present"}}"#;
        assert!(CollectedClientData::parse(present_without_id).is_err());

        let unknown_status = br#"{"type":"webauthn.get","challenge":"AAAA","origin":"https://example.com","tokenBinding":{"status":"bogus"}}"#;
        assert!(CollectedClientData::parse(unknown_status).is_err());

        let supported = br#"{"type":"webauthn.get","challenge":"AAAA","origin":"https://example.com","tokenBinding":{"status":"not-supported"}}"#;
        let client_data = CollectedClientData::parse(supported).unwrap();
        assert_eq!(
            client_data.token_binding.map(|tb| tb.status),
            Some(TokenBindingStatus::NotSupported)
        );
    }

    #[test]
    fn test_malformed_json() {
        let err = CollectedClientData::parse(b"{not json").unwrap_err();
        assert!(matches!(
            err,
            WebAuthnError::Decode(DecodeError::ClientData(_))
        ));
    }
}
