use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::service::{verify_with_policy, AttestationService, ServicePolicy};
use super::{
    invalid, statement_bytes, AttestationContext, AttestationStatementVerifier,
    VerifiedAttestation,
};
use crate::base64url;
use crate::cose::CoseAlgorithm;
use crate::credential::TrustPath;
use crate::crypto::{self, certificate};
use crate::error::{Result, WebAuthnError};

const ATTESTATION_HOSTNAME: &str = "attest.android.com";

#[derive(Deserialize)]
struct JwsHeader {
    alg: String,
    x5c: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetPayload {
    nonce: String,
    timestamp_ms: i64,
    #[serde(default)]
    cts_profile_match: bool,
}

/// `android-safetynet`: a SafetyNet JWS whose nonce commits to the
/// authenticator data and client data hash.
///
/// The JWS is always verified locally. When a remote [`AttestationService`]
/// is attached it must confirm the JWS as well.
pub struct SafetyNetVerifier {
    max_age: Duration,
    service: Option<Arc<dyn AttestationService>>,
    policy: ServicePolicy,
}

impl Default for SafetyNetVerifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl SafetyNetVerifier {
    /// `max_age` bounds how old the SafetyNet `timestampMs` may be.
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            service: None,
            policy: ServicePolicy::default(),
        }
    }

    pub fn with_service(mut self, service: Arc<dyn AttestationService>, policy: ServicePolicy) -> Self {
        self.service = Some(service);
        self.policy = policy;
        self
    }
}

impl std::fmt::Debug for SafetyNetVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyNetVerifier")
            .field("max_age", &self.max_age)
            .field("service", &self.service.as_ref().map(|service| service.name()))
            .field("policy", &self.policy)
            .finish()
    }
}

#[async_trait]
impl AttestationStatementVerifier for SafetyNetVerifier {
    fn format(&self) -> &'static str {
        "android-safetynet"
    }

    #[instrument(level = "debug", skip_all, fields(remote = self.service.is_some()))]
    async fn verify(&self, ctx: &AttestationContext<'_>) -> Result<VerifiedAttestation> {
        let version = ctx
            .statement
            .map_get_text("ver")
            .and_then(|ver| ver.as_text())
            .filter(|ver| !ver.is_empty())
            .ok_or_else(|| invalid("missing ver"))?;
        let jws = std::str::from_utf8(statement_bytes(ctx.statement, "response")?)
            .map_err(|_| invalid("response is not a compact JWS"))?;

        let mut parts = jws.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("response is not a compact JWS"));
        };

        let header: JwsHeader = serde_json::from_slice(&base64url::decode("jws header", header_b64)?)
            .map_err(|e| invalid(format!("JWS header: {e}")))?;
        let alg = match header.alg.as_str() {
            "RS256" => CoseAlgorithm::RS256,
            "ES256" => CoseAlgorithm::ES256,
            other => return Err(invalid(format!("unsupported JWS alg {other}"))),
        };
        let x5c = header
            .x5c
            .iter()
            .map(|cert| {
                STANDARD
                    .decode(cert)
                    .map_err(|_| invalid("JWS x5c entry is not base64"))
            })
            .collect::<Result<Vec<_>>>()?;
        let leaf_der = x5c.first().ok_or_else(|| invalid("JWS without x5c"))?;

        let leaf = certificate::parse(leaf_der)?;
        if !certificate::has_hostname(&leaf, ATTESTATION_HOSTNAME) {
            return Err(invalid(format!(
                "JWS certificate is not issued to {ATTESTATION_HOSTNAME}"
            )));
        }

        let signing_input = &jws[..header_b64.len() + 1 + payload_b64.len()];
        let signature = base64url::decode("jws signature", signature_b64)?;
        let leaf_key = certificate::public_key(&leaf)?;
        if !crypto::verify_signature(alg, &leaf_key, signing_input.as_bytes(), &signature)? {
            return Err(WebAuthnError::SignatureInvalid);
        }
        certificate::verify_chain(&x5c, ctx.trust_anchors, ctx.now)?;

        let payload: SafetyNetPayload =
            serde_json::from_slice(&base64url::decode("jws payload", payload_b64)?)
                .map_err(|e| invalid(format!("JWS payload: {e}")))?;

        let expected_nonce = STANDARD.encode(crypto::sha256(&ctx.signed_data()));
        if payload.nonce != expected_nonce {
            return Err(invalid("SafetyNet nonce does not match"));
        }
        if !payload.cts_profile_match {
            return Err(invalid("ctsProfileMatch is false"));
        }

        let now_ms = ctx.now.timestamp_millis();
        if payload.timestamp_ms > now_ms {
            return Err(invalid("SafetyNet timestamp is in the future"));
        }
        let age_ms = u128::try_from(now_ms - payload.timestamp_ms).unwrap_or(u128::MAX);
        if age_ms > self.max_age.as_millis() {
            return Err(invalid(format!(
                "SafetyNet response is {age_ms} ms old"
            )));
        }

        if let Some(service) = &self.service {
            if !verify_with_policy(service.as_ref(), jws, &self.policy).await? {
                return Err(invalid("attestation service rejected the JWS"));
            }
        }

        debug!(version, chain_len = x5c.len(), "android-safetynet attestation verified");
        Ok(VerifiedAttestation {
            trust_path: TrustPath::Basic { x5c },
        })
    }
}
