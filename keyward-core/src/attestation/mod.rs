//! Attestation objects and the statement verifier registry.
//!
//! Each `fmt` value maps to one [`AttestationStatementVerifier`]. The
//! registry is assembled when the relying party is built and never changes
//! afterwards; a `fmt` that is not registered is rejected.
//!
//! ## Formats
//!
//! - `none` - no provenance claim
//! - `fido-u2f` - legacy U2F attestation certificate
//! - `packed` - full (x5c) or self attestation
//! - `android-key` - Android Keystore certificate chain
//! - `android-safetynet` - SafetyNet JWS, optionally confirmed by a remote service
//! - `tpm` - TPM 2.0 `certInfo` signed by an AIK certificate

mod android_key;
mod android_safetynet;
mod fido_u2f;
mod none;
mod packed;
pub mod service;
mod tpm;

pub use android_key::AndroidKeyVerifier;
pub use android_safetynet::SafetyNetVerifier;
pub use fido_u2f::FidoU2fVerifier;
pub use none::NoneVerifier;
pub use packed::PackedVerifier;
pub use tpm::TpmVerifier;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::authenticator_data::{AttestedCredentialData, AuthenticatorData};
use crate::cbor::{self, DecodeLimits, Value};
use crate::cose::CoseAlgorithm;
use crate::credential::TrustPath;
use crate::crypto::SignatureVerifier;
use crate::error::{DecodeError, Result, WebAuthnError};

/// Decoded `attestationObject`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub fmt: String,
    pub statement: Value,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    pub fn parse(bytes: &[u8], limits: DecodeLimits) -> Result<Self> {
        let value = cbor::decode_with_limits(bytes, limits).map_err(DecodeError::from)?;
        if value.as_map().is_none() {
            return Err(malformed("attestation object is not a map"));
        }

        let fmt = value
            .map_get_text("fmt")
            .and_then(Value::as_text)
            .ok_or_else(|| malformed("missing or non-text fmt"))?;
        let statement = value
            .map_get_text("attStmt")
            .filter(|stmt| stmt.as_map().is_some())
            .ok_or_else(|| malformed("missing or non-map attStmt"))?;
        let auth_data = value
            .map_get_text("authData")
            .and_then(Value::as_bytes)
            .ok_or_else(|| malformed("missing or non-bytes authData"))?;

        Ok(Self {
            fmt: fmt.to_string(),
            statement: statement.clone(),
            auth_data: AuthenticatorData::parse_with_limits(auth_data, limits)?,
        })
    }
}

/// Everything a statement verifier may look at.
pub struct AttestationContext<'a> {
    pub statement: &'a Value,
    pub auth_data: &'a AuthenticatorData,
    pub credential: &'a AttestedCredentialData,
    pub client_data_hash: &'a [u8; 32],
    pub verifier: &'a SignatureVerifier,
    /// DER roots configured for this format; empty means chains are only
    /// checked internally.
    pub trust_anchors: &'a [Vec<u8>],
    pub now: DateTime<Utc>,
}

impl AttestationContext<'_> {
    /// `authenticatorData ‖ clientDataHash`, the payload most formats sign.
    pub fn signed_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.auth_data.raw.len() + 32);
        data.extend_from_slice(&self.auth_data.raw);
        data.extend_from_slice(self.client_data_hash);
        data
    }
}

/// Outcome of a successful statement verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAttestation {
    pub trust_path: TrustPath,
}

#[async_trait]
pub trait AttestationStatementVerifier: Send + Sync {
    /// The `fmt` identifier this verifier handles.
    fn format(&self) -> &'static str;

    async fn verify(&self, ctx: &AttestationContext<'_>) -> Result<VerifiedAttestation>;
}

/// Registry of statement verifiers keyed by `fmt`.
#[derive(Clone)]
pub struct AttestationFormats {
    verifiers: HashMap<&'static str, Arc<dyn AttestationStatementVerifier>>,
}

impl AttestationFormats {
    pub fn empty() -> Self {
        Self {
            verifiers: HashMap::new(),
        }
    }

    /// All built-in formats. SafetyNet runs without a remote service.
    pub fn with_defaults() -> Self {
        let mut formats = Self::empty();
        formats.register(Arc::new(NoneVerifier));
        formats.register(Arc::new(FidoU2fVerifier));
        formats.register(Arc::new(PackedVerifier));
        formats.register(Arc::new(AndroidKeyVerifier));
        formats.register(Arc::new(SafetyNetVerifier::default()));
        formats.register(Arc::new(TpmVerifier));
        formats
    }

    /// Add or replace the verifier for its format.
    pub fn register(&mut self, verifier: Arc<dyn AttestationStatementVerifier>) {
        self.verifiers.insert(verifier.format(), verifier);
    }

    /// Keep only the listed formats.
    pub fn retain(&mut self, formats: &[String]) {
        self.verifiers
            .retain(|fmt, _| formats.iter().any(|allowed| allowed == fmt));
    }

    pub fn get(&self, fmt: &str) -> Result<&Arc<dyn AttestationStatementVerifier>> {
        self.verifiers
            .get(fmt)
            .ok_or_else(|| WebAuthnError::UnsupportedAttestationFormat(fmt.to_string()))
    }

    pub fn formats(&self) -> Vec<&'static str> {
        let mut formats: Vec<_> = self.verifiers.keys().copied().collect();
        formats.sort_unstable();
        formats
    }
}

impl Default for AttestationFormats {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AttestationFormats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationFormats")
            .field("formats", &self.formats())
            .finish()
    }
}

fn malformed(reason: &str) -> WebAuthnError {
    DecodeError::MalformedAttestationObject(reason.to_string()).into()
}

pub(crate) fn invalid(reason: impl Into<String>) -> WebAuthnError {
    WebAuthnError::InvalidAttestation(reason.into())
}

/// `alg` as a supported COSE algorithm.
pub(crate) fn statement_alg(statement: &Value) -> Result<CoseAlgorithm> {
    let id = statement
        .map_get_text("alg")
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid("missing alg"))?;
    CoseAlgorithm::try_from(id)
}

pub(crate) fn statement_bytes<'a>(statement: &'a Value, key: &str) -> Result<&'a [u8]> {
    statement
        .map_get_text(key)
        .and_then(Value::as_bytes)
        .ok_or_else(|| invalid(format!("missing or non-bytes {key}")))
}

/// `x5c` if present: a non-empty array of DER certificates, leaf first.
pub(crate) fn statement_x5c(statement: &Value) -> Result<Option<Vec<Vec<u8>>>> {
    let Some(x5c) = statement.map_get_text("x5c") else {
        return Ok(None);
    };
    let certs = x5c
        .as_array()
        .filter(|certs| !certs.is_empty())
        .ok_or_else(|| invalid("x5c must be a non-empty array"))?;
    certs
        .iter()
        .map(|cert| {
            cert.as_bytes()
                .map(<[u8]>::to_vec)
                .ok_or_else(|| invalid("x5c entry is not a byte string"))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

pub(crate) fn require_x5c(statement: &Value) -> Result<Vec<Vec<u8>>> {
    statement_x5c(statement)?.ok_or_else(|| invalid("missing x5c"))
}

/// ECDAA is not supported by any format.
pub(crate) fn reject_ecdaa(statement: &Value) -> Result<()> {
    if statement.map_get_text("ecdaaKeyId").is_some() {
        return Err(WebAuthnError::UnsupportedAttestationFormat(
            "ECDAA attestation".into(),
        ));
    }
    Ok(())
}
