use thiserror::Error;

use crate::cbor::CborError;
use crate::storage::StorageError;

/// Malformed binary or textual input from the client or authenticator.
///
/// Decode failures never carry partially decoded structures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("CBOR error: {0}")]
    Cbor(#[from] CborError),

    #[error("Unsupported COSE key type: {0}")]
    UnsupportedKeyType(i64),

    #[error("Malformed COSE key: {0}")]
    MalformedKey(String),

    #[error("Authenticator data truncated at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedData {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Malformed authenticator data: {0}")]
    MalformedAuthenticatorData(String),

    #[error("Malformed attestation object: {0}")]
    MalformedAttestationObject(String),

    #[error("Invalid base64url in field `{0}`")]
    Base64(&'static str),

    #[error("Invalid client data JSON: {0}")]
    ClientData(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),
}

/// How the application layer should treat a failed ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A dependency was unavailable; retrying the whole ceremony is safe.
    Retryable,
    /// The response was rejected; nothing suggests an attack.
    Rejected,
    /// The failure pattern points at cloning or replay and should be alerted on.
    Suspicious,
}

/// Ceremony failure taxonomy.
#[derive(Error, Debug)]
pub enum WebAuthnError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid client response: {0}")]
    InvalidResponse(String),

    #[error("Challenge does not match the issued options")]
    ChallengeMismatch,

    #[error("Origin mismatch: received {received}")]
    OriginMismatch { received: String },

    #[error("Client data type mismatch: expected {expected}, received {received}")]
    TypeMismatch {
        expected: &'static str,
        received: String,
    },

    #[error("RP ID hash mismatch")]
    RpIdHashMismatch,

    #[error("Unsupported attestation format: {0}")]
    UnsupportedAttestationFormat(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("Invalid attestation statement: {0}")]
    InvalidAttestation(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Signature counter regression: stored={stored}, presented={presented}")]
    CounterRegression { stored: u32, presented: u32 },

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Credential is not in the allowed list")]
    CredentialNotAllowed,

    #[error("User handle does not match the credential owner")]
    UserHandleMismatch,

    #[error("Credential already registered")]
    DuplicateCredential,

    #[error("User presence flag not set")]
    UserPresenceRequired,

    #[error("User verification flag not set")]
    UserVerificationRequired,

    #[error("Attestation service unavailable: {0}")]
    AttestationServiceUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WebAuthnError {
    /// Classify the failure for retry and alerting decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AttestationServiceUnavailable(_) => ErrorClass::Retryable,
            Self::Storage(StorageError::Backend(_)) => ErrorClass::Retryable,
            Self::CounterRegression { .. } | Self::DuplicateCredential => ErrorClass::Suspicious,
            _ => ErrorClass::Rejected,
        }
    }
}

pub type Result<T> = std::result::Result<T, WebAuthnError>;
