//! Keyward Core - WebAuthn relying-party protocol core
//!
//! This crate verifies WebAuthn registration (attestation) and
//! authentication (assertion) responses and keeps credential state
//! consistent through a pluggable store.
//!
//! # Features
//!
//! - Strict CBOR decoding with depth and item limits
//! - COSE keys for ES256/384/512, EdDSA, PS256/384/512 and RS256/384/512
//! - Attestation formats: none, fido-u2f, packed, android-key,
//!   android-safetynet and tpm, with a registry for more
//! - Signature counter policy with clone detection and compare-and-set updates
//! - Security event hook for counter regressions and duplicate registrations
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyward_core::{AuthenticationResponse, MemoryCredentialStore, RelyingParty, RelyingPartyConfig};
//!
//! # async fn example(assertion_json: &str) -> keyward_core::Result<()> {
//! let config = RelyingPartyConfig::from_env()
//!     .map_err(|e| keyward_core::WebAuthnError::Config(e.to_string()))?;
//! let rp = RelyingParty::new(config, Arc::new(MemoryCredentialStore::new()))?;
//!
//! let options = rp.create_authentication_options(Vec::new())?;
//! // ... send `options` to the browser, receive `assertion_json` ...
//! let response = AuthenticationResponse::from_json(assertion_json)?;
//! let result = rp.verify_authentication(&options, &response).await?;
//! println!("signed in as {:?}", result.user_handle);
//! # Ok(())
//! # }
//! ```

pub mod attestation;
pub mod authenticator_data;
pub mod base64url;
pub mod cbor;
pub mod ceremony;
pub mod challenge;
pub mod client_data;
pub mod clock;
pub mod config;
pub mod cose;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod metadata;
pub mod observer;
pub mod storage;

// Re-export main types for convenience
pub use attestation::{AttestationFormats, AttestationObject, AttestationStatementVerifier};
pub use authenticator_data::{AttestedCredentialData, AuthenticatorData, AuthenticatorFlags};
pub use ceremony::options::{CreationOptions, CredentialDescriptor, RequestOptions, UserEntity};
pub use ceremony::response::{AuthenticationResponse, RegistrationResponse};
pub use ceremony::{
    AuthenticationResult, CounterStatus, RegistrationResult, RelyingParty, RelyingPartyBuilder,
};
pub use challenge::{Challenge, OsRandom, RandomSource, SeededRandom};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, OriginProvider, RelyingPartyConfig};
pub use cose::{CoseAlgorithm, CoseKey, PublicKeyMaterial};
pub use credential::{AttestationType, CredentialRecord, TrustPath};
pub use crypto::SignatureVerifier;
pub use error::{DecodeError, ErrorClass, Result, WebAuthnError};
pub use observer::{CeremonyObserver, SecurityEvent, TracingObserver};
pub use storage::{CredentialStore, MemoryCredentialStore, PendingCeremonies, StorageError};
