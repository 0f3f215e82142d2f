//! Registration and authentication ceremonies.
//!
//! A [`RelyingParty`] issues options and verifies the client's answer to
//! them. It keeps no per-ceremony state: the caller stores the issued
//! options (see [`crate::storage::PendingCeremonies`]) and hands them back
//! together with the response. Results are returned explicitly; nothing is
//! recorded as a session flag.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyward_core::ceremony::{options::UserEntity, RelyingParty};
//! use keyward_core::ceremony::response::RegistrationResponse;
//! use keyward_core::config::RelyingPartyConfig;
//! use keyward_core::storage::MemoryCredentialStore;
//!
//! # async fn example(response_json: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelyingPartyConfig::new("Example", "https://example.com")?;
//! let rp = RelyingParty::new(config, Arc::new(MemoryCredentialStore::new()))?;
//!
//! let user = UserEntity::new(b"user-1".to_vec(), "alice", "Alice");
//! let options = rp.create_registration_options_for_user(user).await?;
//! // ... send `options` to the browser, receive `response_json` ...
//! let response = RegistrationResponse::from_json(response_json)?;
//! let result = rp.verify_registration(&options, &response).await?;
//! println!("registered {:?}", result.record.attestation_type);
//! # Ok(())
//! # }
//! ```

pub mod authentication;
pub mod options;
pub mod registration;
pub mod response;

pub use authentication::{AuthenticationResult, CounterStatus};
pub use registration::RegistrationResult;

use std::sync::Arc;

use tracing::debug;

use crate::attestation::service::{AttestationService, ServicePolicy};
use crate::attestation::{AttestationFormats, AttestationStatementVerifier, SafetyNetVerifier};
use crate::challenge::{Challenge, OsRandom, RandomSource};
use crate::client_data::{ClientDataExpectations, CollectedClientData};
use crate::clock::{Clock, SystemClock};
use crate::config::{OriginProvider, RelyingPartyConfig};
use crate::crypto::{self, SignatureVerifier};
use crate::error::{Result, WebAuthnError};
use crate::observer::{CeremonyObserver, TracingObserver};
use crate::storage::CredentialStore;

/// WebAuthn relying party: issues options and verifies responses.
pub struct RelyingParty {
    config: RelyingPartyConfig,
    store: Arc<dyn CredentialStore>,
    origins: Arc<dyn OriginProvider>,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn CeremonyObserver>,
    formats: AttestationFormats,
    verifier: SignatureVerifier,
}

impl RelyingParty {
    /// Relying party with default collaborators.
    pub fn new(config: RelyingPartyConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Self::builder(config, store).build()
    }

    pub fn builder(
        config: RelyingPartyConfig,
        store: Arc<dyn CredentialStore>,
    ) -> RelyingPartyBuilder {
        RelyingPartyBuilder {
            config,
            store,
            origins: None,
            random: None,
            clock: None,
            observer: None,
            attestation_service: None,
            extra_formats: Vec::new(),
        }
    }

    pub fn config(&self) -> &RelyingPartyConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn formats(&self) -> &AttestationFormats {
        &self.formats
    }

    fn new_challenge(&self) -> Result<Challenge> {
        Challenge::generate(self.random.as_ref(), self.config.challenge_bytes)
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Parse client data and check it against the issued challenge.
    fn check_client_data(
        &self,
        raw: &[u8],
        kind: &'static str,
        challenge: &Challenge,
    ) -> Result<CollectedClientData> {
        let client_data = CollectedClientData::parse(raw)?;
        let origins = self.origins.allowed_origins();
        client_data.verify(&ClientDataExpectations {
            kind,
            challenge: challenge.as_bytes(),
            origins: &origins,
            allow_cross_origin: self.config.allow_cross_origin,
        })?;
        debug!(kind, origin = %client_data.origin, "Client data verified");
        Ok(client_data)
    }
}

/// SHA-256 of an RP id (or AppID), as carried in authenticator data.
fn rp_id_hash(rp_id: &str) -> [u8; 32] {
    crypto::sha256(rp_id.as_bytes())
}

impl std::fmt::Debug for RelyingParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelyingParty")
            .field("rp_id", &self.origins.rp_id())
            .field("origins", &self.origins.allowed_origins())
            .field("formats", &self.formats)
            .field("algorithms", &self.verifier.allowed())
            .finish()
    }
}

/// Builder for [`RelyingParty`]; every collaborator has a production default.
pub struct RelyingPartyBuilder {
    config: RelyingPartyConfig,
    store: Arc<dyn CredentialStore>,
    origins: Option<Arc<dyn OriginProvider>>,
    random: Option<Arc<dyn RandomSource>>,
    clock: Option<Arc<dyn Clock>>,
    observer: Option<Arc<dyn CeremonyObserver>>,
    attestation_service: Option<Arc<dyn AttestationService>>,
    extra_formats: Vec<Arc<dyn AttestationStatementVerifier>>,
}

impl RelyingPartyBuilder {
    /// Override the origins and RP id taken from the configuration.
    pub fn origin_provider(mut self, origins: Arc<dyn OriginProvider>) -> Self {
        self.origins = Some(origins);
        self
    }

    pub fn random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn CeremonyObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Remote confirmation for SafetyNet attestations.
    pub fn attestation_service(mut self, service: Arc<dyn AttestationService>) -> Self {
        self.attestation_service = Some(service);
        self
    }

    /// Add a verifier for another `fmt`, or replace a built-in one.
    pub fn register_format(mut self, verifier: Arc<dyn AttestationStatementVerifier>) -> Self {
        self.extra_formats.push(verifier);
        self
    }

    pub fn build(self) -> Result<RelyingParty> {
        self.config
            .validate()
            .map_err(|e| WebAuthnError::Config(e.to_string()))?;

        let mut formats = AttestationFormats::with_defaults();
        let safetynet = SafetyNetVerifier::new(self.config.safetynet.max_age);
        let policy = ServicePolicy {
            timeout: self.config.safetynet.timeout,
            ..ServicePolicy::default()
        };
        let safetynet = match self.attestation_service.or_else(|| default_service(&self.config)) {
            Some(service) => safetynet.with_service(service, policy),
            None => safetynet,
        };
        formats.register(Arc::new(safetynet));
        for verifier in self.extra_formats {
            formats.register(verifier);
        }
        if let Some(allowed) = &self.config.attestation_formats {
            formats.retain(allowed);
        }

        let origins = self
            .origins
            .unwrap_or_else(|| Arc::new(self.config.clone()) as Arc<dyn OriginProvider>);

        debug!(rp_id = %origins.rp_id(), formats = ?formats.formats(), "Relying party configured");

        Ok(RelyingParty {
            verifier: SignatureVerifier::new(self.config.algorithms.iter().copied()),
            config: self.config,
            store: self.store,
            origins,
            random: self.random.unwrap_or_else(|| Arc::new(OsRandom)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            observer: self.observer.unwrap_or_else(|| Arc::new(TracingObserver)),
            formats,
        })
    }
}

#[cfg(feature = "network")]
fn default_service(config: &RelyingPartyConfig) -> Option<Arc<dyn AttestationService>> {
    use crate::attestation::service::HttpAttestationService;

    let api_key = config.safetynet.api_key.as_ref()?;
    match HttpAttestationService::new(api_key.clone(), config.safetynet.timeout) {
        Ok(service) => Some(Arc::new(service)),
        Err(err) => {
            tracing::warn!(error = %err, "SafetyNet verification service disabled");
            None
        }
    }
}

#[cfg(not(feature = "network"))]
fn default_service(_config: &RelyingPartyConfig) -> Option<Arc<dyn AttestationService>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCredentialStore;

    fn store() -> Arc<dyn CredentialStore> {
        Arc::new(MemoryCredentialStore::new())
    }

    #[test]
    fn test_build_with_defaults() {
        let rp = RelyingParty::new(RelyingPartyConfig::default(), store()).unwrap();
        assert_eq!(rp.formats().formats().len(), 6);
        assert!(format!("{rp:?}").contains("localhost"));
    }

    #[test]
    fn test_format_allow_list() {
        let config = RelyingPartyConfig {
            attestation_formats: Some(vec!["none".into(), "packed".into()]),
            ..RelyingPartyConfig::default()
        };
        let rp = RelyingParty::new(config, store()).unwrap();
        assert_eq!(rp.formats().formats(), vec!["none", "packed"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RelyingPartyConfig {
            algorithms: Vec::new(),
            ..RelyingPartyConfig::default()
        };
        assert!(matches!(
            RelyingParty::new(config, store()),
            Err(WebAuthnError::Config(_))
        ));
    }
}
