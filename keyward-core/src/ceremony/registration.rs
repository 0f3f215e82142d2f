//! Registration ceremony (`navigator.credentials.create()`).

use tracing::{debug, info, instrument, warn};

use super::options::{
    AuthenticatorSelectionCriteria, ClientExtensionInputs, CreationOptions, CredentialDescriptor,
    RelyingPartyEntity, UserEntity, UserVerificationRequirement,
};
use super::response::{check_credential_envelope, RegistrationResponse};
use super::{rp_id_hash, RelyingParty};
use crate::attestation::{AttestationContext, AttestationObject};
use crate::base64url;
use crate::client_data::{client_data_hash, TYPE_CREATE};
use crate::credential::CredentialRecord;
use crate::error::{Result, WebAuthnError};
use crate::metadata::{self, AuthenticatorModel};
use crate::observer::SecurityEvent;
use crate::storage::StorageError;

/// Longest user handle WebAuthn allows.
const MAX_USER_HANDLE_LEN: usize = 64;

/// A verified and persisted registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationResult {
    pub record: CredentialRecord,
    /// Known authenticator model for the AAGUID, if any.
    pub model: Option<AuthenticatorModel>,
}

impl RelyingParty {
    /// Build creation options for `user`. Has no side effects.
    pub fn create_registration_options(
        &self,
        user: UserEntity,
        exclude_credentials: Vec<CredentialDescriptor>,
    ) -> Result<CreationOptions> {
        if user.handle.is_empty() || user.handle.len() > MAX_USER_HANDLE_LEN {
            return Err(WebAuthnError::Config(format!(
                "user handle must be 1..={MAX_USER_HANDLE_LEN} bytes"
            )));
        }

        Ok(CreationOptions {
            rp: RelyingPartyEntity {
                id: self.origins.rp_id(),
                name: self.config.rp_name.clone(),
                icon: self.config.rp_icon.clone(),
            },
            user,
            challenge: self.new_challenge()?,
            pub_key_cred_params: self
                .verifier
                .allowed()
                .iter()
                .map(|&alg| alg.into())
                .collect(),
            timeout: self.timeout_ms(),
            exclude_credentials,
            authenticator_selection: AuthenticatorSelectionCriteria {
                user_verification: self.config.user_verification,
                ..AuthenticatorSelectionCriteria::default()
            },
            attestation: self.config.attestation,
            extensions: ClientExtensionInputs::default(),
        })
    }

    /// Creation options excluding every credential `user` already owns.
    pub async fn create_registration_options_for_user(
        &self,
        user: UserEntity,
    ) -> Result<CreationOptions> {
        let exclude = self
            .store
            .get_all_for_user(&user.handle)
            .await?
            .iter()
            .map(CredentialRecord::descriptor)
            .collect();
        self.create_registration_options(user, exclude)
    }

    /// Verify a registration response against the options it answers, and
    /// persist the new credential.
    ///
    /// Any failure is terminal and leaves the store untouched.
    #[instrument(level = "info", skip_all, fields(credential_id = %response.id))]
    pub async fn verify_registration(
        &self,
        options: &CreationOptions,
        response: &RegistrationResponse,
    ) -> Result<RegistrationResult> {
        check_credential_envelope(&response.id, &response.raw_id, &response.kind)?;

        self.check_client_data(&response.client_data_json, TYPE_CREATE, &options.challenge)?;
        let client_data_hash = client_data_hash(&response.client_data_json);

        let object = AttestationObject::parse(&response.attestation_object, self.config.decode_limits)?;
        let auth_data = &object.auth_data;
        debug!(fmt = %object.fmt, flags = %auth_data.flags, "Attestation object decoded");

        if auth_data.rp_id_hash != rp_id_hash(&options.rp.id) {
            return Err(WebAuthnError::RpIdHashMismatch);
        }
        if !auth_data.flags.user_present() {
            return Err(WebAuthnError::UserPresenceRequired);
        }
        if options.authenticator_selection.user_verification
            == UserVerificationRequirement::Required
            && !auth_data.flags.user_verified()
        {
            return Err(WebAuthnError::UserVerificationRequired);
        }

        let credential = auth_data.attested_credential.as_ref().ok_or_else(|| {
            WebAuthnError::InvalidResponse("authenticator data has no attested credential".into())
        })?;
        if credential.credential_id != response.raw_id {
            return Err(WebAuthnError::InvalidResponse(
                "rawId does not match the attested credential id".into(),
            ));
        }

        let algorithm = credential.public_key.algorithm;
        if !options.offers(algorithm) || !self.verifier.allows(algorithm) {
            return Err(WebAuthnError::UnsupportedAlgorithm(algorithm.id()));
        }

        let statement_verifier = self.formats.get(&object.fmt)?;
        let verified = statement_verifier
            .verify(&AttestationContext {
                statement: &object.statement,
                auth_data,
                credential,
                client_data_hash: &client_data_hash,
                verifier: &self.verifier,
                trust_anchors: self.config.trust_anchors_for(&object.fmt),
                now: self.clock.now(),
            })
            .await?;

        let record = CredentialRecord {
            credential_id: credential.credential_id.clone(),
            algorithm,
            public_key: credential.public_key.material.clone(),
            sign_count: auth_data.sign_count,
            attestation_type: verified.trust_path.attestation_type(),
            trust_path: verified.trust_path,
            aaguid: credential.aaguid,
            user_handle: options.user.handle.clone(),
            transports: response.transports.clone(),
            backup_eligible: auth_data.flags.backup_eligible(),
            registered_at: self.clock.now(),
        };

        match self.store.insert(record.clone()).await {
            Ok(()) => {}
            Err(StorageError::Duplicate) => {
                warn!("Credential id already registered");
                self.observer.on_event(&SecurityEvent::DuplicateRegistration {
                    credential_id: record.credential_id,
                });
                return Err(WebAuthnError::DuplicateCredential);
            }
            Err(err) => return Err(err.into()),
        }

        let model = metadata::lookup(record.aaguid);
        info!(
            credential_id = %base64url::encode(&record.credential_id),
            fmt = %object.fmt,
            attestation_type = ?record.attestation_type,
            algorithm = %record.algorithm,
            model = model.as_ref().map(|m| m.description).unwrap_or("unknown"),
            "Credential registered"
        );

        Ok(RegistrationResult { record, model })
    }
}
