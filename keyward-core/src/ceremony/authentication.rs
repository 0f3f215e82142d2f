//! Authentication ceremony (`navigator.credentials.get()`).

use tracing::{debug, info, instrument, warn};

use super::options::{
    ClientExtensionInputs, CredentialDescriptor, RequestOptions, UserVerificationRequirement,
};
use super::response::{check_credential_envelope, AuthenticationResponse};
use super::{rp_id_hash, RelyingParty};
use crate::authenticator_data::AuthenticatorData;
use crate::base64url;
use crate::client_data::{client_data_hash, TYPE_GET};
use crate::credential::CredentialRecord;
use crate::error::{Result, WebAuthnError};
use crate::observer::SecurityEvent;
use crate::storage::StorageError;

/// How the signature counter contributed to the assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterStatus {
    /// The counter strictly increased.
    Advanced,
    /// Stored and presented counters were both zero: the authenticator has
    /// no counter, so cloning cannot be detected.
    Unsupported,
}

/// A verified assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    pub credential_id: Vec<u8>,
    pub user_handle: Vec<u8>,
    pub sign_count: u32,
    pub counter_status: CounterStatus,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backed_up: bool,
}

impl RelyingParty {
    /// Build request options. An empty `allow_credentials` permits any
    /// discoverable credential.
    pub fn create_authentication_options(
        &self,
        allow_credentials: Vec<CredentialDescriptor>,
    ) -> Result<RequestOptions> {
        Ok(RequestOptions {
            challenge: self.new_challenge()?,
            timeout: self.timeout_ms(),
            rp_id: self.origins.rp_id(),
            allow_credentials,
            user_verification: self.config.user_verification,
            extensions: ClientExtensionInputs::default(),
        })
    }

    /// Request options restricted to the credentials of `user_handle`.
    pub async fn create_authentication_options_for_user(
        &self,
        user_handle: &[u8],
    ) -> Result<RequestOptions> {
        let credentials = self.store.get_all_for_user(user_handle).await?;
        if credentials.is_empty() {
            return Err(WebAuthnError::UnknownCredential);
        }
        self.create_authentication_options(
            credentials.iter().map(CredentialRecord::descriptor).collect(),
        )
    }

    /// Verify an assertion and advance the stored signature counter.
    ///
    /// Exactly one counter write happens on success and none on failure.
    #[instrument(level = "info", skip_all, fields(credential_id = %response.id))]
    pub async fn verify_authentication(
        &self,
        options: &RequestOptions,
        response: &AuthenticationResponse,
    ) -> Result<AuthenticationResult> {
        check_credential_envelope(&response.id, &response.raw_id, &response.kind)?;

        self.check_client_data(&response.client_data_json, TYPE_GET, &options.challenge)?;

        let record = self
            .store
            .get_by_id(&response.raw_id)
            .await?
            .ok_or(WebAuthnError::UnknownCredential)?;
        if !options.allows(&record.credential_id) {
            return Err(WebAuthnError::CredentialNotAllowed);
        }
        match &response.user_handle {
            Some(handle) if *handle != record.user_handle => {
                return Err(WebAuthnError::UserHandleMismatch);
            }
            None if options.allow_credentials.is_empty() => {
                return Err(WebAuthnError::InvalidResponse(
                    "userHandle is required for discoverable credentials".into(),
                ));
            }
            _ => {}
        }

        let auth_data =
            AuthenticatorData::parse_with_limits(&response.authenticator_data, self.config.decode_limits)?;
        debug!(flags = %auth_data.flags, sign_count = auth_data.sign_count, "Authenticator data decoded");

        self.check_rp_id_hash(options, response, &auth_data)?;
        if !auth_data.flags.user_present() {
            return Err(WebAuthnError::UserPresenceRequired);
        }
        if options.user_verification == UserVerificationRequirement::Required
            && !auth_data.flags.user_verified()
        {
            return Err(WebAuthnError::UserVerificationRequired);
        }

        let mut signed = auth_data.raw.clone();
        signed.extend_from_slice(&client_data_hash(&response.client_data_json));
        if !self
            .verifier
            .verify(record.algorithm, &record.public_key, &signed, &response.signature)?
        {
            return Err(WebAuthnError::SignatureInvalid);
        }

        let counter_status = self.advance_counter(&record, auth_data.sign_count).await?;

        info!(
            credential_id = %base64url::encode(&record.credential_id),
            sign_count = auth_data.sign_count,
            counter = ?counter_status,
            user_verified = auth_data.flags.user_verified(),
            "Assertion verified"
        );

        Ok(AuthenticationResult {
            credential_id: record.credential_id,
            user_handle: record.user_handle,
            sign_count: auth_data.sign_count,
            counter_status,
            user_verified: auth_data.flags.user_verified(),
            backup_eligible: auth_data.flags.backup_eligible(),
            backed_up: auth_data.flags.backed_up(),
        })
    }

    /// The rpIdHash must be SHA-256 of the RP id, or of the AppID when the
    /// client reports having used the FIDO AppID extension.
    fn check_rp_id_hash(
        &self,
        options: &RequestOptions,
        response: &AuthenticationResponse,
        auth_data: &AuthenticatorData,
    ) -> Result<()> {
        if auth_data.rp_id_hash == rp_id_hash(&options.rp_id) {
            return Ok(());
        }
        match (&options.extensions.appid, response.extensions.appid) {
            (Some(appid), Some(true)) if auth_data.rp_id_hash == rp_id_hash(appid) => {
                debug!(appid = %appid, "Assertion scoped to FIDO AppID");
                Ok(())
            }
            _ => Err(WebAuthnError::RpIdHashMismatch),
        }
    }

    /// Apply the counter policy and persist the new value.
    ///
    /// When either counter is non-zero the presented value must be strictly
    /// greater than the stored one. The write is a compare-and-set against
    /// the value read at lookup, so a concurrent assertion that already
    /// advanced the counter turns this one into a regression.
    async fn advance_counter(&self, record: &CredentialRecord, presented: u32) -> Result<CounterStatus> {
        let stored = record.sign_count;
        let status = if presented != 0 || stored != 0 {
            if presented <= stored {
                return Err(self.counter_regression(record, stored, presented));
            }
            CounterStatus::Advanced
        } else {
            CounterStatus::Unsupported
        };

        match self
            .store
            .update_counter(&record.credential_id, stored, presented)
            .await
        {
            Ok(()) => {}
            Err(StorageError::Conflict { current }) => {
                return Err(self.counter_regression(record, current, presented));
            }
            Err(StorageError::NotFound) => return Err(WebAuthnError::UnknownCredential),
            Err(err) => return Err(err.into()),
        }

        if status == CounterStatus::Unsupported {
            self.observer.on_event(&SecurityEvent::CounterUnsupported {
                credential_id: record.credential_id.clone(),
            });
        }
        Ok(status)
    }

    fn counter_regression(&self, record: &CredentialRecord, stored: u32, presented: u32) -> WebAuthnError {
        warn!(stored, presented, "Signature counter did not advance");
        self.observer.on_event(&SecurityEvent::CounterRegression {
            credential_id: record.credential_id.clone(),
            stored,
            presented,
        });
        WebAuthnError::CounterRegression { stored, presented }
    }
}
