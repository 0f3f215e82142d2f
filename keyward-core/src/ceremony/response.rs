//! Client responses (`PublicKeyCredential` JSON) for both ceremonies.

use serde::{Deserialize, Serialize};

use crate::base64url;
use crate::ceremony::options::AuthenticatorTransport;
use crate::error::{Result, WebAuthnError};

/// Client extension outputs the relying party acts on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientExtensionResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appid: Option<bool>,
}

/// Decoded registration response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub kind: String,
    pub attestation_object: Vec<u8>,
    /// Exactly the bytes the client sent; hashed as-is.
    pub client_data_json: Vec<u8>,
    pub transports: Vec<AuthenticatorTransport>,
    pub extensions: ClientExtensionResults,
}

/// Decoded authentication (assertion) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub kind: String,
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub extensions: ClientExtensionResults,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRegistration {
    id: String,
    raw_id: String,
    #[serde(rename = "type")]
    kind: String,
    response: WireAttestationResponse,
    #[serde(default)]
    client_extension_results: ClientExtensionResults,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAttestationResponse {
    attestation_object: String,
    #[serde(rename = "clientDataJSON")]
    client_data_json: String,
    #[serde(default)]
    transports: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAuthentication {
    id: String,
    raw_id: String,
    #[serde(rename = "type")]
    kind: String,
    response: WireAssertionResponse,
    #[serde(default)]
    client_extension_results: ClientExtensionResults,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAssertionResponse {
    authenticator_data: String,
    #[serde(rename = "clientDataJSON")]
    client_data_json: String,
    signature: String,
    #[serde(default)]
    user_handle: Option<String>,
}

impl RegistrationResponse {
    pub fn from_json(json: &str) -> Result<Self> {
        let wire: WireRegistration = serde_json::from_str(json)
            .map_err(|err| WebAuthnError::InvalidResponse(format!("registration JSON: {err}")))?;

        Ok(Self {
            raw_id: base64url::decode("rawId", &wire.raw_id)?,
            id: wire.id,
            kind: wire.kind,
            attestation_object: base64url::decode(
                "attestationObject",
                &wire.response.attestation_object,
            )?,
            client_data_json: base64url::decode("clientDataJSON", &wire.response.client_data_json)?,
            // Unknown transport hints are dropped.
            transports: wire
                .response
                .transports
                .iter()
                .filter_map(|t| t.parse().ok())
                .collect(),
            extensions: wire.client_extension_results,
        })
    }

    /// Re-encode to the JSON wire form.
    pub fn to_json(&self) -> serde_json::Value {
        let transports: Vec<_> = self
            .transports
            .iter()
            .map(|t| serde_json::to_value(t).unwrap_or_default())
            .collect();
        serde_json::json!({
            "id": self.id,
            "rawId": base64url::encode(&self.raw_id),
            "type": self.kind,
            "response": {
                "attestationObject": base64url::encode(&self.attestation_object),
                "clientDataJSON": base64url::encode(&self.client_data_json),
                "transports": transports,
            },
            "clientExtensionResults": self.extensions,
        })
    }
}

impl AuthenticationResponse {
    pub fn from_json(json: &str) -> Result<Self> {
        let wire: WireAuthentication = serde_json::from_str(json)
            .map_err(|err| WebAuthnError::InvalidResponse(format!("authentication JSON: {err}")))?;

        let user_handle = match wire.response.user_handle.as_deref() {
            None | Some("") => None,
            Some(handle) => Some(base64url::decode("userHandle", handle)?),
        };

        Ok(Self {
            raw_id: base64url::decode("rawId", &wire.raw_id)?,
            id: wire.id,
            kind: wire.kind,
            authenticator_data: base64url::decode(
                "authenticatorData",
                &wire.response.authenticator_data,
            )?,
            client_data_json: base64url::decode("clientDataJSON", &wire.response.client_data_json)?,
            signature: base64url::decode("signature", &wire.response.signature)?,
            user_handle,
            extensions: wire.client_extension_results,
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "rawId": base64url::encode(&self.raw_id),
            "type": self.kind,
            "response": {
                "authenticatorData": base64url::encode(&self.authenticator_data),
                "clientDataJSON": base64url::encode(&self.client_data_json),
                "signature": base64url::encode(&self.signature),
                "userHandle": self.user_handle.as_deref().map(base64url::encode),
            },
            "clientExtensionResults": self.extensions,
        })
    }
}

/// Checks shared by both ceremonies: credential type and `id`/`rawId` agreement.
pub(crate) fn check_credential_envelope(id: &str, raw_id: &[u8], kind: &str) -> Result<()> {
    if kind != "public-key" {
        return Err(WebAuthnError::InvalidResponse(format!(
            "credential type must be public-key, got {kind}"
        )));
    }
    let decoded_id = base64url::decode("id", id)?;
    if decoded_id != raw_id {
        return Err(WebAuthnError::InvalidResponse(
            "id and rawId do not match".into(),
        ));
    }
    Ok(())
}
