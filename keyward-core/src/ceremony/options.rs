//! Options handed to the client for `navigator.credentials.create()` / `.get()`.
//!
//! All types serialize to the camelCase JSON the WebAuthn browser API expects,
//! with binary fields as base64url.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::base64url;
use crate::challenge::Challenge;
use crate::cose::CoseAlgorithm;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// The account a credential is bound to. `handle` must not contain PII.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntity {
    #[serde(rename = "id", with = "base64url::bytes")]
    pub handle: Vec<u8>,
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl UserEntity {
    pub fn new(handle: impl Into<Vec<u8>>, name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            name: name.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CredentialType {
    #[default]
    #[serde(rename = "public-key")]
    PublicKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub alg: CoseAlgorithm,
}

impl From<CoseAlgorithm> for PublicKeyCredentialParameters {
    fn from(alg: CoseAlgorithm) -> Self {
        Self {
            kind: CredentialType::PublicKey,
            alg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    Internal,
    Hybrid,
}

impl FromStr for AuthenticatorTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usb" => Ok(Self::Usb),
            "nfc" => Ok(Self::Nfc),
            "ble" => Ok(Self::Ble),
            "internal" => Ok(Self::Internal),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// Reference to an existing credential (exclude / allow lists).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub kind: CredentialType,
    #[serde(with = "base64url::bytes")]
    pub id: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<AuthenticatorTransport>,
}

impl CredentialDescriptor {
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: CredentialType::PublicKey,
            id: id.into(),
            transports: Vec::new(),
        }
    }

    pub fn with_transports(mut self, transports: Vec<AuthenticatorTransport>) -> Self {
        self.transports = transports;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticatorAttachment {
    #[serde(rename = "platform")]
    Platform,
    #[serde(rename = "cross-platform")]
    CrossPlatform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Discouraged,
    Preferred,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

impl FromStr for UserVerificationRequirement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(format!("unknown user verification requirement: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

impl FromStr for AttestationConveyance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "indirect" => Ok(Self::Indirect),
            "direct" => Ok(Self::Direct),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown attestation conveyance: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resident_key: Option<ResidentKeyRequirement>,
    #[serde(default)]
    pub require_resident_key: bool,
    #[serde(default)]
    pub user_verification: UserVerificationRequirement,
}

/// Client extension inputs understood by the relying party.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientExtensionInputs {
    /// FIDO AppID for credentials registered through the U2F JavaScript API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cred_props: Option<bool>,
}

/// `PublicKeyCredentialCreationOptions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub challenge: Challenge,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    /// Milliseconds.
    pub timeout: u64,
    #[serde(default)]
    pub exclude_credentials: Vec<CredentialDescriptor>,
    #[serde(default)]
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    #[serde(default)]
    pub attestation: AttestationConveyance,
    #[serde(default)]
    pub extensions: ClientExtensionInputs,
}

impl CreationOptions {
    pub fn offers(&self, alg: CoseAlgorithm) -> bool {
        self.pub_key_cred_params.iter().any(|param| param.alg == alg)
    }
}

/// `PublicKeyCredentialRequestOptions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: Challenge,
    /// Milliseconds.
    pub timeout: u64,
    pub rp_id: String,
    /// Empty means any discoverable credential for this RP.
    #[serde(default)]
    pub allow_credentials: Vec<CredentialDescriptor>,
    #[serde(default)]
    pub user_verification: UserVerificationRequirement,
    #[serde(default)]
    pub extensions: ClientExtensionInputs,
}

impl RequestOptions {
    pub fn allows(&self, credential_id: &[u8]) -> bool {
        self.allow_credentials.is_empty()
            || self
                .allow_credentials
                .iter()
                .any(|descriptor| descriptor.id == credential_id)
    }
}
