//! Persistable credential state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::base64url;
use crate::ceremony::options::{AuthenticatorTransport, CredentialDescriptor, CredentialType};
use crate::cose::{CoseAlgorithm, PublicKeyMaterial};

/// How much the attestation says about the authenticator's provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationType {
    None,
    #[serde(rename = "self")]
    SelfAttestation,
    Basic,
    AttestationCa,
    Ecdaa,
}

/// Evidence backing the attestation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrustPath {
    None,
    #[serde(rename = "self")]
    SelfAttested,
    Basic {
        #[serde(with = "base64url::vec_bytes")]
        x5c: Vec<Vec<u8>>,
    },
    AttestationCa {
        #[serde(with = "base64url::vec_bytes")]
        x5c: Vec<Vec<u8>>,
    },
    Ecdaa {
        #[serde(with = "base64url::bytes")]
        key_id: Vec<u8>,
    },
}

impl TrustPath {
    pub fn attestation_type(&self) -> AttestationType {
        match self {
            Self::None => AttestationType::None,
            Self::SelfAttested => AttestationType::SelfAttestation,
            Self::Basic { .. } => AttestationType::Basic,
            Self::AttestationCa { .. } => AttestationType::AttestationCa,
            Self::Ecdaa { .. } => AttestationType::Ecdaa,
        }
    }
}

/// A registered credential.
///
/// Created once by a successful registration; afterwards only `sign_count`
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(with = "base64url::bytes")]
    pub credential_id: Vec<u8>,
    pub algorithm: CoseAlgorithm,
    pub public_key: PublicKeyMaterial,
    pub sign_count: u32,
    pub attestation_type: AttestationType,
    pub trust_path: TrustPath,
    pub aaguid: Uuid,
    #[serde(with = "base64url::bytes")]
    pub user_handle: Vec<u8>,
    #[serde(default)]
    pub transports: Vec<AuthenticatorTransport>,
    pub backup_eligible: bool,
    pub registered_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Descriptor for exclude and allow lists.
    pub fn descriptor(&self) -> CredentialDescriptor {
        CredentialDescriptor {
            kind: CredentialType::PublicKey,
            id: self.credential_id.clone(),
            transports: self.transports.clone(),
        }
    }
}
