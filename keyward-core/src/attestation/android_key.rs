use async_trait::async_trait;
use tracing::debug;
use x509_parser::der_parser::ber::{BerObject, Tag};
use x509_parser::der_parser::der::parse_der;

use super::{
    invalid, require_x5c, statement_alg, statement_bytes, AttestationContext,
    AttestationStatementVerifier, VerifiedAttestation,
};
use crate::credential::TrustPath;
use crate::crypto::certificate;
use crate::error::{Result, WebAuthnError};

/// Android Keystore attestation extension (KeyDescription).
const OID_ANDROID_KEY_DESCRIPTION: &str = "1.3.6.1.4.1.11129.2.1.17";

/// KeyDescription field order: attestationVersion, attestationSecurityLevel,
/// keymasterVersion, keymasterSecurityLevel, attestationChallenge, uniqueId,
/// softwareEnforced, teeEnforced.
const CHALLENGE_INDEX: usize = 4;
const SOFTWARE_ENFORCED_INDEX: usize = 6;
const TEE_ENFORCED_INDEX: usize = 7;

/// `[600] allApplications` in an AuthorizationList.
const TAG_ALL_APPLICATIONS: Tag = Tag(600);

/// `android-key`: a Keystore-backed certificate chain whose leaf certifies
/// the credential key itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidKeyVerifier;

#[async_trait]
impl AttestationStatementVerifier for AndroidKeyVerifier {
    fn format(&self) -> &'static str {
        "android-key"
    }

    async fn verify(&self, ctx: &AttestationContext<'_>) -> Result<VerifiedAttestation> {
        let alg = statement_alg(ctx.statement)?;
        let sig = statement_bytes(ctx.statement, "sig")?;
        let x5c = require_x5c(ctx.statement)?;

        let leaf = certificate::parse(&x5c[0])?;
        let leaf_key = certificate::public_key(&leaf)?;
        if !ctx.verifier.verify(alg, &leaf_key, &ctx.signed_data(), sig)? {
            return Err(WebAuthnError::SignatureInvalid);
        }

        if leaf_key != ctx.credential.public_key.material {
            return Err(invalid(
                "certificate key does not match the credential public key",
            ));
        }

        let extension = certificate::extension_value(&leaf, OID_ANDROID_KEY_DESCRIPTION)
            .ok_or_else(|| invalid("missing Android key description extension"))?;
        let description = KeyDescription::parse(extension)?;

        if description.attestation_challenge != ctx.client_data_hash.as_slice() {
            return Err(invalid(
                "attestationChallenge does not match the client data hash",
            ));
        }
        if description.all_applications {
            return Err(invalid("key is not bound to this application"));
        }

        certificate::verify_chain(&x5c, ctx.trust_anchors, ctx.now)?;
        debug!(%alg, chain_len = x5c.len(), "android-key attestation verified");

        Ok(VerifiedAttestation {
            trust_path: TrustPath::Basic { x5c },
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
struct KeyDescription {
    attestation_challenge: Vec<u8>,
    all_applications: bool,
}

impl KeyDescription {
    fn parse(der: &[u8]) -> Result<Self> {
        let (_, object) =
            parse_der(der).map_err(|err| invalid(format!("key description: {err}")))?;
        let fields = object
            .as_sequence()
            .map_err(|_| invalid("key description is not a sequence"))?;

        let attestation_challenge = fields
            .get(CHALLENGE_INDEX)
            .and_then(|field| field.as_slice().ok())
            .ok_or_else(|| invalid("missing attestationChallenge"))?
            .to_vec();

        let mut all_applications = false;
        for index in [SOFTWARE_ENFORCED_INDEX, TEE_ENFORCED_INDEX] {
            let list = fields
                .get(index)
                .and_then(|field| field.as_sequence().ok())
                .ok_or_else(|| invalid("malformed AuthorizationList"))?;
            all_applications |= list.iter().any(is_all_applications);
        }

        Ok(Self {
            attestation_challenge,
            all_applications,
        })
    }
}

fn is_all_applications(entry: &BerObject<'_>) -> bool {
    entry.header.tag() == TAG_ALL_APPLICATIONS
}
