use async_trait::async_trait;
use tracing::debug;

use super::{
    invalid, require_x5c, statement_bytes, AttestationContext, AttestationStatementVerifier,
    VerifiedAttestation,
};
use crate::cose::{CoseAlgorithm, EcCurve, PublicKeyMaterial};
use crate::credential::TrustPath;
use crate::crypto::{self, certificate};
use crate::error::{Result, WebAuthnError};

/// `fido-u2f`: a single P-256 attestation certificate signs the U2F
/// registration payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct FidoU2fVerifier;

#[async_trait]
impl AttestationStatementVerifier for FidoU2fVerifier {
    fn format(&self) -> &'static str {
        "fido-u2f"
    }

    async fn verify(&self, ctx: &AttestationContext<'_>) -> Result<VerifiedAttestation> {
        let sig = statement_bytes(ctx.statement, "sig")?;
        let x5c = require_x5c(ctx.statement)?;
        if x5c.len() != 1 {
            return Err(invalid("fido-u2f requires exactly one certificate"));
        }

        let cert = certificate::parse(&x5c[0])?;
        let cert_key = certificate::public_key(&cert)?;
        if !matches!(cert_key, PublicKeyMaterial::Ec2 { curve: EcCurve::P256, .. }) {
            return Err(invalid("fido-u2f certificate key must be P-256"));
        }

        let credential_key = &ctx.credential.public_key.material;
        let public_key_u2f = match credential_key {
            PublicKeyMaterial::Ec2 {
                curve: EcCurve::P256,
                ..
            } => credential_key.sec1_uncompressed(),
            _ => None,
        }
        .ok_or_else(|| invalid("fido-u2f credential key must be P-256"))?;

        let mut data = Vec::with_capacity(1 + 32 + 32 + 65 + ctx.credential.credential_id.len());
        data.push(0x00);
        data.extend_from_slice(&ctx.auth_data.rp_id_hash);
        data.extend_from_slice(ctx.client_data_hash);
        data.extend_from_slice(&ctx.credential.credential_id);
        data.extend_from_slice(&public_key_u2f);

        if !crypto::verify_signature(CoseAlgorithm::ES256, &cert_key, &data, sig)? {
            return Err(WebAuthnError::SignatureInvalid);
        }

        certificate::verify_chain(&x5c, ctx.trust_anchors, ctx.now)?;
        debug!("fido-u2f attestation verified");

        Ok(VerifiedAttestation {
            trust_path: TrustPath::Basic { x5c },
        })
    }
}
