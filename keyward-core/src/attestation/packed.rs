use async_trait::async_trait;
use tracing::debug;

use super::{
    invalid, reject_ecdaa, statement_alg, statement_bytes, statement_x5c, AttestationContext,
    AttestationStatementVerifier, VerifiedAttestation,
};
use crate::credential::TrustPath;
use crate::crypto::certificate;
use crate::error::{Result, WebAuthnError};

const ATTESTATION_OU: &str = "Authenticator Attestation";

/// `packed`: full attestation with an x5c chain, or self attestation with
/// the credential key.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackedVerifier;

#[async_trait]
impl AttestationStatementVerifier for PackedVerifier {
    fn format(&self) -> &'static str {
        "packed"
    }

    async fn verify(&self, ctx: &AttestationContext<'_>) -> Result<VerifiedAttestation> {
        reject_ecdaa(ctx.statement)?;
        let alg = statement_alg(ctx.statement)?;
        if !ctx.verifier.allows(alg) {
            return Err(WebAuthnError::UnsupportedAlgorithm(alg.id()));
        }
        let sig = statement_bytes(ctx.statement, "sig")?;
        let data = ctx.signed_data();

        match statement_x5c(ctx.statement)? {
            Some(x5c) => {
                let leaf = certificate::parse(&x5c[0])?;
                check_leaf(&leaf, ctx)?;
                let key = certificate::public_key(&leaf)?;
                if !ctx.verifier.verify(alg, &key, &data, sig)? {
                    return Err(WebAuthnError::SignatureInvalid);
                }
                certificate::verify_chain(&x5c, ctx.trust_anchors, ctx.now)?;
                debug!(%alg, chain_len = x5c.len(), "packed full attestation verified");
                Ok(VerifiedAttestation {
                    trust_path: TrustPath::Basic { x5c },
                })
            }
            None => {
                let credential_key = &ctx.credential.public_key;
                if credential_key.algorithm != alg {
                    return Err(invalid(format!(
                        "self attestation alg {alg} differs from credential alg {}",
                        credential_key.algorithm
                    )));
                }
                if !ctx
                    .verifier
                    .verify(alg, &credential_key.material, &data, sig)?
                {
                    return Err(WebAuthnError::SignatureInvalid);
                }
                debug!(%alg, "packed self attestation verified");
                Ok(VerifiedAttestation {
                    trust_path: TrustPath::SelfAttested,
                })
            }
        }
    }
}

fn check_leaf(
    leaf: &x509_parser::certificate::X509Certificate<'_>,
    ctx: &AttestationContext<'_>,
) -> Result<()> {
    if !certificate::is_version3(leaf) {
        return Err(invalid("attestation certificate must be X.509 v3"));
    }
    if certificate::is_ca(leaf)? {
        return Err(invalid("attestation certificate must not be a CA"));
    }
    if !certificate::has_organizational_unit(leaf, ATTESTATION_OU) {
        return Err(invalid(format!(
            "attestation certificate OU must be \"{ATTESTATION_OU}\""
        )));
    }
    certificate::check_aaguid_extension(leaf, ctx.credential.aaguid)
}
