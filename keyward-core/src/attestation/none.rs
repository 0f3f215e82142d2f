use async_trait::async_trait;

use super::{invalid, AttestationContext, AttestationStatementVerifier, VerifiedAttestation};
use crate::credential::TrustPath;
use crate::error::Result;

/// `none`: the authenticator makes no provenance claim.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneVerifier;

#[async_trait]
impl AttestationStatementVerifier for NoneVerifier {
    fn format(&self) -> &'static str {
        "none"
    }

    async fn verify(&self, ctx: &AttestationContext<'_>) -> Result<VerifiedAttestation> {
        if !ctx.statement.as_map().is_some_and(<[_]>::is_empty) {
            return Err(invalid("none attestation statement must be empty"));
        }
        Ok(VerifiedAttestation {
            trust_path: TrustPath::None,
        })
    }
}
