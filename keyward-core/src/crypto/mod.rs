//! Signature verification across the supported COSE algorithms.
//!
//! `verify` answers `Ok(false)` for a well-formed signature that does not
//! verify. Errors are reserved for inputs that cannot be interpreted at all
//! (unparseable keys or signatures, disallowed algorithms).

pub mod certificate;

use rsa::signature::Verifier as _;
use rsa::{BigUint, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::cose::{CoseAlgorithm, EcCurve, PublicKeyMaterial};
use crate::error::{DecodeError, Result, WebAuthnError};

/// Multi-algorithm verifier restricted to a configured algorithm set.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    allowed: Vec<CoseAlgorithm>,
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new(CoseAlgorithm::ALL)
    }
}

impl SignatureVerifier {
    pub fn new(allowed: impl IntoIterator<Item = CoseAlgorithm>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn allows(&self, alg: CoseAlgorithm) -> bool {
        self.allowed.contains(&alg)
    }

    pub fn allowed(&self) -> &[CoseAlgorithm] {
        &self.allowed
    }

    /// Verify `signature` over `data` with `key` using `alg`.
    pub fn verify(
        &self,
        alg: CoseAlgorithm,
        key: &PublicKeyMaterial,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        if !self.allows(alg) {
            return Err(WebAuthnError::UnsupportedAlgorithm(alg.id()));
        }
        verify_signature(alg, key, data, signature)
    }
}

/// Verify without consulting an allow-list. Used where the algorithm is fixed
/// by the attestation format (fido-u2f, SafetyNet JWS).
pub fn verify_signature(
    alg: CoseAlgorithm,
    key: &PublicKeyMaterial,
    data: &[u8],
    signature: &[u8],
) -> Result<bool> {
    match (alg, key) {
        (alg, PublicKeyMaterial::Ec2 { curve, .. }) if curve.algorithm() == alg => {
            let point = key
                .sec1_uncompressed()
                .ok_or_else(|| malformed_key("EC2 key without coordinates"))?;
            verify_ecdsa(*curve, &point, data, signature)
        }
        (CoseAlgorithm::EdDSA, PublicKeyMaterial::Okp { x, .. }) => {
            verify_ed25519(x, data, signature)
        }
        (alg, PublicKeyMaterial::Rsa { n, e }) if alg.is_rsa() => {
            verify_rsa(alg, n, e, data, signature)
        }
        (alg, key) => Err(malformed_key(format!(
            "algorithm {alg} cannot be used with this key type ({key:?})"
        ))),
    }
}

/// Digest `data` with the hash bound to `alg`.
pub fn hash_for(alg: CoseAlgorithm, data: &[u8]) -> Vec<u8> {
    match alg {
        CoseAlgorithm::ES384 | CoseAlgorithm::PS384 | CoseAlgorithm::RS384 => {
            Sha384::digest(data).to_vec()
        }
        CoseAlgorithm::ES512 | CoseAlgorithm::PS512 | CoseAlgorithm::RS512 => {
            Sha512::digest(data).to_vec()
        }
        // Ed25519 has no external pre-hash; SHA-256 is what WebAuthn binds to it.
        CoseAlgorithm::ES256
        | CoseAlgorithm::EdDSA
        | CoseAlgorithm::PS256
        | CoseAlgorithm::RS256 => Sha256::digest(data).to_vec(),
    }
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn malformed_key(reason: impl Into<String>) -> WebAuthnError {
    DecodeError::MalformedKey(reason.into()).into()
}

fn malformed_signature(reason: impl Into<String>) -> WebAuthnError {
    DecodeError::MalformedSignature(reason.into()).into()
}

fn verify_ecdsa(curve: EcCurve, point: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
    match curve {
        EcCurve::P256 => {
            use p256::ecdsa::{Signature, VerifyingKey};
            let key = VerifyingKey::from_sec1_bytes(point)
                .map_err(|_| malformed_key("P-256 point is not on the curve"))?;
            let sig = Signature::from_der(signature)
                .map_err(|_| malformed_signature("invalid DER ECDSA signature"))?;
            Ok(p256::ecdsa::signature::Verifier::verify(&key, data, &sig).is_ok())
        }
        EcCurve::P384 => {
            use p384::ecdsa::{Signature, VerifyingKey};
            let key = VerifyingKey::from_sec1_bytes(point)
                .map_err(|_| malformed_key("P-384 point is not on the curve"))?;
            let sig = Signature::from_der(signature)
                .map_err(|_| malformed_signature("invalid DER ECDSA signature"))?;
            Ok(p384::ecdsa::signature::Verifier::verify(&key, data, &sig).is_ok())
        }
        EcCurve::P521 => {
            use p521::ecdsa::{Signature, VerifyingKey};
            let key = VerifyingKey::from_sec1_bytes(point)
                .map_err(|_| malformed_key("P-521 point is not on the curve"))?;
            let sig = Signature::from_der(signature)
                .map_err(|_| malformed_signature("invalid DER ECDSA signature"))?;
            Ok(p521::ecdsa::signature::Verifier::verify(&key, data, &sig).is_ok())
        }
    }
}

fn verify_ed25519(x: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
    let bytes: [u8; 32] = x
        .try_into()
        .map_err(|_| malformed_key("Ed25519 key must be 32 bytes"))?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
        .map_err(|_| malformed_key("invalid Ed25519 point"))?;
    let sig = ed25519_dalek::Signature::from_slice(signature)
        .map_err(|_| malformed_signature("Ed25519 signature must be 64 bytes"))?;
    Ok(key.verify(data, &sig).is_ok())
}

fn verify_rsa(alg: CoseAlgorithm, n: &[u8], e: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
    if signature.len() != n.len() {
        return Err(malformed_signature(format!(
            "RSA signature is {} bytes, modulus is {}",
            signature.len(),
            n.len()
        )));
    }

    let key = RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
        .map_err(|err| malformed_key(format!("invalid RSA key: {err}")))?;

    macro_rules! verify_with {
        ($scheme:ident, $digest:ty) => {{
            let verifying_key = rsa::$scheme::VerifyingKey::<$digest>::new(key);
            let sig = rsa::$scheme::Signature::try_from(signature)
                .map_err(|_| malformed_signature("invalid RSA signature encoding"))?;
            verifying_key.verify(data, &sig).is_ok()
        }};
    }

    let valid = match alg {
        CoseAlgorithm::RS256 => verify_with!(pkcs1v15, Sha256),
        CoseAlgorithm::RS384 => verify_with!(pkcs1v15, Sha384),
        CoseAlgorithm::RS512 => verify_with!(pkcs1v15, Sha512),
        CoseAlgorithm::PS256 => verify_with!(pss, Sha256),
        CoseAlgorithm::PS384 => verify_with!(pss, Sha384),
        CoseAlgorithm::PS512 => verify_with!(pss, Sha512),
        other => return Err(malformed_key(format!("{other} is not an RSA algorithm"))),
    };
    Ok(valid)
}
