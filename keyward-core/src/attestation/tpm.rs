//! `tpm` attestation (TPM 2.0).
//!
//! The AIK certificate signs `certInfo` (a TPMS_ATTEST structure). `certInfo`
//! certifies `pubArea` (a TPMT_PUBLIC structure) through its name digest,
//! and `pubArea` must describe the credential public key.

use async_trait::async_trait;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::debug;

use super::{
    invalid, reject_ecdaa, require_x5c, statement_alg, statement_bytes, AttestationContext,
    AttestationStatementVerifier, VerifiedAttestation,
};
use crate::cose::{EcCurve, PublicKeyMaterial};
use crate::credential::TrustPath;
use crate::crypto::{self, certificate};
use crate::error::{Result, WebAuthnError};

const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_SHA1: u16 = 0x0004;
const TPM_ALG_SHA256: u16 = 0x000B;
const TPM_ALG_SHA384: u16 = 0x000C;
const TPM_ALG_SHA512: u16 = 0x000D;
const TPM_ALG_ECC: u16 = 0x0023;

const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

/// tcg-kp-AIKCertificate
const OID_TCG_KP_AIK_CERTIFICATE: &str = "2.23.133.8.3";

/// RSA exponent value meaning "the default exponent".
const DEFAULT_RSA_EXPONENT: u32 = 65_537;

#[derive(Debug, Default, Clone, Copy)]
pub struct TpmVerifier;

#[async_trait]
impl AttestationStatementVerifier for TpmVerifier {
    fn format(&self) -> &'static str {
        "tpm"
    }

    async fn verify(&self, ctx: &AttestationContext<'_>) -> Result<VerifiedAttestation> {
        let version = ctx
            .statement
            .map_get_text("ver")
            .and_then(|ver| ver.as_text());
        if version != Some("2.0") {
            return Err(invalid("tpm ver must be \"2.0\""));
        }
        reject_ecdaa(ctx.statement)?;

        let alg = statement_alg(ctx.statement)?;
        let sig = statement_bytes(ctx.statement, "sig")?;
        let x5c = require_x5c(ctx.statement)?;
        let cert_info_bytes = statement_bytes(ctx.statement, "certInfo")?;
        let pub_area_bytes = statement_bytes(ctx.statement, "pubArea")?;

        let pub_area = PubArea::parse(pub_area_bytes)?;
        if !pub_area.matches(&ctx.credential.public_key.material) {
            return Err(invalid("pubArea does not describe the credential public key"));
        }

        let cert_info = CertInfo::parse(cert_info_bytes)?;
        if cert_info.magic != TPM_GENERATED_VALUE {
            return Err(invalid("certInfo magic is not TPM_GENERATED_VALUE"));
        }
        if cert_info.kind != TPM_ST_ATTEST_CERTIFY {
            return Err(invalid("certInfo type is not TPM_ST_ATTEST_CERTIFY"));
        }
        if cert_info.extra_data != crypto::hash_for(alg, &ctx.signed_data()) {
            return Err(invalid("certInfo extraData does not commit to the attested data"));
        }

        let mut expected_name = pub_area.name_alg.to_be_bytes().to_vec();
        expected_name.extend(name_digest(pub_area.name_alg, pub_area_bytes)?);
        if cert_info.attested_name != expected_name {
            return Err(invalid("certInfo name does not match pubArea"));
        }

        let aik = certificate::parse(&x5c[0])?;
        check_aik(&aik, ctx)?;
        let aik_key = certificate::public_key(&aik)?;
        if !ctx.verifier.verify(alg, &aik_key, cert_info_bytes, sig)? {
            return Err(WebAuthnError::SignatureInvalid);
        }
        certificate::verify_chain(&x5c, ctx.trust_anchors, ctx.now)?;

        debug!(%alg, name_alg = pub_area.name_alg, "tpm attestation verified");
        Ok(VerifiedAttestation {
            trust_path: TrustPath::AttestationCa { x5c },
        })
    }
}

fn check_aik(
    aik: &x509_parser::certificate::X509Certificate<'_>,
    ctx: &AttestationContext<'_>,
) -> Result<()> {
    if !certificate::is_version3(aik) {
        return Err(invalid("AIK certificate must be X.509 v3"));
    }
    if certificate::is_ca(aik)? {
        return Err(invalid("AIK certificate must not be a CA"));
    }
    if !certificate::has_extended_key_usage(aik, OID_TCG_KP_AIK_CERTIFICATE) {
        return Err(invalid("AIK certificate lacks the tcg-kp-AIKCertificate usage"));
    }
    certificate::check_aaguid_extension(aik, ctx.credential.aaguid)
}

fn name_digest(name_alg: u16, data: &[u8]) -> Result<Vec<u8>> {
    match name_alg {
        TPM_ALG_SHA256 => Ok(Sha256::digest(data).to_vec()),
        TPM_ALG_SHA384 => Ok(Sha384::digest(data).to_vec()),
        TPM_ALG_SHA512 => Ok(Sha512::digest(data).to_vec()),
        TPM_ALG_SHA1 => Err(invalid("SHA-1 name algorithm is not accepted")),
        other => Err(invalid(format!("unknown TPM name algorithm 0x{other:04x}"))),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TpmKey {
    Rsa {
        exponent: u32,
        modulus: Vec<u8>,
    },
    Ecc {
        curve_id: u16,
        x: Vec<u8>,
        y: Vec<u8>,
    },
}

/// The fields of TPMT_PUBLIC the attestation checks need.
#[derive(Debug)]
struct PubArea {
    name_alg: u16,
    key: TpmKey,
}

impl PubArea {
    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes, "pubArea");
        let kind = reader.u16()?;
        let name_alg = reader.u16()?;
        let _object_attributes = reader.u32()?;
        let _auth_policy = reader.sized()?;

        let key = match kind {
            TPM_ALG_RSA => {
                let _symmetric = reader.u16()?;
                let _scheme = reader.u16()?;
                let _key_bits = reader.u16()?;
                let exponent = match reader.u32()? {
                    0 => DEFAULT_RSA_EXPONENT,
                    exponent => exponent,
                };
                let modulus = reader.sized()?.to_vec();
                TpmKey::Rsa { exponent, modulus }
            }
            TPM_ALG_ECC => {
                let _symmetric = reader.u16()?;
                let _scheme = reader.u16()?;
                let curve_id = reader.u16()?;
                let _kdf = reader.u16()?;
                let x = reader.sized()?.to_vec();
                let y = reader.sized()?.to_vec();
                TpmKey::Ecc { curve_id, x, y }
            }
            other => return Err(invalid(format!("unsupported pubArea type 0x{other:04x}"))),
        };
        reader.finish()?;

        Ok(Self { name_alg, key })
    }

    fn matches(&self, credential_key: &PublicKeyMaterial) -> bool {
        match (&self.key, credential_key) {
            (TpmKey::Rsa { exponent, modulus }, PublicKeyMaterial::Rsa { n, e }) => {
                strip_leading_zeros(modulus) == n.as_slice()
                    && strip_leading_zeros(&exponent.to_be_bytes()) == e.as_slice()
            }
            (TpmKey::Ecc { curve_id, x: tx, y: ty }, PublicKeyMaterial::Ec2 { curve, x, y }) => {
                let expected_curve = match curve {
                    EcCurve::P256 => TPM_ECC_NIST_P256,
                    EcCurve::P384 => TPM_ECC_NIST_P384,
                    EcCurve::P521 => TPM_ECC_NIST_P521,
                };
                *curve_id == expected_curve && tx == x && ty == y
            }
            _ => false,
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// The fields of TPMS_ATTEST the attestation checks need.
#[derive(Debug)]
struct CertInfo {
    magic: u32,
    kind: u16,
    extra_data: Vec<u8>,
    attested_name: Vec<u8>,
}

impl CertInfo {
    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes, "certInfo");
        let magic = reader.u32()?;
        let kind = reader.u16()?;
        let _qualified_signer = reader.sized()?;
        let extra_data = reader.sized()?.to_vec();
        // clockInfo: clock (8), resetCount (4), restartCount (4), safe (1)
        reader.take(17)?;
        let _firmware_version = reader.take(8)?;
        let attested_name = reader.sized()?.to_vec();
        let _attested_qualified_name = reader.sized()?;
        reader.finish()?;

        Ok(Self {
            magic,
            kind,
            extra_data,
            attested_name,
        })
    }
}

/// Big-endian reader over TPM marshalled structures.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    structure: &'static str,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], structure: &'static str) -> Self {
        Self {
            bytes,
            pos: 0,
            structure,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| invalid(format!("{} truncated at offset {}", self.structure, self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// TPM2B: u16 size followed by that many bytes.
    fn sized(&mut self) -> Result<&'a [u8]> {
        let len = usize::from(self.u16()?);
        self.take(len)
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(invalid(format!(
                "{} has {} trailing bytes",
                self.structure,
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ecc_pub_area(x: &[u8], y: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&TPM_ALG_ECC.to_be_bytes());
        out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        out.extend_from_slice(&0x0006_0472u32.to_be_bytes());
        out.extend_from_slice(&[0x00, 0x00]); // empty authPolicy
        out.extend_from_slice(&[0x00, 0x10]); // symmetric: TPM_ALG_NULL
        out.extend_from_slice(&[0x00, 0x18]); // scheme: ECDSA
        out.extend_from_slice(&TPM_ECC_NIST_P256.to_be_bytes());
        out.extend_from_slice(&[0x00, 0x10]); // kdf: TPM_ALG_NULL
        out.extend_from_slice(&(x.len() as u16).to_be_bytes());
        out.extend_from_slice(x);
        out.extend_from_slice(&(y.len() as u16).to_be_bytes());
        out.extend_from_slice(y);
        out
    }

    #[test]
    fn test_parse_ecc_pub_area() {
        let pub_area = PubArea::parse(&ecc_pub_area(&[1; 32], &[2; 32])).unwrap();
        assert_eq!(pub_area.name_alg, TPM_ALG_SHA256);
        assert!(pub_area.matches(&PublicKeyMaterial::Ec2 {
            curve: EcCurve::P256,
            x: vec![1; 32],
            y: vec![2; 32],
        }));
        assert!(!pub_area.matches(&PublicKeyMaterial::Ec2 {
            curve: EcCurve::P384,
            x: vec![1; 32],
            y: vec![2; 32],
        }));
    }

    #[test]
    fn test_rsa_default_exponent() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&TPM_ALG_RSA.to_be_bytes());
        bytes.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend_from_slice(&[0x00, 0x10, 0x00, 0x14, 0x08, 0x00]);
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x04, 0xC0, 0xFF, 0xEE, 0x01]);

        let pub_area = PubArea::parse(&bytes).unwrap();
        assert_eq!(
            pub_area.key,
            TpmKey::Rsa {
                exponent: 65_537,
                modulus: vec![0xC0, 0xFF, 0xEE, 0x01],
            }
        );
        assert!(pub_area.matches(&PublicKeyMaterial::Rsa {
            n: vec![0xC0, 0xFF, 0xEE, 0x01],
            e: vec![0x01, 0x00, 0x01],
        }));
    }

    #[test]
    fn test_truncated_structures() {
        let bytes = ecc_pub_area(&[1; 32], &[2; 32]);
        assert!(PubArea::parse(&bytes[..bytes.len() - 1]).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(PubArea::parse(&trailing).is_err());

        assert!(CertInfo::parse(&[0xff, 0x54, 0x43]).is_err());
    }

    #[test]
    fn test_parse_cert_info() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&TPM_GENERATED_VALUE.to_be_bytes());
        bytes.extend_from_slice(&TPM_ST_ATTEST_CERTIFY.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]); // qualifiedSigner
        bytes.extend_from_slice(&[0x00, 0x02, 0xAA, 0xBB]); // extraData
        bytes.extend_from_slice(&[0u8; 17]);
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&[0x00, 0x03, 0x00, 0x0B, 0x42]); // name
        bytes.extend_from_slice(&[0x00, 0x00]); // qualifiedName

        let cert_info = CertInfo::parse(&bytes).unwrap();
        assert_eq!(cert_info.magic, TPM_GENERATED_VALUE);
        assert_eq!(cert_info.kind, TPM_ST_ATTEST_CERTIFY);
        assert_eq!(cert_info.extra_data, vec![0xAA, 0xBB]);
        assert_eq!(cert_info.attested_name, vec![0x00, 0x0B, 0x42]);
    }

    #[test]
    fn test_name_digest_algorithms() {
        assert_eq!(name_digest(TPM_ALG_SHA256, b"abc").unwrap().len(), 32);
        assert_eq!(name_digest(TPM_ALG_SHA512, b"abc").unwrap().len(), 64);
        assert!(name_digest(TPM_ALG_SHA1, b"abc").is_err());
    }
}
