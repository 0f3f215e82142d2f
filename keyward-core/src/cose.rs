//! COSE_Key decoding (RFC 9052 / RFC 9053) for credential public keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::base64url;
use crate::cbor::{self, DecodeLimits, Value};
use crate::error::{DecodeError, Result, WebAuthnError};

// COSE_Key common parameters
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
// Key-type specific parameters
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_RSA_N: i64 = -1;
const LABEL_RSA_E: i64 = -2;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

/// Smallest accepted RSA modulus (2048 bits).
pub const MIN_RSA_MODULUS_BYTES: usize = 256;
/// Largest accepted RSA modulus (8192 bits).
pub const MAX_RSA_MODULUS_BYTES: usize = 1024;

/// COSE signature algorithms known to the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum CoseAlgorithm {
    ES256,
    ES384,
    ES512,
    EdDSA,
    PS256,
    PS384,
    PS512,
    RS256,
    RS384,
    RS512,
}

impl CoseAlgorithm {
    /// All algorithms, in the default order of preference.
    pub const ALL: [CoseAlgorithm; 10] = [
        CoseAlgorithm::ES256,
        CoseAlgorithm::EdDSA,
        CoseAlgorithm::ES384,
        CoseAlgorithm::ES512,
        CoseAlgorithm::PS256,
        CoseAlgorithm::PS384,
        CoseAlgorithm::PS512,
        CoseAlgorithm::RS256,
        CoseAlgorithm::RS384,
        CoseAlgorithm::RS512,
    ];

    /// IANA COSE algorithm identifier.
    pub fn id(self) -> i64 {
        match self {
            Self::ES256 => -7,
            Self::ES384 => -35,
            Self::ES512 => -36,
            Self::EdDSA => -8,
            Self::PS256 => -37,
            Self::PS384 => -38,
            Self::PS512 => -39,
            Self::RS256 => -257,
            Self::RS384 => -258,
            Self::RS512 => -259,
        }
    }

    pub fn is_ecdsa(self) -> bool {
        matches!(self, Self::ES256 | Self::ES384 | Self::ES512)
    }

    pub fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::PS256 | Self::PS384 | Self::PS512 | Self::RS256 | Self::RS384 | Self::RS512
        )
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = WebAuthnError;

    fn try_from(id: i64) -> Result<Self> {
        CoseAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.id() == id)
            .ok_or(WebAuthnError::UnsupportedAlgorithm(id))
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> i64 {
        alg.id()
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", self.id())
    }
}

/// NIST curves for EC2 keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    fn from_cose(crv: i64) -> Option<Self> {
        match crv {
            1 => Some(Self::P256),
            2 => Some(Self::P384),
            3 => Some(Self::P521),
            _ => None,
        }
    }

    /// Length in bytes of one affine coordinate.
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    /// The ECDSA algorithm bound to this curve in WebAuthn.
    pub fn algorithm(self) -> CoseAlgorithm {
        match self {
            Self::P256 => CoseAlgorithm::ES256,
            Self::P384 => CoseAlgorithm::ES384,
            Self::P521 => CoseAlgorithm::ES512,
        }
    }
}

/// Octet key pair curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OkpCurve {
    Ed25519,
}

/// Decoded public-key parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty", rename_all = "snake_case")]
pub enum PublicKeyMaterial {
    Ec2 {
        curve: EcCurve,
        #[serde(with = "base64url::bytes")]
        x: Vec<u8>,
        #[serde(with = "base64url::bytes")]
        y: Vec<u8>,
    },
    Rsa {
        #[serde(with = "base64url::bytes")]
        n: Vec<u8>,
        #[serde(with = "base64url::bytes")]
        e: Vec<u8>,
    },
    Okp {
        curve: OkpCurve,
        #[serde(with = "base64url::bytes")]
        x: Vec<u8>,
    },
}

impl PublicKeyMaterial {
    /// SEC1 uncompressed point (`0x04 || x || y`) for EC2 keys.
    pub fn sec1_uncompressed(&self) -> Option<Vec<u8>> {
        match self {
            Self::Ec2 { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Ec2 { .. } => "EC2",
            Self::Rsa { .. } => "RSA",
            Self::Okp { .. } => "OKP",
        }
    }
}

/// A credential public key: algorithm plus key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoseKey {
    pub algorithm: CoseAlgorithm,
    pub material: PublicKeyMaterial,
}

impl CoseKey {
    /// Decode a COSE_Key from its CBOR encoding.
    pub fn from_cbor(bytes: &[u8], limits: DecodeLimits) -> Result<Self> {
        let value = cbor::decode_with_limits(bytes, limits).map_err(DecodeError::from)?;
        Self::from_value(&value)
    }

    /// Decode a COSE_Key from an already decoded CBOR map.
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.as_map().is_none() {
            return Err(malformed("COSE key is not a map"));
        }

        let kty = value
            .map_get_int(LABEL_KTY)
            .and_then(Value::as_i64)
            .ok_or_else(|| malformed("missing or non-integer kty"))?;

        let alg_id = value
            .map_get_int(LABEL_ALG)
            .and_then(Value::as_i64)
            .ok_or_else(|| malformed("missing or non-integer alg"))?;

        let material = match kty {
            KTY_EC2 => decode_ec2(value)?,
            KTY_OKP => decode_okp(value)?,
            KTY_RSA => decode_rsa(value)?,
            other => return Err(DecodeError::UnsupportedKeyType(other).into()),
        };

        let algorithm = CoseAlgorithm::try_from(alg_id)?;
        check_algorithm_matches(algorithm, &material)?;

        Ok(Self {
            algorithm,
            material,
        })
    }
}

fn malformed(reason: impl Into<String>) -> WebAuthnError {
    DecodeError::MalformedKey(reason.into()).into()
}

fn bytes_param<'v>(value: &'v Value, label: i64, name: &str) -> Result<&'v [u8]> {
    value
        .map_get_int(label)
        .and_then(Value::as_bytes)
        .ok_or_else(|| malformed(format!("missing or non-bytes parameter {name}")))
}

fn decode_ec2(value: &Value) -> Result<PublicKeyMaterial> {
    let crv = value
        .map_get_int(LABEL_CRV)
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("missing EC2 crv"))?;
    let curve = EcCurve::from_cose(crv).ok_or_else(|| malformed(format!("unsupported EC2 curve {crv}")))?;

    let x = bytes_param(value, LABEL_X, "x")?;
    // Compressed points carry a boolean y; only uncompressed keys are accepted.
    let y = bytes_param(value, LABEL_Y, "y")?;

    let expected = curve.coordinate_len();
    if x.len() != expected || y.len() != expected {
        return Err(malformed(format!(
            "{curve:?} coordinates must be {expected} bytes, got x={} y={}",
            x.len(),
            y.len()
        )));
    }

    Ok(PublicKeyMaterial::Ec2 {
        curve,
        x: x.to_vec(),
        y: y.to_vec(),
    })
}

fn decode_okp(value: &Value) -> Result<PublicKeyMaterial> {
    let crv = value
        .map_get_int(LABEL_CRV)
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("missing OKP crv"))?;
    if crv != 6 {
        return Err(malformed(format!("unsupported OKP curve {crv}")));
    }

    let x = bytes_param(value, LABEL_X, "x")?;
    if x.len() != 32 {
        return Err(malformed(format!(
            "Ed25519 public key must be 32 bytes, got {}",
            x.len()
        )));
    }

    Ok(PublicKeyMaterial::Okp {
        curve: OkpCurve::Ed25519,
        x: x.to_vec(),
    })
}

fn decode_rsa(value: &Value) -> Result<PublicKeyMaterial> {
    let n = bytes_param(value, LABEL_RSA_N, "n")?;
    let e = bytes_param(value, LABEL_RSA_E, "e")?;
    rsa_material(n, e)
}

/// Validate and normalise RSA parameters (big-endian, leading zeros stripped).
pub(crate) fn rsa_material(n: &[u8], e: &[u8]) -> Result<PublicKeyMaterial> {
    let n = strip_leading_zeros(n);
    let e = strip_leading_zeros(e);

    if n.len() < MIN_RSA_MODULUS_BYTES || n.len() > MAX_RSA_MODULUS_BYTES {
        return Err(malformed(format!(
            "RSA modulus must be {MIN_RSA_MODULUS_BYTES}..={MAX_RSA_MODULUS_BYTES} bytes, got {}",
            n.len()
        )));
    }
    if e.is_empty() || e.len() > 8 {
        return Err(malformed(format!("invalid RSA exponent length {}", e.len())));
    }

    Ok(PublicKeyMaterial::Rsa {
        n: n.to_vec(),
        e: e.to_vec(),
    })
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn check_algorithm_matches(algorithm: CoseAlgorithm, material: &PublicKeyMaterial) -> Result<()> {
    let consistent = match material {
        PublicKeyMaterial::Ec2 { curve, .. } => curve.algorithm() == algorithm,
        PublicKeyMaterial::Okp { .. } => algorithm == CoseAlgorithm::EdDSA,
        PublicKeyMaterial::Rsa { .. } => algorithm.is_rsa(),
    };
    if consistent {
        Ok(())
    } else {
        Err(malformed(format!(
            "algorithm {algorithm} does not match {} key",
            material.kind()
        )))
    }
}
