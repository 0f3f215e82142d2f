//! X.509 helpers for attestation certificates (x509-parser).

use chrono::{DateTime, Utc};
use uuid::Uuid;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::public_key::PublicKey;
use x509_parser::time::ASN1Time;
use x509_parser::x509::X509Version;

use crate::cose::{self, EcCurve, OkpCurve, PublicKeyMaterial};
use crate::error::{DecodeError, Result, WebAuthnError};

pub const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
pub const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const OID_ED25519: &str = "1.3.101.112";
const OID_CURVE_P256: &str = "1.2.840.10045.3.1.7";
const OID_CURVE_P384: &str = "1.3.132.0.34";
const OID_CURVE_P521: &str = "1.3.132.0.35";

/// id-fido-gen-ce-aaguid
pub const OID_FIDO_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";

pub fn parse(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (rest, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|err| malformed(format!("unparseable certificate: {err}")))?;
    if !rest.is_empty() {
        return Err(malformed(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }
    Ok(cert)
}

/// Public key carried in the certificate's SubjectPublicKeyInfo.
pub fn public_key(cert: &X509Certificate<'_>) -> Result<PublicKeyMaterial> {
    let spki = cert.public_key();
    let algorithm = spki.algorithm.algorithm.to_id_string();

    match algorithm.as_str() {
        OID_EC_PUBLIC_KEY => {
            let curve_oid = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|params| params.as_oid().ok())
                .map(|oid| oid.to_id_string())
                .ok_or_else(|| malformed("EC key without named curve"))?;
            let curve = match curve_oid.as_str() {
                OID_CURVE_P256 => EcCurve::P256,
                OID_CURVE_P384 => EcCurve::P384,
                OID_CURVE_P521 => EcCurve::P521,
                other => return Err(malformed(format!("unsupported EC curve {other}"))),
            };
            let point = spki.subject_public_key.data.as_ref();
            let len = curve.coordinate_len();
            if point.len() != 1 + 2 * len || point[0] != 0x04 {
                return Err(malformed("EC key is not an uncompressed point"));
            }
            Ok(PublicKeyMaterial::Ec2 {
                curve,
                x: point[1..=len].to_vec(),
                y: point[1 + len..].to_vec(),
            })
        }
        OID_RSA_ENCRYPTION => match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => cose::rsa_material(rsa.modulus, rsa.exponent),
            _ => Err(malformed("unparseable RSA public key")),
        },
        OID_ED25519 => {
            let x = spki.subject_public_key.data.as_ref();
            if x.len() != 32 {
                return Err(malformed("Ed25519 key must be 32 bytes"));
            }
            Ok(PublicKeyMaterial::Okp {
                curve: OkpCurve::Ed25519,
                x: x.to_vec(),
            })
        }
        other => Err(malformed(format!("unsupported key algorithm {other}"))),
    }
}

pub fn is_version3(cert: &X509Certificate<'_>) -> bool {
    cert.version() == X509Version::V3
}

/// True when basic constraints mark the certificate as a CA.
pub fn is_ca(cert: &X509Certificate<'_>) -> Result<bool> {
    let constraints = cert
        .basic_constraints()
        .map_err(|err| malformed(format!("basic constraints: {err}")))?;
    Ok(constraints.map(|ext| ext.value.ca).unwrap_or(false))
}

pub fn has_organizational_unit(cert: &X509Certificate<'_>, unit: &str) -> bool {
    cert.subject()
        .iter_organizational_unit()
        .filter_map(|attr| attr.as_str().ok())
        .any(|ou| ou == unit)
}

/// Matches the subject CN or a SAN dNSName.
pub fn has_hostname(cert: &X509Certificate<'_>, hostname: &str) -> bool {
    let in_cn = cert
        .subject()
        .iter_common_name()
        .filter_map(|attr| attr.as_str().ok())
        .any(|cn| cn == hostname);

    let in_san = matches!(cert.subject_alternative_name(), Ok(Some(san))
        if san.value.general_names.iter().any(|name| matches!(name, GeneralName::DNSName(dns) if *dns == hostname)));

    in_cn || in_san
}

pub fn has_extended_key_usage(cert: &X509Certificate<'_>, oid: &str) -> bool {
    matches!(cert.extended_key_usage(), Ok(Some(eku))
        if eku.value.other.iter().any(|usage| usage.to_id_string() == oid))
}

/// Raw value of the extension with `oid`, if present.
pub fn extension_value<'a>(cert: &'a X509Certificate<'_>, oid: &str) -> Option<&'a [u8]> {
    cert.extensions()
        .iter()
        .find(|ext| ext.oid.to_id_string() == oid)
        .map(|ext| ext.value)
}

/// If the id-fido-gen-ce-aaguid extension is present it must equal `aaguid`.
pub fn check_aaguid_extension(cert: &X509Certificate<'_>, aaguid: Uuid) -> Result<()> {
    let Some(value) = extension_value(cert, OID_FIDO_AAGUID) else {
        return Ok(());
    };
    // OCTET STRING wrapping the 16 AAGUID bytes.
    match value {
        [0x04, 0x10, rest @ ..] if rest.len() == 16 && rest == aaguid.as_bytes() => Ok(()),
        [0x04, 0x10, rest @ ..] if rest.len() == 16 => Err(WebAuthnError::InvalidAttestation(
            "certificate AAGUID does not match authenticator data".into(),
        )),
        _ => Err(malformed("malformed AAGUID extension")),
    }
}

/// Check validity windows and issuer signatures along `x5c` (leaf first).
///
/// With a non-empty `anchors`, the last certificate must be one of them or be
/// issued by one of them: issuer name equal to the anchor's subject, signature
/// made with the anchor's key, and the anchor valid at `now`.
pub fn verify_chain(x5c: &[Vec<u8>], anchors: &[Vec<u8>], now: DateTime<Utc>) -> Result<()> {
    let certs = x5c
        .iter()
        .map(|der| parse(der))
        .collect::<Result<Vec<_>>>()?;

    let at = ASN1Time::from_timestamp(now.timestamp())
        .map_err(|err| WebAuthnError::InvalidAttestation(format!("clock: {err}")))?;

    for (index, cert) in certs.iter().enumerate() {
        if !cert.validity().is_valid_at(at) {
            return Err(WebAuthnError::InvalidAttestation(format!(
                "certificate {index} is outside its validity period"
            )));
        }
    }

    for (index, pair) in certs.windows(2).enumerate() {
        pair[0]
            .verify_signature(Some(pair[1].public_key()))
            .map_err(|_| {
                WebAuthnError::InvalidAttestation(format!(
                    "certificate {index} is not signed by its successor"
                ))
            })?;
    }

    if anchors.is_empty() {
        return Ok(());
    }

    let (Some(last), Some(last_der)) = (certs.last(), x5c.last()) else {
        return Err(WebAuthnError::InvalidAttestation("empty certificate chain".into()));
    };

    for anchor_der in anchors {
        if anchor_der == last_der {
            return Ok(());
        }
        let anchor = parse(anchor_der)?;
        if !anchor.validity().is_valid_at(at) {
            continue;
        }
        if last.issuer().as_raw() != anchor.subject().as_raw() {
            continue;
        }
        if last.verify_signature(Some(anchor.public_key())).is_ok() {
            return Ok(());
        }
    }

    Err(WebAuthnError::InvalidAttestation(
        "certificate chain does not lead to a trusted root".into(),
    ))
}

fn malformed(reason: impl Into<String>) -> WebAuthnError {
    DecodeError::MalformedCertificate(reason.into()).into()
}
