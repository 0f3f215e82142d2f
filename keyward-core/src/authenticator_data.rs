//! Authenticator data parser.
//!
//! Layout (WebAuthn §6.1):
//!
//! ```text
//! rpIdHash (32) | flags (1) | signCount (4, BE)
//!   [AT] aaguid (16) | credIdLen (2, BE) | credentialId | COSE_Key
//!   [ED] extensions (CBOR map)
//! ```
//!
//! Parsing never compares the rpIdHash; that is a ceremony step.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cbor::{self, CborError, DecodeLimits, Value};
use crate::cose::CoseKey;
use crate::error::{DecodeError, Result};

const RP_ID_HASH_LEN: usize = 32;
const FIXED_HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

/// Largest credential id accepted in attested credential data.
pub const MAX_CREDENTIAL_ID_LEN: usize = 1023;

/// Authenticator data flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatorFlags(u8);

impl AuthenticatorFlags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const BACKUP_ELIGIBLE: u8 = 0x08;
    pub const BACKED_UP: u8 = 0x10;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    fn has(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    pub fn user_present(self) -> bool {
        self.has(Self::USER_PRESENT)
    }

    pub fn user_verified(self) -> bool {
        self.has(Self::USER_VERIFIED)
    }

    pub fn backup_eligible(self) -> bool {
        self.has(Self::BACKUP_ELIGIBLE)
    }

    pub fn backed_up(self) -> bool {
        self.has(Self::BACKED_UP)
    }

    pub fn has_attested_credential_data(self) -> bool {
        self.has(Self::ATTESTED_CREDENTIAL_DATA)
    }

    pub fn has_extension_data(self) -> bool {
        self.has(Self::EXTENSION_DATA)
    }
}

impl fmt::Display for AuthenticatorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::USER_PRESENT, "UP"),
            (Self::USER_VERIFIED, "UV"),
            (Self::BACKUP_ELIGIBLE, "BE"),
            (Self::BACKED_UP, "BS"),
            (Self::ATTESTED_CREDENTIAL_DATA, "AT"),
            (Self::EXTENSION_DATA, "ED"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(mask, _)| self.has(*mask))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "0x{:02x} [{}]", self.0, set.join(" "))
    }
}

/// Credential created during registration.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestedCredentialData {
    pub aaguid: Uuid,
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
    /// The COSE_Key exactly as it appeared on the wire.
    pub public_key_bytes: Vec<u8>,
}

/// Parsed authenticator data. `raw` keeps the received bytes for signature checks.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub flags: AuthenticatorFlags,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
    pub extensions: Option<Value>,
    pub raw: Vec<u8>,
}

impl AuthenticatorData {
    /// Minimum encoded size: rpIdHash, flags and counter.
    pub const MIN_LEN: usize = FIXED_HEADER_LEN;

    /// Parse with default CBOR limits.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::parse_with_limits(bytes, DecodeLimits::default())
    }

    pub fn parse_with_limits(bytes: &[u8], limits: DecodeLimits) -> Result<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(cursor.take(RP_ID_HASH_LEN)?);
        let flags = AuthenticatorFlags::from_bits(cursor.take(1)?[0]);
        let counter = cursor.take(4)?;
        let sign_count = u32::from_be_bytes([counter[0], counter[1], counter[2], counter[3]]);

        if flags.backed_up() && !flags.backup_eligible() {
            return Err(DecodeError::MalformedAuthenticatorData(
                "backup state set without backup eligibility".into(),
            )
            .into());
        }

        let attested_credential = if flags.has_attested_credential_data() {
            Some(parse_attested_credential(&mut cursor, limits)?)
        } else {
            None
        };

        let extensions = if flags.has_extension_data() {
            let value = cursor.cbor(limits)?;
            if value.as_map().is_none() {
                return Err(DecodeError::MalformedAuthenticatorData(
                    "extensions are not a CBOR map".into(),
                )
                .into());
            }
            Some(value)
        } else {
            None
        };

        if cursor.remaining() != 0 {
            return Err(DecodeError::MalformedAuthenticatorData(format!(
                "{} trailing bytes at offset {}",
                cursor.remaining(),
                cursor.pos
            ))
            .into());
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
            extensions,
            raw: bytes.to_vec(),
        })
    }

    /// Credential id from attested credential data, if present.
    pub fn credential_id(&self) -> Option<&[u8]> {
        self.attested_credential
            .as_ref()
            .map(|data| data.credential_id.as_slice())
    }
}

fn parse_attested_credential(
    cursor: &mut Cursor<'_>,
    limits: DecodeLimits,
) -> Result<AttestedCredentialData> {
    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(cursor.take(AAGUID_LEN)?);

    let len_bytes = cursor.take(2)?;
    let id_len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
    if id_len == 0 || id_len > MAX_CREDENTIAL_ID_LEN {
        return Err(DecodeError::MalformedAuthenticatorData(format!(
            "credential id length {id_len} outside 1..={MAX_CREDENTIAL_ID_LEN}"
        ))
        .into());
    }
    let credential_id = cursor.take(id_len)?.to_vec();

    let key_start = cursor.pos;
    let key_value = cursor.cbor(limits)?;
    let public_key_bytes = cursor.bytes[key_start..cursor.pos].to_vec();
    let public_key = CoseKey::from_value(&key_value)?;

    Ok(AttestedCredentialData {
        aaguid: Uuid::from_bytes(aaguid),
        credential_id,
        public_key,
        public_key_bytes,
    })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8]> {
        if needed > self.remaining() {
            return Err(DecodeError::TruncatedData {
                offset: self.pos,
                needed,
                available: self.remaining(),
            }
            .into());
        }
        let slice = &self.bytes[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    /// Decode one CBOR item in place; error offsets are relative to the whole buffer.
    fn cbor(&mut self, limits: DecodeLimits) -> Result<Value> {
        let base = self.pos;
        let (value, consumed) = cbor::decode_prefix(&self.bytes[base..], limits)
            .map_err(|err| CborError::new(base + err.offset, err.kind))
            .map_err(DecodeError::from)?;
        self.pos += consumed;
        Ok(value)
    }
}
