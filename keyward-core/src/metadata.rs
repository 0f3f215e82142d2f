//! Authenticator model lookup by AAGUID.
//!
//! A small static table of widely deployed authenticators. The all-zero AAGUID
//! is what authenticators report under `none` attestation or for privacy, so
//! it never maps to a model.

use serde::Serialize;
use uuid::Uuid;

/// Vendor and product name of a known authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatorModel {
    pub aaguid: Uuid,
    pub description: &'static str,
    pub vendor: &'static str,
}

// (aaguid, description, vendor)
static KNOWN_AUTHENTICATORS: &[(&str, &str, &str)] = &[
    ("f24a8e70-d0d3-f82c-2937-32523cc4de5a", "iCloud Keychain", "Apple"),
    ("adce0002-35bc-c60a-648b-0b25f1f05503", "Chrome on Mac", "Google"),
    ("ea9b8d66-4d01-1d21-3ce4-b6b48cb575d4", "Google Password Manager", "Google"),
    ("6028b017-b1d4-4c02-b4b3-afcdafc96bb2", "Windows Hello", "Microsoft"),
    ("08987058-cadc-4b81-b6e1-30de50dcbe96", "Windows Hello Hardware Authenticator", "Microsoft"),
    ("9ddd1817-af5a-4672-a2b9-3e3dd95000a9", "Windows Hello VBS Hardware Authenticator", "Microsoft"),
    ("2fc0579f-8113-47ea-b116-bb5a8db9202a", "YubiKey 5 Series with NFC", "Yubico"),
    ("c5ef55ff-ad9a-4b9f-b580-adebafe026d0", "YubiKey 5Ci", "Yubico"),
    ("fa2b99dc-9e39-4257-8f92-4a30d23c4118", "YubiKey 5 Series with NFC (FIPS)", "Yubico"),
    ("73bb0cd4-e502-49b8-9c6f-b59445bf720b", "YubiKey 5 FIPS Series", "Yubico"),
    ("cb69481e-8ff7-4039-93ec-0a2729a154a8", "YubiKey 5 Series", "Yubico"),
    ("ee882879-721c-4913-9775-3dfcce97072a", "YubiKey 5 Series", "Yubico"),
    ("77010bd7-212a-4fc9-b236-d2ca5e9d4084", "BioPass FIDO2 Authenticator", "Feitian"),
    ("3e22415d-7fdf-4ea4-8a0c-dd60c4249b9d", "ePass FIDO2 Authenticator", "Feitian"),
    ("bada5566-a7aa-401f-bd96-45619a55120d", "1Password", "1Password"),
    ("d548826e-79b4-db40-a3d8-11116f7e8349", "Bitwarden", "Bitwarden"),
    ("531126d6-e717-415c-9320-3d9aa6981239", "Dashlane", "Dashlane"),
    ("53414d53-554e-4700-0000-000000000000", "Samsung Pass", "Samsung"),
];

/// Look up a known authenticator model.
pub fn lookup(aaguid: Uuid) -> Option<AuthenticatorModel> {
    if aaguid.is_nil() {
        return None;
    }
    KNOWN_AUTHENTICATORS
        .iter()
        .find(|(known, _, _)| Uuid::parse_str(known).ok() == Some(aaguid))
        .map(|&(_, description, vendor)| AuthenticatorModel {
            aaguid,
            description,
            vendor,
        })
}
