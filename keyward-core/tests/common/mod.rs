//! Simulated authenticator and helpers shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ciborium::value::Value as Cbor;
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Extension, X509NameBuilder, X509};

use keyward_core::base64url;
use keyward_core::ceremony::response::ClientExtensionResults;
use keyward_core::crypto::sha256;
use keyward_core::{
    AuthenticationResponse, CeremonyObserver, CreationOptions, MemoryCredentialStore,
    RegistrationResponse, RelyingParty, RelyingPartyBuilder, RelyingPartyConfig, RequestOptions,
    SecurityEvent, SeededRandom,
};

pub const RP_ID: &str = "example.com";
pub const ORIGIN: &str = "https://example.com";

pub const UP: u8 = 0x01;
pub const UV: u8 = 0x04;
pub const AT: u8 = 0x40;

pub const AAGUID: [u8; 16] = [
    0x2f, 0xc0, 0x57, 0x9f, 0x81, 0x13, 0x47, 0xea, 0xb1, 0x16, 0xbb, 0x5a, 0x8d, 0xb9, 0x20, 0x2a,
];

pub fn config() -> RelyingPartyConfig {
    RelyingPartyConfig::new("Example", ORIGIN).unwrap()
}

/// Collects security events for assertions.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CeremonyObserver for RecordingObserver {
    fn on_event(&self, event: &SecurityEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub struct Harness {
    pub rp: RelyingParty,
    pub store: Arc<MemoryCredentialStore>,
    pub observer: Arc<RecordingObserver>,
}

pub fn harness() -> Harness {
    harness_with(config(), |builder| builder)
}

pub fn harness_with(
    config: RelyingPartyConfig,
    customize: impl FnOnce(RelyingPartyBuilder) -> RelyingPartyBuilder,
) -> Harness {
    let store = Arc::new(MemoryCredentialStore::new());
    let observer = Arc::new(RecordingObserver::default());
    let builder = RelyingParty::builder(config, store.clone())
        .random_source(Arc::new(SeededRandom::new(7)))
        .observer(observer.clone());
    let rp = customize(builder).build().unwrap();
    Harness {
        rp,
        store,
        observer,
    }
}

// --- CBOR -------------------------------------------------------------------

pub fn cbor(value: &Cbor) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).unwrap();
    out
}

pub fn int(value: i64) -> Cbor {
    Cbor::Integer(value.into())
}

pub fn text(value: &str) -> Cbor {
    Cbor::Text(value.to_string())
}

pub fn bytes(value: &[u8]) -> Cbor {
    Cbor::Bytes(value.to_vec())
}

pub fn map(entries: Vec<(Cbor, Cbor)>) -> Cbor {
    Cbor::Map(entries)
}

pub fn attestation_object(fmt: &str, statement: Cbor, auth_data: &[u8]) -> Vec<u8> {
    cbor(&map(vec![
        (text("fmt"), text(fmt)),
        (text("attStmt"), statement),
        (text("authData"), bytes(auth_data)),
    ]))
}

// --- Keys -------------------------------------------------------------------

pub enum TestKey {
    Es256(p256::ecdsa::SigningKey),
    Es384(p384::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
    /// RSA, signing RS256.
    Rsa(PKey<Private>),
    /// OpenSSL P-256, for keys that also need certificates.
    OpensslP256(PKey<Private>),
}

impl TestKey {
    pub fn es256(seed: u8) -> Self {
        Self::Es256(p256::ecdsa::SigningKey::from_slice(&[seed; 32]).unwrap())
    }

    pub fn es384(seed: u8) -> Self {
        Self::Es384(p384::ecdsa::SigningKey::from_slice(&[seed; 48]).unwrap())
    }

    pub fn ed25519(seed: u8) -> Self {
        Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(&[seed; 32]))
    }

    pub fn rsa() -> Self {
        Self::Rsa(rsa_pkey())
    }

    pub fn openssl_p256() -> Self {
        Self::OpensslP256(p256_pkey())
    }

    pub fn alg(&self) -> i64 {
        match self {
            Self::Es256(_) | Self::OpensslP256(_) => -7,
            Self::Es384(_) => -35,
            Self::Ed25519(_) => -8,
            Self::Rsa(_) => -257,
        }
    }

    pub fn pkey(&self) -> Option<&PKey<Private>> {
        match self {
            Self::Rsa(pkey) | Self::OpensslP256(pkey) => Some(pkey),
            _ => None,
        }
    }

    /// (x, y) for EC2 keys.
    pub fn ec_coordinates(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match self {
            Self::Es256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                Some((point.x()?.to_vec(), point.y()?.to_vec()))
            }
            Self::Es384(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                Some((point.x()?.to_vec(), point.y()?.to_vec()))
            }
            Self::OpensslP256(pkey) => Some(openssl_ec_coordinates(pkey)),
            _ => None,
        }
    }

    pub fn cose_key(&self) -> Vec<u8> {
        let value = match self {
            Self::Es256(_) | Self::OpensslP256(_) | Self::Es384(_) => {
                let (x, y) = self.ec_coordinates().unwrap();
                let crv = if matches!(self, Self::Es384(_)) { 2 } else { 1 };
                map(vec![
                    (int(1), int(2)),
                    (int(3), int(self.alg())),
                    (int(-1), int(crv)),
                    (int(-2), bytes(&x)),
                    (int(-3), bytes(&y)),
                ])
            }
            Self::Ed25519(key) => map(vec![
                (int(1), int(1)),
                (int(3), int(-8)),
                (int(-1), int(6)),
                (int(-2), bytes(&key.verifying_key().to_bytes())),
            ]),
            Self::Rsa(pkey) => {
                let rsa = pkey.rsa().unwrap();
                map(vec![
                    (int(1), int(3)),
                    (int(3), int(-257)),
                    (int(-1), bytes(&rsa.n().to_vec())),
                    (int(-2), bytes(&rsa.e().to_vec())),
                ])
            }
        };
        cbor(&value)
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Es256(key) => {
                use p256::ecdsa::{signature::Signer as _, Signature};
                let signature: Signature = key.sign(data);
                signature.to_der().as_bytes().to_vec()
            }
            Self::Es384(key) => {
                use p384::ecdsa::{signature::Signer as _, Signature};
                let signature: Signature = key.sign(data);
                signature.to_der().as_bytes().to_vec()
            }
            Self::Ed25519(key) => {
                use ed25519_dalek::Signer as _;
                key.sign(data).to_bytes().to_vec()
            }
            Self::Rsa(pkey) | Self::OpensslP256(pkey) => openssl_sign(pkey, data),
        }
    }
}

pub fn p256_pkey() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

pub fn rsa_pkey() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub fn openssl_sign(pkey: &PKey<Private>, data: &[u8]) -> Vec<u8> {
    let mut signer = Signer::new(MessageDigest::sha256(), pkey).unwrap();
    signer.update(data).unwrap();
    signer.sign_to_vec().unwrap()
}

pub fn openssl_ec_coordinates(pkey: &PKey<Private>) -> (Vec<u8>, Vec<u8>) {
    let ec = pkey.ec_key().unwrap();
    let mut ctx = BigNumContext::new().unwrap();
    let mut x = BigNum::new().unwrap();
    let mut y = BigNum::new().unwrap();
    ec.public_key()
        .affine_coordinates_gfp(ec.group(), &mut x, &mut y, &mut ctx)
        .unwrap();
    (x.to_vec_padded(32).unwrap(), y.to_vec_padded(32).unwrap())
}

// --- Certificates -------------------------------------------------------------

pub struct CertSpec<'a> {
    pub common_name: &'a str,
    pub organizational_unit: Option<&'a str>,
    pub ca: bool,
    pub extended_key_usage: Option<&'a str>,
    pub dns_name: Option<&'a str>,
    /// (OID, DER extension value)
    pub extensions: Vec<(&'a str, Vec<u8>)>,
}

impl<'a> CertSpec<'a> {
    pub fn leaf(common_name: &'a str) -> Self {
        Self {
            common_name,
            organizational_unit: None,
            ca: false,
            extended_key_usage: None,
            dns_name: None,
            extensions: Vec::new(),
        }
    }

    pub fn root(common_name: &'a str) -> Self {
        Self {
            ca: true,
            ..Self::leaf(common_name)
        }
    }

    pub fn attestation(common_name: &'a str) -> Self {
        Self {
            organizational_unit: Some("Authenticator Attestation"),
            ..Self::leaf(common_name)
        }
    }
}

/// Issue a certificate for `subject_key`, self-signed when `issuer` is `None`.
pub fn issue_cert(
    spec: &CertSpec<'_>,
    subject_key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("C", "US").unwrap();
    name.append_entry_by_text("O", "Keyward Test").unwrap();
    if let Some(ou) = spec.organizational_unit {
        name.append_entry_by_text("OU", ou).unwrap();
    }
    name.append_entry_by_text("CN", spec.common_name).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(rand_serial()).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some((issuer_cert, _)) => builder.set_issuer_name(issuer_cert.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(subject_key).unwrap();
    let not_before = Asn1Time::from_unix(chrono::Utc::now().timestamp() - 3600).unwrap();
    builder.set_not_before(&not_before).unwrap();
    let not_after = Asn1Time::days_from_now(365).unwrap();
    builder.set_not_after(&not_after).unwrap();

    let constraints = if spec.ca {
        BasicConstraints::new().critical().ca().build().unwrap()
    } else {
        BasicConstraints::new().build().unwrap()
    };
    builder.append_extension(constraints).unwrap();
    if let Some(eku) = spec.extended_key_usage {
        builder
            .append_extension(ExtendedKeyUsage::new().other(eku).build().unwrap())
            .unwrap();
    }
    if let Some(dns) = spec.dns_name {
        let san = SubjectAlternativeName::new()
            .dns(dns)
            .build(&builder.x509v3_context(issuer.map(|(cert, _)| cert.as_ref()), None))
            .unwrap();
        builder.append_extension(san).unwrap();
    }
    for (oid, value) in &spec.extensions {
        let oid = Asn1Object::from_str(oid).unwrap();
        let value = Asn1OctetString::new_from_bytes(value).unwrap();
        builder
            .append_extension(X509Extension::new_from_der(&oid, false, &value).unwrap())
            .unwrap();
    }

    let signing_key = issuer.map(|(_, key)| key).unwrap_or(subject_key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

fn rand_serial() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};
    static SERIAL: AtomicU32 = AtomicU32::new(1000);
    SERIAL.fetch_add(1, Ordering::SeqCst)
}

/// id-fido-gen-ce-aaguid extension value.
pub fn aaguid_extension(aaguid: &[u8; 16]) -> (&'static str, Vec<u8>) {
    let mut value = vec![0x04, 0x10];
    value.extend_from_slice(aaguid);
    ("1.3.6.1.4.1.45724.1.1.4", value)
}

/// A CA and its key.
pub struct TestCa {
    pub cert: X509,
    pub key: PKey<Private>,
}

impl TestCa {
    pub fn new(common_name: &str) -> Self {
        let key = p256_pkey();
        let cert = issue_cert(&CertSpec::root(common_name), &key, None);
        Self { cert, key }
    }

    pub fn issue(&self, spec: &CertSpec<'_>, subject_key: &PKey<Private>) -> X509 {
        issue_cert(spec, subject_key, Some((&self.cert, &self.key)))
    }

    pub fn der(&self) -> Vec<u8> {
        self.cert.to_der().unwrap()
    }
}

// --- Client data and responses -------------------------------------------------

pub fn client_data_json(kind: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    serde_json::json!({
        "type": kind,
        "challenge": base64url::encode(challenge),
        "origin": origin,
        "crossOrigin": false,
    })
    .to_string()
    .into_bytes()
}

/// Knobs for deviating from a conformant response.
#[derive(Debug, Clone)]
pub struct Overrides {
    pub flags: u8,
    pub origin: String,
    pub rp_id: Option<String>,
    pub challenge: Option<Vec<u8>>,
    pub client_data_type: Option<&'static str>,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            flags: UP | UV,
            origin: ORIGIN.to_string(),
            rp_id: None,
            challenge: None,
            client_data_type: None,
        }
    }
}

/// Inputs a statement builder signs over.
pub struct StatementInput<'a> {
    pub auth_data: &'a [u8],
    pub client_data_hash: [u8; 32],
    pub authenticator: &'a Authenticator,
}

impl StatementInput<'_> {
    pub fn signed_data(&self) -> Vec<u8> {
        let mut data = self.auth_data.to_vec();
        data.extend_from_slice(&self.client_data_hash);
        data
    }
}

/// A software authenticator holding one credential.
pub struct Authenticator {
    pub key: TestKey,
    pub credential_id: Vec<u8>,
    pub aaguid: [u8; 16],
}

impl Authenticator {
    pub fn new(key: TestKey) -> Self {
        let credential_id = sha256(&key.cose_key())[..16].to_vec();
        Self {
            key,
            credential_id,
            aaguid: [0; 16],
        }
    }

    pub fn with_aaguid(mut self, aaguid: [u8; 16]) -> Self {
        self.aaguid = aaguid;
        self
    }

    pub fn with_credential_id(mut self, credential_id: Vec<u8>) -> Self {
        self.credential_id = credential_id;
        self
    }

    pub fn registration_auth_data(&self, rp_id: &str, flags: u8, sign_count: u32) -> Vec<u8> {
        let mut data = sha256(rp_id.as_bytes()).to_vec();
        data.push(flags | AT);
        data.extend_from_slice(&sign_count.to_be_bytes());
        data.extend_from_slice(&self.aaguid);
        data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        data.extend_from_slice(&self.credential_id);
        data.extend_from_slice(&self.key.cose_key());
        data
    }

    /// Conformant `none` registration.
    pub fn register(&self, options: &CreationOptions) -> RegistrationResponse {
        self.register_with(options, &Overrides::default(), "none", |_| map(Vec::new()))
    }

    pub fn register_with(
        &self,
        options: &CreationOptions,
        overrides: &Overrides,
        fmt: &str,
        statement: impl FnOnce(&StatementInput<'_>) -> Cbor,
    ) -> RegistrationResponse {
        let challenge = overrides
            .challenge
            .clone()
            .unwrap_or_else(|| options.challenge.as_bytes().to_vec());
        let client_data_json = client_data_json(
            overrides.client_data_type.unwrap_or("webauthn.create"),
            &challenge,
            &overrides.origin,
        );
        let rp_id = overrides.rp_id.as_deref().unwrap_or(&options.rp.id);
        let auth_data = self.registration_auth_data(rp_id, overrides.flags, 0);
        let input = StatementInput {
            auth_data: &auth_data,
            client_data_hash: sha256(&client_data_json),
            authenticator: self,
        };
        let statement = statement(&input);

        RegistrationResponse {
            id: base64url::encode(&self.credential_id),
            raw_id: self.credential_id.clone(),
            kind: "public-key".to_string(),
            attestation_object: attestation_object(fmt, statement, &auth_data),
            client_data_json,
            transports: Vec::new(),
            extensions: ClientExtensionResults::default(),
        }
    }

    /// Conformant assertion with the given counter.
    pub fn assert(&self, options: &RequestOptions, sign_count: u32) -> AuthenticationResponse {
        self.assert_with(options, sign_count, &Overrides::default())
    }

    pub fn assert_with(
        &self,
        options: &RequestOptions,
        sign_count: u32,
        overrides: &Overrides,
    ) -> AuthenticationResponse {
        let challenge = overrides
            .challenge
            .clone()
            .unwrap_or_else(|| options.challenge.as_bytes().to_vec());
        let client_data_json = client_data_json(
            overrides.client_data_type.unwrap_or("webauthn.get"),
            &challenge,
            &overrides.origin,
        );
        let rp_id = overrides.rp_id.as_deref().unwrap_or(&options.rp_id);

        let mut auth_data = sha256(rp_id.as_bytes()).to_vec();
        auth_data.push(overrides.flags);
        auth_data.extend_from_slice(&sign_count.to_be_bytes());

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&sha256(&client_data_json));

        AuthenticationResponse {
            id: base64url::encode(&self.credential_id),
            raw_id: self.credential_id.clone(),
            kind: "public-key".to_string(),
            authenticator_data: auth_data,
            client_data_json,
            signature: self.key.sign(&signed),
            user_handle: None,
            extensions: ClientExtensionResults::default(),
        }
    }
}

pub fn base64_standard(data: &[u8]) -> String {
    STANDARD.encode(data)
}
