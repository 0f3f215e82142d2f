//! Authentication ceremony and the signature counter policy.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::*;
use keyward_core::ceremony::options::UserVerificationRequirement;
use keyward_core::{
    CounterStatus, CredentialDescriptor, CredentialRecord, CredentialStore, ErrorClass,
    MemoryCredentialStore, RelyingParty, SecurityEvent, SeededRandom, StorageError, UserEntity,
    WebAuthnError,
};

const HANDLE: &[u8] = b"user-alice";

async fn register(h: &Harness, key: TestKey) -> Authenticator {
    let authenticator = Authenticator::new(key);
    let user = UserEntity::new(HANDLE.to_vec(), "alice", "Alice");
    let options = h.rp.create_registration_options(user, Vec::new()).unwrap();
    h.rp
        .verify_registration(&options, &authenticator.register(&options))
        .await
        .unwrap();
    authenticator
}

#[tokio::test]
async fn test_register_then_authenticate_and_replay() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;

    let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();
    let assertion = authenticator.assert(&options, 1);
    let result = h.rp.verify_authentication(&options, &assertion).await.unwrap();

    assert_eq!(result.credential_id, authenticator.credential_id);
    assert_eq!(result.user_handle, HANDLE);
    assert_eq!(result.sign_count, 1);
    assert_eq!(result.counter_status, CounterStatus::Advanced);
    assert!(result.user_verified);
    let stored = h.store.get_by_id(&authenticator.credential_id).await.unwrap().unwrap();
    assert_eq!(stored.sign_count, 1);

    // Same assertion against freshly issued options.
    let fresh = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();
    let err = h.rp.verify_authentication(&fresh, &assertion).await.unwrap_err();
    assert!(matches!(err, WebAuthnError::ChallengeMismatch));

    // Same assertion against the options it answered.
    let err = h.rp.verify_authentication(&options, &assertion).await.unwrap_err();
    assert!(matches!(
        err,
        WebAuthnError::CounterRegression {
            stored: 1,
            presented: 1
        }
    ));
    assert_eq!(err.class(), ErrorClass::Suspicious);
    assert_eq!(
        h.observer.events(),
        vec![SecurityEvent::CounterRegression {
            credential_id: authenticator.credential_id.clone(),
            stored: 1,
            presented: 1,
        }]
    );
}

#[tokio::test]
async fn test_counter_must_strictly_increase() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;

    for count in [5, 6, 100] {
        let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();
        let result = h
            .rp
            .verify_authentication(&options, &authenticator.assert(&options, count))
            .await
            .unwrap();
        assert_eq!(result.sign_count, count);

        let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();
        let err = h
            .rp
            .verify_authentication(&options, &authenticator.assert(&options, count))
            .await
            .unwrap_err();
        assert!(matches!(err, WebAuthnError::CounterRegression { .. }));
    }

    let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();
    let err = h
        .rp
        .verify_authentication(&options, &authenticator.assert(&options, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WebAuthnError::CounterRegression {
            stored: 100,
            presented: 0
        }
    ));
    let stored = h.store.get_by_id(&authenticator.credential_id).await.unwrap().unwrap();
    assert_eq!(stored.sign_count, 100);
}

#[tokio::test]
async fn test_zero_counters_accepted_as_unsupported() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;

    for _ in 0..2 {
        let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();
        let result = h
            .rp
            .verify_authentication(&options, &authenticator.assert(&options, 0))
            .await
            .unwrap();
        assert_eq!(result.counter_status, CounterStatus::Unsupported);
    }

    let events = h.observer.events();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|event| matches!(event, SecurityEvent::CounterUnsupported { .. })));
}

#[tokio::test]
async fn test_eddsa_and_rsa_assertions() {
    for key in [TestKey::ed25519(9), TestKey::rsa(), TestKey::es384(4)] {
        let h = harness();
        let authenticator = register(&h, key).await;
        let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();

        let result = h
            .rp
            .verify_authentication(&options, &authenticator.assert(&options, 1))
            .await
            .unwrap();
        assert_eq!(result.counter_status, CounterStatus::Advanced);
    }
}

#[tokio::test]
async fn test_signature_from_other_key_rejected() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;
    let impostor = Authenticator::new(TestKey::es256(2))
        .with_credential_id(authenticator.credential_id.clone());

    let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();
    let err = h
        .rp
        .verify_authentication(&options, &impostor.assert(&options, 1))
        .await
        .unwrap_err();

    assert!(matches!(err, WebAuthnError::SignatureInvalid));
    let stored = h.store.get_by_id(&authenticator.credential_id).await.unwrap().unwrap();
    assert_eq!(stored.sign_count, 0);
}

#[tokio::test]
async fn test_tampered_authenticator_data_rejected() {
    let h = harness();
    let authenticator = register(&h, TestKey::ed25519(3)).await;
    let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();

    let mut assertion = authenticator.assert(&options, 1);
    // Bump the counter after signing.
    assertion.authenticator_data[36] = 2;

    let err = h.rp.verify_authentication(&options, &assertion).await.unwrap_err();
    assert!(matches!(err, WebAuthnError::SignatureInvalid));
}

#[tokio::test]
async fn test_unknown_credential() {
    let h = harness();
    let stranger = Authenticator::new(TestKey::es256(4));
    let options = h.rp.create_authentication_options(Vec::new()).unwrap();

    let err = h
        .rp
        .verify_authentication(&options, &stranger.assert(&options, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, WebAuthnError::UnknownCredential));
}

#[tokio::test]
async fn test_options_for_unknown_user() {
    let h = harness();
    let err = h
        .rp
        .create_authentication_options_for_user(b"nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, WebAuthnError::UnknownCredential));
}

#[tokio::test]
async fn test_credential_outside_allow_list() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;
    let options = h
        .rp
        .create_authentication_options(vec![CredentialDescriptor::new(vec![7; 16])])
        .unwrap();

    let err = h
        .rp
        .verify_authentication(&options, &authenticator.assert(&options, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, WebAuthnError::CredentialNotAllowed));
}

#[tokio::test]
async fn test_discoverable_credential_needs_matching_user_handle() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;
    let options = h.rp.create_authentication_options(Vec::new()).unwrap();

    let mut assertion = authenticator.assert(&options, 1);
    let err = h.rp.verify_authentication(&options, &assertion).await.unwrap_err();
    assert!(matches!(err, WebAuthnError::InvalidResponse(_)));

    assertion.user_handle = Some(b"user-mallory".to_vec());
    let err = h.rp.verify_authentication(&options, &assertion).await.unwrap_err();
    assert!(matches!(err, WebAuthnError::UserHandleMismatch));

    assertion.user_handle = Some(HANDLE.to_vec());
    let result = h.rp.verify_authentication(&options, &assertion).await.unwrap();
    assert_eq!(result.user_handle, HANDLE);
}

#[tokio::test]
async fn test_user_verification_required() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;
    let mut options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();
    options.user_verification = UserVerificationRequirement::Required;

    let overrides = Overrides {
        flags: UP,
        ..Overrides::default()
    };
    let err = h
        .rp
        .verify_authentication(&options, &authenticator.assert_with(&options, 1, &overrides))
        .await
        .unwrap_err();
    assert!(matches!(err, WebAuthnError::UserVerificationRequired));
}

#[tokio::test]
async fn test_user_presence_required() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;
    let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();

    let overrides = Overrides {
        flags: UV,
        ..Overrides::default()
    };
    let err = h
        .rp
        .verify_authentication(&options, &authenticator.assert_with(&options, 1, &overrides))
        .await
        .unwrap_err();
    assert!(matches!(err, WebAuthnError::UserPresenceRequired));
}

#[tokio::test]
async fn test_registration_client_data_type_rejected() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;
    let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();

    let overrides = Overrides {
        client_data_type: Some("webauthn.create"),
        ..Overrides::default()
    };
    let err = h
        .rp
        .verify_authentication(&options, &authenticator.assert_with(&options, 1, &overrides))
        .await
        .unwrap_err();
    assert!(matches!(err, WebAuthnError::TypeMismatch { .. }));
}

#[tokio::test]
async fn test_origin_port_difference_rejected() {
    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;
    let options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();

    let overrides = Overrides {
        origin: "https://example.com:444".to_string(),
        ..Overrides::default()
    };
    let err = h
        .rp
        .verify_authentication(&options, &authenticator.assert_with(&options, 1, &overrides))
        .await
        .unwrap_err();
    assert!(matches!(err, WebAuthnError::OriginMismatch { .. }));
}

#[tokio::test]
async fn test_fido_appid_extension() {
    const APPID: &str = "https://example.com/app-id.json";

    let h = harness();
    let authenticator = register(&h, TestKey::es256(1)).await;
    let mut options = h.rp.create_authentication_options_for_user(HANDLE).await.unwrap();
    options.extensions.appid = Some(APPID.to_string());

    let overrides = Overrides {
        rp_id: Some(APPID.to_string()),
        ..Overrides::default()
    };
    let mut assertion = authenticator.assert_with(&options, 1, &overrides);

    let err = h.rp.verify_authentication(&options, &assertion).await.unwrap_err();
    assert!(matches!(err, WebAuthnError::RpIdHashMismatch));

    assertion.extensions.appid = Some(true);
    assert!(h.rp.verify_authentication(&options, &assertion).await.is_ok());
}

/// Serves a snapshot taken before a concurrent assertion advanced the counter.
struct LaggingStore {
    inner: MemoryCredentialStore,
    snapshot: Mutex<Option<CredentialRecord>>,
}

#[async_trait]
impl CredentialStore for LaggingStore {
    async fn get_by_id(&self, credential_id: &[u8]) -> Result<Option<CredentialRecord>, StorageError> {
        if let Some(record) = self.snapshot.lock().unwrap().clone() {
            return Ok(Some(record));
        }
        self.inner.get_by_id(credential_id).await
    }

    async fn get_all_for_user(&self, user_handle: &[u8]) -> Result<Vec<CredentialRecord>, StorageError> {
        self.inner.get_all_for_user(user_handle).await
    }

    async fn insert(&self, record: CredentialRecord) -> Result<(), StorageError> {
        self.inner.insert(record).await
    }

    async fn update_counter(&self, credential_id: &[u8], expected: u32, new: u32) -> Result<(), StorageError> {
        self.inner.update_counter(credential_id, expected, new).await
    }
}

#[tokio::test]
async fn test_lost_counter_race_is_a_regression() {
    let store = Arc::new(LaggingStore {
        inner: MemoryCredentialStore::new(),
        snapshot: Mutex::new(None),
    });
    let observer = Arc::new(RecordingObserver::default());
    let rp = RelyingParty::builder(config(), store.clone())
        .random_source(Arc::new(SeededRandom::new(11)))
        .observer(observer.clone())
        .build()
        .unwrap();

    let authenticator = Authenticator::new(TestKey::es256(1));
    let user = UserEntity::new(HANDLE.to_vec(), "alice", "Alice");
    let options = rp.create_registration_options(user, Vec::new()).unwrap();
    let registered = rp
        .verify_registration(&options, &authenticator.register(&options))
        .await
        .unwrap();
    *store.snapshot.lock().unwrap() = Some(registered.record);

    // Another assertion wins the race and stores counter 5.
    store
        .inner
        .update_counter(&authenticator.credential_id, 0, 5)
        .await
        .unwrap();

    let options = rp.create_authentication_options_for_user(HANDLE).await.unwrap();
    let err = rp
        .verify_authentication(&options, &authenticator.assert(&options, 3))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WebAuthnError::CounterRegression {
            stored: 5,
            presented: 3
        }
    ));
    assert_eq!(
        observer.events(),
        vec![SecurityEvent::CounterRegression {
            credential_id: authenticator.credential_id.clone(),
            stored: 5,
            presented: 3,
        }]
    );
}
