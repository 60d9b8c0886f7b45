use pretty_assertions::assert_eq;
use repocrm_session::{
    BackendKind, CryptoError, EncryptionConfig, EncryptionService, KdfParams, LoginType,
    SessionState,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn config() -> EncryptionConfig {
    EncryptionConfig {
        backend: BackendKind::Local,
        kdf: KdfParams::testing(),
    }
}

async fn ready_session() -> EncryptionService {
    let service = EncryptionService::new(&config());
    service
        .initialize_from_login("a@b.com", LoginType::Email, Some("pw"))
        .await
        .unwrap();
    service
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Contact {
    name: String,
    phone: Option<String>,
}

#[tokio::test]
async fn starts_uninitialized() {
    let service = EncryptionService::new(&config());
    assert_eq!(service.state(), SessionState::Uninitialized);
    assert!(!service.is_ready());
}

#[tokio::test]
async fn calls_before_login_fail_not_initialized() {
    let service = EncryptionService::new(&config());
    assert!(matches!(service.encrypt("x"), Err(CryptoError::NotInitialized)));
    let blob = repocrm_session::EncryptedBlob::from_encoded("AAAA");
    assert!(matches!(service.decrypt(&blob), Err(CryptoError::NotInitialized)));
    assert!(matches!(
        service.encrypt_object(&Contact { name: "x".into(), phone: None }),
        Err(CryptoError::NotInitialized)
    ));
    assert!(matches!(
        service.decrypt_object::<Contact>(&blob),
        Err(CryptoError::NotInitialized)
    ));
}

#[tokio::test]
async fn login_makes_session_ready() {
    let service = ready_session().await;
    assert_eq!(service.state(), SessionState::Ready);
    let blob = service.encrypt("hello").unwrap();
    assert_eq!(service.decrypt(&blob).unwrap(), "hello");
}

#[tokio::test]
async fn object_roundtrip_through_service() {
    let service = ready_session().await;
    let contact = Contact {
        name: "Ada".into(),
        phone: Some("555-0100".into()),
    };
    let blob = service.encrypt_object(&contact).unwrap();
    assert_eq!(service.decrypt_object::<Contact>(&blob).unwrap(), contact);
}

#[tokio::test]
async fn clear_key_returns_to_uninitialized() {
    let service = ready_session().await;
    let blob = service.encrypt("hello").unwrap();

    service.clear_key();
    assert_eq!(service.state(), SessionState::Uninitialized);
    assert!(matches!(service.decrypt(&blob), Err(CryptoError::NotInitialized)));
}

#[tokio::test]
async fn relogin_reads_previous_session_data() {
    let first = ready_session().await;
    let blob = first.encrypt("kept across sessions").unwrap();
    drop(first);

    let second = ready_session().await;
    assert_eq!(second.decrypt(&blob).unwrap(), "kept across sessions");
}

#[tokio::test]
async fn different_user_cannot_decrypt() {
    let alice = ready_session().await;
    let blob = alice.encrypt("private").unwrap();

    let bob = EncryptionService::new(&config());
    bob.initialize_from_login("bob@b.com", LoginType::Email, Some("pw"))
        .await
        .unwrap();
    assert!(matches!(bob.decrypt(&blob), Err(CryptoError::Decryption)));
}

#[tokio::test]
async fn missing_credential_keeps_session_uninitialized() {
    let service = EncryptionService::new(&config());
    let err = service
        .initialize_from_login("a@b.com", LoginType::Passkey, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::InvalidCredential(LoginType::Passkey)));
    assert!(!service.is_ready());
}

#[tokio::test]
async fn failed_relogin_drops_previous_key() {
    let service = ready_session().await;
    let _ = service
        .initialize_from_login("a@b.com", LoginType::Email, None)
        .await;
    assert!(!service.is_ready());
    assert!(matches!(service.encrypt("x"), Err(CryptoError::NotInitialized)));
}

#[tokio::test]
async fn oauth_login_needs_no_credential() {
    let service = EncryptionService::new(&config());
    service
        .initialize_from_login("user@icloud.com", LoginType::Apple, None)
        .await
        .unwrap();
    assert!(service.is_ready());
}

#[tokio::test]
async fn metadata_reports_labels_only() {
    let service = EncryptionService::new(&config());
    let before = service.metadata();
    assert!(!before.ready);
    assert_eq!(before.backend_type, BackendKind::Local);
    assert_eq!(before.login_type, None);

    service
        .initialize_from_login("a@b.com", LoginType::Email, Some("hunter2"))
        .await
        .unwrap();
    let after = service.metadata();
    assert!(after.ready);
    assert_eq!(after.login_type, Some(LoginType::Email));
    assert_eq!(after.identifier.as_deref(), Some("a@b.com"));

    let json = serde_json::to_string(&after).unwrap();
    assert!(!json.contains("hunter2"));
    assert!(json.contains("\"type\":\"local\""));
    assert!(json.contains("\"loginType\":\"email\""));
}

#[tokio::test]
async fn kms_backend_never_becomes_ready() {
    let service = EncryptionService::new(&EncryptionConfig {
        backend: BackendKind::Kms,
        kdf: KdfParams::testing(),
    });
    let err = service
        .initialize_from_login("a@b.com", LoginType::Email, Some("pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::NotImplemented(_)));
    assert!(!service.is_ready());
    assert_eq!(service.metadata().backend_type, BackendKind::Kms);
}

#[tokio::test]
async fn shared_session_encrypts_from_many_tasks() {
    let service = Arc::new(ready_session().await);
    let mut handles = Vec::new();
    for i in 0..8 {
        let svc = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let text = format!("note {i}");
            let blob = svc.encrypt(&text).unwrap();
            assert_eq!(svc.decrypt(&blob).unwrap(), text);
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

#[test]
fn config_defaults_to_local_backend() {
    let cfg: EncryptionConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg.backend, BackendKind::Local);
    assert_eq!(cfg.kdf, KdfParams::default());
}
