//! Session startup policy against shared storage

use sg_engine::{ConnectionRecord, Session};
use sg_plan::WalletAddress;
use sg_test_utils::{test_store, UnavailableKeySource, TEST_NAMESPACE};
use sg_vault::{CryptoBox, KeyDeriver, KvBackend, MemoryBackend, RuntimeEnvironment, SecureStore};
use std::sync::Arc;

#[test]
fn failed_integrity_check_wipes_namespace_only() {
    let backend = Arc::new(MemoryBackend::new());
    let good = test_store(backend.clone());
    let session = Session::open(good, RuntimeEnvironment::new()).unwrap();
    session
        .connect(&ConnectionRecord {
            owner: WalletAddress::new("0xabc"),
            contract: "0xstake".into(),
            network: "mainnet".into(),
            connected_at: chrono::Utc::now(),
        })
        .unwrap();
    session.store_signing_key("0xkey").unwrap();
    backend.put("other:entry", "untouched").unwrap();
    assert_eq!(backend.len(), 3);

    let broken = SecureStore::new(
        TEST_NAMESPACE,
        CryptoBox::new(KeyDeriver::new(1), Arc::new(UnavailableKeySource)),
        backend.clone(),
    );
    let session = Session::open(broken, RuntimeEnvironment::new()).unwrap();

    assert_eq!(backend.len(), 1);
    assert_eq!(backend.get("other:entry").unwrap().as_deref(), Some("untouched"));

    let status = session.security_status();
    assert!(!status.session_active);
    assert!(!status.integrity_verified);
    assert!(!status.encrypted);
    assert!(status.secure_context);
}

#[test]
fn healthy_store_is_left_intact() {
    let backend = Arc::new(MemoryBackend::new());
    let session = Session::open(test_store(backend.clone()), RuntimeEnvironment::new()).unwrap();
    session.store_signing_key("0xkey").unwrap();

    let reopened = Session::open(test_store(backend), RuntimeEnvironment::new()).unwrap();
    assert_eq!(
        reopened.signing_key().unwrap().as_deref().map(String::as_str),
        Some("0xkey")
    );
}

#[test]
fn status_serializes_for_presentation() {
    let env = RuntimeEnvironment::new().with_origin("https://app.example.org");
    let session = Session::open(test_store(Arc::new(MemoryBackend::new())), env).unwrap();
    let json = serde_json::to_value(session.security_status()).unwrap();
    assert_eq!(json["encrypted"], true);
    assert_eq!(json["secureContext"], true);
    assert_eq!(json["sessionActive"], true);
    assert_eq!(json["integrityVerified"], true);
}
