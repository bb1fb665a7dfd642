use base64::{Engine, engine::general_purpose::STANDARD};
use krats_crypto::{
    CryptoError, EnvLookup, KEY_SIZE, KeyStore, SecretKind, SecretMaterial, SecretSource,
};
use krats_types::{AuditAction, MemoryAuditSink};
use std::collections::HashMap;
use std::sync::{Arc, Barrier};

fn no_env() -> EnvLookup {
    Arc::new(|_| None)
}

fn env_with(pairs: &[(&str, String)]) -> EnvLookup {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect();
    Arc::new(move |name| map.get(name).cloned())
}

// ── resolution order ─────────────────────────────────────────────

#[test]
fn injected_material_wins_over_env_and_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("secret.key"), STANDARD.encode([3u8; 32])).unwrap();
    let store = KeyStore::builder(dir.path())
        .env_lookup(env_with(&[("KRATS_ENCRYPTION_KEY", STANDARD.encode([2u8; 32]))]))
        .with_material(SecretKind::EncryptionKey, SecretMaterial::from_bytes(vec![1u8; 32]))
        .build();

    let key = store.resolve(SecretKind::EncryptionKey).unwrap();
    assert_eq!(key.as_bytes(), &[1u8; 32]);
    assert_eq!(store.source(SecretKind::EncryptionKey), Some(SecretSource::Injected));
}

#[test]
fn env_wins_over_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("secret.key"), STANDARD.encode([3u8; 32])).unwrap();
    let store = KeyStore::builder(dir.path())
        .env_lookup(env_with(&[("KRATS_ENCRYPTION_KEY", STANDARD.encode([2u8; 32]))]))
        .build();

    let key = store.resolve(SecretKind::EncryptionKey).unwrap();
    assert_eq!(key.as_bytes(), &[2u8; 32]);
    assert_eq!(store.source(SecretKind::EncryptionKey), Some(SecretSource::Environment));
}

#[test]
fn custom_env_var_name_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::builder(dir.path())
        .env_var(SecretKind::LicenseSigning, "CLINIC_LICENSE_SECRET")
        .env_lookup(env_with(&[("CLINIC_LICENSE_SECRET", STANDARD.encode([9u8; 20]))]))
        .build();

    assert_eq!(store.env_var_name(SecretKind::LicenseSigning), "CLINIC_LICENSE_SECRET");
    let secret = store.resolve(SecretKind::LicenseSigning).unwrap();
    assert_eq!(secret.len(), 20);
}

#[test]
fn url_safe_env_value_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let raw = [0xFBu8; 32];
    let encoded = base64::engine::general_purpose::URL_SAFE.encode(raw);
    let store = KeyStore::builder(dir.path())
        .env_lookup(env_with(&[("KRATS_ENCRYPTION_KEY", encoded)]))
        .build();
    assert_eq!(store.resolve(SecretKind::EncryptionKey).unwrap().as_bytes(), &raw);
}

#[test]
fn blank_env_value_falls_through_to_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("secret.key"), STANDARD.encode([4u8; 32])).unwrap();
    let store = KeyStore::builder(dir.path())
        .env_lookup(env_with(&[("KRATS_ENCRYPTION_KEY", "  ".to_string())]))
        .build();

    assert_eq!(store.resolve(SecretKind::EncryptionKey).unwrap().as_bytes(), &[4u8; 32]);
    assert_eq!(store.source(SecretKind::EncryptionKey), Some(SecretSource::KeyFile));
}

// ── generation and persistence ───────────────────────────────────

#[test]
fn generates_and_persists_when_absent() {
    let dir = tempfile::tempdir().unwrap();
    let key_dir = dir.path().join("keys");
    let store = KeyStore::builder(&key_dir).env_lookup(no_env()).build();

    let key = store.resolve(SecretKind::EncryptionKey).unwrap();
    assert_eq!(key.len(), KEY_SIZE);
    assert!(key.as_bytes().iter().any(|b| *b != 0));
    assert_eq!(store.source(SecretKind::EncryptionKey), Some(SecretSource::Generated));

    let on_disk = std::fs::read_to_string(key_dir.join("secret.key")).unwrap();
    assert_eq!(STANDARD.decode(on_disk).unwrap(), key.as_bytes());
}

#[test]
fn key_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let first = KeyStore::builder(dir.path()).env_lookup(no_env()).build();
    let original = first.resolve(SecretKind::EncryptionKey).unwrap();
    drop(first);

    let second = KeyStore::builder(dir.path()).env_lookup(no_env()).build();
    let reloaded = second.resolve(SecretKind::EncryptionKey).unwrap();
    assert_eq!(reloaded.as_bytes(), original.as_bytes());
    assert_eq!(second.source(SecretKind::EncryptionKey), Some(SecretSource::KeyFile));
}

#[test]
fn existing_key_file_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("license_secret.key");
    let contents = STANDARD.encode([5u8; 24]);
    std::fs::write(&path, &contents).unwrap();

    let store = KeyStore::builder(dir.path()).env_lookup(no_env()).build();
    store.resolve(SecretKind::LicenseSigning).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
}

#[test]
fn signing_secret_is_never_generated() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::builder(dir.path()).env_lookup(no_env()).build();

    let err = store.resolve(SecretKind::LicenseSigning).unwrap_err();
    assert!(matches!(
        err,
        CryptoError::KeyUnavailable {
            kind: SecretKind::LicenseSigning,
            ..
        }
    ));
    assert!(format!("{err}").contains("KRATS_LICENSE_SECRET"));
    assert!(!store.key_path(SecretKind::LicenseSigning).exists());
    assert_eq!(store.source(SecretKind::LicenseSigning), None);
}

#[test]
fn signing_secret_provisioned_after_a_failed_start_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let first = KeyStore::builder(dir.path()).env_lookup(no_env()).build();
    assert!(first.resolve(SecretKind::LicenseSigning).is_err());

    std::fs::write(dir.path().join("license_secret.key"), STANDARD.encode([7u8; 32])).unwrap();
    let second = KeyStore::builder(dir.path()).env_lookup(no_env()).build();
    assert_eq!(
        second.resolve(SecretKind::LicenseSigning).unwrap().as_bytes(),
        &[7u8; 32]
    );
    assert_eq!(second.source(SecretKind::LicenseSigning), Some(SecretSource::KeyFile));
}

#[cfg(unix)]
#[test]
fn generated_key_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::builder(dir.path()).env_lookup(no_env()).build();
    store.resolve(SecretKind::EncryptionKey).unwrap();

    let mode = std::fs::metadata(store.key_path(SecretKind::EncryptionKey))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn persistence_failure_is_an_error_not_a_key() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("occupied");
    std::fs::write(&blocker, b"regular file").unwrap();

    let store = KeyStore::builder(blocker.join("keys"))
        .env_lookup(no_env())
        .build();
    let err = store.resolve(SecretKind::EncryptionKey).unwrap_err();
    assert!(matches!(err, CryptoError::KeyUnavailable { .. }));
    assert_eq!(store.source(SecretKind::EncryptionKey), None);
}

#[test]
fn generation_is_audited() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MemoryAuditSink::new());
    let store = KeyStore::builder(dir.path())
        .env_lookup(no_env())
        .audit(sink.clone())
        .build();

    store.resolve(SecretKind::EncryptionKey).unwrap();
    store.resolve(SecretKind::EncryptionKey).unwrap();

    let entries = sink.with_action(&AuditAction::KeyGenerated);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, "secret.key");
}

// ── malformed material ───────────────────────────────────────────

#[test]
fn malformed_env_value_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::builder(dir.path())
        .env_lookup(env_with(&[("KRATS_ENCRYPTION_KEY", "%%%".to_string())]))
        .build();
    let err = store.resolve(SecretKind::EncryptionKey).unwrap_err();
    assert!(matches!(err, CryptoError::InvalidKeyMaterial { .. }));
    assert!(!store.key_path(SecretKind::EncryptionKey).exists());
}

#[test]
fn wrong_length_key_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("secret.key"), STANDARD.encode([1u8; 16])).unwrap();
    let store = KeyStore::builder(dir.path()).env_lookup(no_env()).build();

    let err = store.resolve(SecretKind::EncryptionKey).unwrap_err();
    assert!(format!("{err}").contains("expected 32 bytes, got 16"));
}

#[test]
fn all_zero_material_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::builder(dir.path())
        .with_material(SecretKind::EncryptionKey, SecretMaterial::from_bytes(vec![0u8; 32]))
        .build();
    assert!(store.resolve(SecretKind::EncryptionKey).is_err());
}

#[test]
fn short_signing_secret_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::builder(dir.path())
        .env_lookup(env_with(&[("KRATS_LICENSE_SECRET", STANDARD.encode([1u8; 8]))]))
        .build();
    assert!(store.resolve(SecretKind::LicenseSigning).is_err());
}

// ── concurrency ──────────────────────────────────────────────────

#[test]
fn concurrent_first_access_resolves_once() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MemoryAuditSink::new());
    let store = Arc::new(
        KeyStore::builder(dir.path())
            .env_lookup(no_env())
            .audit(sink.clone())
            .build(),
    );
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                store.resolve(SecretKind::EncryptionKey).unwrap()
            })
        })
        .collect();

    let keys: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for key in &keys[1..] {
        assert!(Arc::ptr_eq(key, &keys[0]));
    }
    assert_eq!(sink.with_action(&AuditAction::KeyGenerated).len(), 1);
}

#[test]
fn two_stores_racing_on_one_dir_agree() {
    let dir = tempfile::tempdir().unwrap();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = dir.path().to_path_buf();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let store = KeyStore::builder(path).env_lookup(no_env()).build();
                barrier.wait();
                store
                    .resolve(SecretKind::EncryptionKey)
                    .unwrap()
                    .as_bytes()
                    .to_vec()
            })
        })
        .collect();

    let keys: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(keys.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn store_that_loses_the_creation_race_reports_the_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MemoryAuditSink::new());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let path = dir.path().to_path_buf();
            let sink = Arc::clone(&sink);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let store = KeyStore::builder(path)
                    .env_lookup(no_env())
                    .audit(sink)
                    .build();
                barrier.wait();
                store.resolve(SecretKind::EncryptionKey).unwrap();
                store.source(SecretKind::EncryptionKey).unwrap()
            })
        })
        .collect();

    let sources: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let generated = sources
        .iter()
        .filter(|s| **s == SecretSource::Generated)
        .count();
    assert_eq!(generated, 1);
    assert!(
        sources
            .iter()
            .all(|s| matches!(s, SecretSource::Generated | SecretSource::KeyFile))
    );
    assert_eq!(sink.with_action(&AuditAction::KeyGenerated).len(), 1);
}

#[test]
fn debug_output_hides_material() {
    let material = SecretMaterial::from_bytes(vec![0xAB; 32]);
    let debug = format!("{material:?}");
    assert!(debug.contains("REDACTED"));
    assert!(!debug.contains("171"));
}
