mod common;

use common::fast_params;
use krats_auth::{HashingParams, PasswordHashing};
use proptest::prelude::*;

fn hasher() -> PasswordHashing {
    PasswordHashing::new(fast_params()).unwrap()
}

#[test]
fn hash_is_argon2id_phc_string() {
    let hash = hasher().hash("Tr0ub4dor&3x").unwrap();
    assert!(hash.starts_with("$argon2id$v=19$m=256,t=1,p=1$"));
}

#[test]
fn verify_accepts_correct_password() {
    let h = hasher();
    let hash = h.hash("Tr0ub4dor&3x").unwrap();
    assert!(h.verify("Tr0ub4dor&3x", &hash));
}

#[test]
fn verify_rejects_wrong_password() {
    let h = hasher();
    let hash = h.hash("Tr0ub4dor&3x").unwrap();
    assert!(!h.verify("Tr0ub4dor&3X", &hash));
    assert!(!h.verify("", &hash));
}

#[test]
fn same_password_hashes_differently() {
    let h = hasher();
    let a = h.hash("same-password").unwrap();
    let b = h.hash("same-password").unwrap();
    assert_ne!(a, b);
    assert!(h.verify("same-password", &a));
    assert!(h.verify("same-password", &b));
}

#[test]
fn malformed_hash_never_verifies() {
    let h = hasher();
    assert!(!h.verify("anything", ""));
    assert!(!h.verify("anything", "not-a-phc-string"));
    assert!(!h.verify("anything", "$argon2id$v=19$m=256,t=1,p=1$short"));
}

#[test]
fn hash_from_other_params_still_verifies() {
    let old = PasswordHashing::new(HashingParams {
        memory_cost_kib: 512,
        time_cost: 2,
        parallelism: 1,
    })
    .unwrap();
    let hash = old.hash("legacy-secret").unwrap();

    let current = hasher();
    assert!(current.verify("legacy-secret", &hash));
    assert!(current.needs_rehash(&hash));
}

#[test]
fn current_hash_does_not_need_rehash() {
    let h = hasher();
    let hash = h.hash("fresh-secret").unwrap();
    assert!(!h.needs_rehash(&hash));
}

#[test]
fn unparseable_hash_needs_rehash() {
    assert!(hasher().needs_rehash("plaintext-from-old-system"));
}

#[test]
fn invalid_params_are_rejected() {
    let result = PasswordHashing::new(HashingParams {
        memory_cost_kib: 1,
        time_cost: 0,
        parallelism: 1,
    });
    assert!(result.is_err());
}

#[test]
fn default_params_follow_owasp_baseline() {
    let params = HashingParams::default();
    assert_eq!(params.memory_cost_kib, 19456);
    assert_eq!(params.time_cost, 2);
    assert_eq!(params.parallelism, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn verify_roundtrip(password in "\\PC{0,64}") {
        let h = hasher();
        let hash = h.hash(&password).unwrap();
        prop_assert!(h.verify(&password, &hash));
    }

    #[test]
    fn other_password_does_not_verify(p in "\\PC{1,32}", q in "\\PC{1,32}") {
        prop_assume!(p != q);
        let h = hasher();
        let hash = h.hash(&p).unwrap();
        prop_assert!(!h.verify(&q, &hash));
    }
}
