use krats_auth::{PasswordPolicy, PolicyViolation};
use pretty_assertions::assert_eq;

#[test]
fn strong_password_is_acceptable() {
    let result = PasswordPolicy::default().check("Tr0ub4dor&3x");
    assert!(result.is_acceptable(), "{result}");
    assert_eq!(result.to_string(), "acceptable");
}

#[test]
fn short_password_reports_length() {
    let result = PasswordPolicy::default().check("aB3$");
    assert!(result.has(&PolicyViolation::TooShort { min: 12, actual: 4 }));
}

#[test]
fn four_character_legacy_minimum_is_not_enough() {
    assert!(!PasswordPolicy::default().check("abcd").is_acceptable());
}

#[test]
fn empty_password_is_rejected() {
    let result = PasswordPolicy::default().check("");
    assert!(result.has(&PolicyViolation::TooShort { min: 12, actual: 0 }));
}

#[test]
fn length_counts_characters_not_bytes() {
    let policy = PasswordPolicy::default();
    // 11 characters, more than 12 bytes.
    let result = policy.check("Şifreğüİ1!x");
    assert!(result.has(&PolicyViolation::TooShort { min: 12, actual: 11 }));
}

#[test]
fn overlong_password_is_rejected() {
    let result = PasswordPolicy::default().check(&"Aa1!".repeat(40));
    assert!(result.has(&PolicyViolation::TooLong { max: 128 }));
}

#[test]
fn too_few_classes() {
    let result = PasswordPolicy::default().check("lowercaseonlyword");
    assert!(result.has(&PolicyViolation::TooFewCharacterClasses {
        required: 3,
        found: 1
    }));
}

#[test]
fn common_password_with_decorations_is_rejected() {
    let policy = PasswordPolicy::default();
    let result = policy.check("Password123!");
    assert_eq!(result.violations(), &[PolicyViolation::Common]);
    assert!(policy.check("!!Hospital2024").has(&PolicyViolation::Common));
}

#[test]
fn long_runs_are_rejected() {
    let result = PasswordPolicy::default().check("aaaaBBcc11!!xyz");
    assert!(result.has(&PolicyViolation::RepeatedCharacters { max_run: 3 }));
}

#[test]
fn alphabet_and_keyboard_sequences_are_rejected() {
    let policy = PasswordPolicy::default();
    assert!(policy.check("abcdefghijklm").has(&PolicyViolation::Sequential));
    assert!(policy.check("ZYXWVUTSRQPO").has(&PolicyViolation::Sequential));
    assert!(policy.check("1234567890123").has(&PolicyViolation::Sequential));
    assert!(policy.check("qwertyuiopqw").has(&PolicyViolation::Sequential));
    assert!(!policy.check("Tr0ub4dor&3x").has(&PolicyViolation::Sequential));
}

#[test]
fn password_containing_username_is_rejected() {
    let policy = PasswordPolicy::default();
    let result = policy.check_for(Some("ayse.yilmaz"), "Ayse.Yilmaz!2024x");
    assert!(result.has(&PolicyViolation::ContainsUsername));
    assert!(
        !policy
            .check_for(Some("ayse.yilmaz"), "Tr0ub4dor&3x")
            .has(&PolicyViolation::ContainsUsername)
    );
}

#[test]
fn rules_are_configuration() {
    let relaxed = PasswordPolicy {
        min_length: 6,
        min_character_classes: 1,
        reject_common: false,
        reject_sequences: false,
        ..PasswordPolicy::default()
    };
    assert!(relaxed.check("kestane").is_acceptable());
    assert!(!PasswordPolicy::default().check("kestane").is_acceptable());
}

#[test]
fn violations_render_as_one_message() {
    let result = PasswordPolicy::default().check("abc");
    let msg = result.to_string();
    assert!(msg.contains("at least 12 characters"));
    assert!(msg.contains("; "));
}

#[test]
fn policy_deserializes_with_defaults() {
    let policy: PasswordPolicy = serde_json::from_str(r#"{"min_length": 14}"#).unwrap();
    assert_eq!(policy.min_length, 14);
    assert_eq!(policy.max_length, 128);
    assert!(policy.reject_common);
}
