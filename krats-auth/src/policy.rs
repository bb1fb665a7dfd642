//! Password strength policy.
//!
//! All thresholds come from [`PasswordPolicy`], which is loaded from
//! configuration; callers never carry their own rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Passwords rejected regardless of length or composition, compared
/// case-insensitively after trailing digits and symbols are stripped.
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "passw0rd",
    "p@ssw0rd",
    "admin",
    "administrator",
    "qwerty",
    "qwertyuiop",
    "asdfgh",
    "letmein",
    "welcome",
    "iloveyou",
    "monkey",
    "dragon",
    "master",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "superman",
    "trustno",
    "changeme",
    "secret",
    "login",
    "doctor",
    "hospital",
    "clinic",
    "patient",
    "hasta",
    "doktor",
    "sifre",
    "parola",
];

const KEYBOARD_ROWS: &[&str] = &["qwertyuiop", "asdfghjkl", "zxcvbnm", "1234567890"];

/// Thresholds for password acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: usize,
    /// Maximum length in characters.
    pub max_length: usize,
    /// How many of lower, upper, digit and symbol must appear.
    pub min_character_classes: usize,
    /// Longest allowed run of one repeated character.
    pub max_repeated_run: usize,
    /// Reject entries of the built-in common-password list.
    pub reject_common: bool,
    /// Reject passwords that are a keyboard or alphabetic sequence.
    pub reject_sequences: bool,
    /// Reject passwords containing the username.
    pub reject_username: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_length: 128,
            min_character_classes: 3,
            max_repeated_run: 3,
            reject_common: true,
            reject_sequences: true,
            reject_username: true,
        }
    }
}

/// One reason a password was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PolicyViolation {
    TooShort { min: usize, actual: usize },
    TooLong { max: usize },
    TooFewCharacterClasses { required: usize, found: usize },
    RepeatedCharacters { max_run: usize },
    Sequential,
    Common,
    ContainsUsername,
    ReusesCurrent,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { min, actual } => {
                write!(f, "must be at least {min} characters (has {actual})")
            }
            Self::TooLong { max } => write!(f, "must be at most {max} characters"),
            Self::TooFewCharacterClasses { required, found } => write!(
                f,
                "must mix at least {required} of lowercase, uppercase, digits and symbols (has {found})"
            ),
            Self::RepeatedCharacters { max_run } => {
                write!(f, "must not repeat a character more than {max_run} times in a row")
            }
            Self::Sequential => f.write_str("must not be a keyboard or alphabet sequence"),
            Self::Common => f.write_str("is too common"),
            Self::ContainsUsername => f.write_str("must not contain the username"),
            Self::ReusesCurrent => f.write_str("must differ from the current password"),
        }
    }
}

/// Outcome of a strength check: every violated rule, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    violations: Vec<PolicyViolation>,
}

impl PolicyResult {
    /// Builds a result from explicit violations.
    #[must_use]
    pub fn from_violations(violations: Vec<PolicyViolation>) -> Self {
        Self { violations }
    }

    /// Returns true if no rule was violated.
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the violated rules.
    #[must_use]
    pub fn violations(&self) -> &[PolicyViolation] {
        &self.violations
    }

    /// Returns true if `violation` is among the violated rules.
    #[must_use]
    pub fn has(&self, violation: &PolicyViolation) -> bool {
        self.violations.contains(violation)
    }
}

impl fmt::Display for PolicyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return f.write_str("acceptable");
        }
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl PasswordPolicy {
    /// Checks `password` without a username.
    #[must_use]
    pub fn check(&self, password: &str) -> PolicyResult {
        self.check_for(None, password)
    }

    /// Checks `password` for the account `username`.
    #[must_use]
    pub fn check_for(&self, username: Option<&str>, password: &str) -> PolicyResult {
        let mut violations = Vec::new();
        let length = password.chars().count();

        if length < self.min_length {
            violations.push(PolicyViolation::TooShort {
                min: self.min_length,
                actual: length,
            });
        }
        if length > self.max_length {
            violations.push(PolicyViolation::TooLong {
                max: self.max_length,
            });
        }

        let found = character_classes(password);
        if found < self.min_character_classes {
            violations.push(PolicyViolation::TooFewCharacterClasses {
                required: self.min_character_classes,
                found,
            });
        }

        if self.max_repeated_run > 0 && longest_run(password) > self.max_repeated_run {
            violations.push(PolicyViolation::RepeatedCharacters {
                max_run: self.max_repeated_run,
            });
        }

        if self.reject_sequences && is_sequence(password) {
            violations.push(PolicyViolation::Sequential);
        }

        if self.reject_common && is_common(password) {
            violations.push(PolicyViolation::Common);
        }

        if self.reject_username {
            if let Some(user) = username.map(str::trim).filter(|u| u.chars().count() >= 3) {
                if password.to_lowercase().contains(&user.to_lowercase()) {
                    violations.push(PolicyViolation::ContainsUsername);
                }
            }
        }

        PolicyResult { violations }
    }
}

fn character_classes(password: &str) -> usize {
    let lower = password.chars().any(|c| c.is_lowercase());
    let upper = password.chars().any(|c| c.is_uppercase());
    let digit = password.chars().any(|c| c.is_numeric());
    let symbol = password.chars().any(|c| !c.is_alphanumeric());
    [lower, upper, digit, symbol].into_iter().filter(|b| *b).count()
}

fn longest_run(password: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut prev = None;
    for c in password.chars() {
        current = if Some(c) == prev { current + 1 } else { 1 };
        longest = longest.max(current);
        prev = Some(c);
    }
    longest
}

/// True if the whole password walks the alphabet, the digits or a keyboard
/// row in either direction.
fn is_sequence(password: &str) -> bool {
    let lower: Vec<char> = password.to_lowercase().chars().collect();
    if lower.len() < 3 {
        return false;
    }

    let steps: Vec<i64> = lower
        .windows(2)
        .map(|w| i64::from(u32::from(w[1])) - i64::from(u32::from(w[0])))
        .collect();
    if steps.iter().all(|s| *s == 1) || steps.iter().all(|s| *s == -1) {
        return true;
    }

    let text: String = lower.iter().collect();
    let reversed: String = lower.iter().rev().collect();
    KEYBOARD_ROWS.iter().any(|row| {
        let doubled = format!("{row}{row}");
        doubled.contains(&text) || doubled.contains(&reversed)
    })
}

fn is_common(password: &str) -> bool {
    let lower = password.to_lowercase();
    let stem = lower.trim_end_matches(|c: char| !c.is_alphabetic());
    let stem = stem.trim_start_matches(|c: char| !c.is_alphabetic());
    COMMON_PASSWORDS
        .iter()
        .any(|common| lower == *common || stem == *common)
}
