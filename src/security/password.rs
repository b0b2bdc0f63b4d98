//! Password policy and hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::config::PasswordPolicyConfig;
use crate::error::AppError;

const FORBIDDEN_PATTERNS: &[&str] = &[
    "password", "plant", "care", "garden", "123456", "qwerty", "admin", "user", "root", "test",
];

const SYMBOLS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Check `password` against the policy, collecting every violation.
pub fn check_strength(policy: &PasswordPolicyConfig, password: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if password.chars().count() < policy.min_length {
        errors.push(format!(
            "Password must be at least {} characters long",
            policy.min_length
        ));
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if policy.require_numbers && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if policy.require_symbols && !password.chars().any(|c| SYMBOLS.contains(c)) {
        errors.push("Password must contain at least one special character".to_string());
    }

    let lower = password.to_lowercase();
    for pattern in FORBIDDEN_PATTERNS {
        if lower.contains(pattern) {
            errors.push(format!("Password cannot contain common words like '{pattern}'"));
        }
    }

    if has_sequential_chars(password) {
        errors.push("Password cannot contain sequential characters (123, abc, etc.)".to_string());
    }

    errors
}

/// Validate and convert violations into a 422.
pub fn validate_strength(policy: &PasswordPolicyConfig, password: &str) -> Result<(), AppError> {
    let errors = check_strength(policy, password);
    if errors.is_empty() {
        return Ok(());
    }
    crate::security_event!(
        "weak_password_attempt",
        violations = errors.len(),
        password_length = password.chars().count(),
        "Password rejected by policy"
    );
    Err(AppError::Validation {
        message: "Password does not meet security requirements".to_string(),
        errors,
    })
}

/// True if three consecutive characters ascend or descend by one code point.
fn has_sequential_chars(password: &str) -> bool {
    let codes: Vec<i64> = password.chars().map(|c| c as i64).collect();
    codes.windows(3).any(|w| {
        (w[0] + 1 == w[1] && w[1] + 1 == w[2]) || (w[0] - 1 == w[1] && w[1] - 1 == w[2])
    })
}

/// Hash with Argon2id and a random salt. Returns the PHC string.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Verify against a PHC string. Malformed hashes verify as false.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Stored password hash is malformed");
            false
        }
    }
}
