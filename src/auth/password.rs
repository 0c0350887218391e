/// Password Hashing and Verification
///
/// Handles password hashing with bcrypt and password strength validation.
/// bcrypt's verify runs in time independent of where the mismatch occurs,
/// which keeps credential comparison free of timing side-channels.

use bcrypt::{hash, verify, DEFAULT_COST};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::error::{AppError, AuthError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

// A valid bcrypt hash of random material nobody knows. Login runs a verify
// against this when the account does not exist, so the timing of a miss
// matches the timing of a wrong password.
pub const DUMMY_HASH: &str = "$2b$12$C6UzMDM.H6dfI/f/IKcEeO5lCssOrrLmT1amPxBPW4OZXKASxmDT2";

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if:
/// - Password fails the strength policy (`WeakCredential`)
/// - Bcrypt hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// # Errors
/// Returns error if verification fails to run
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Hash for accounts that must never be logged into with a password,
/// e.g. federated identities. Random per call and never disclosed.
pub fn unusable_password_hash() -> Result<String, AppError> {
    let random: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect();

    hash(random, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Validate password strength requirements
///
/// Requirements:
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Auth(AuthError::WeakCredential(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ))));
    }

    // bcrypt limitation and DoS prevention
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Auth(AuthError::WeakCredential(format!(
            "password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        ))));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Auth(AuthError::WeakCredential(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = "ValidPassword123";
        let hash = hash_password(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_verify_password() {
        let password = "ValidPassword123";
        let hash = hash_password(password).expect("Failed to hash password");

        let is_valid = verify_password(password, &hash).expect("Failed to verify password");
        assert!(is_valid);
    }

    #[test]
    fn test_verify_wrong_password() {
        let password = "ValidPassword123";
        let hash = hash_password(password).expect("Failed to hash password");

        let is_valid = verify_password("WrongPassword123", &hash).expect("Failed to verify password");
        assert!(!is_valid);
    }

    #[test]
    fn test_weak_passwords_rejected() {
        let long_password = "A1".to_string() + &"a".repeat(MAX_PASSWORD_LENGTH);
        let weak = [
            "Short1",
            "nouppercase1",
            "NOLOWERCASE1",
            "NoDigitsPassword",
            long_password.as_str(),
        ];

        for password in weak {
            match hash_password(password) {
                Err(AppError::Auth(AuthError::WeakCredential(_))) => (),
                other => panic!("Expected WeakCredential for {:?}, got {:?}", password, other.err()),
            }
        }
    }

    #[test]
    fn test_valid_password() {
        assert!(hash_password("ValidPassword123").is_ok());
    }

    #[test]
    fn test_dummy_hash_never_matches() {
        let is_valid = verify_password("AnyPassword123", DUMMY_HASH).expect("verify failed");
        assert!(!is_valid);
    }

    #[test]
    fn test_unusable_password_hashes_differ() {
        let h1 = unusable_password_hash().unwrap();
        let h2 = unusable_password_hash().unwrap();
        assert_ne!(h1, h2);
    }
}
