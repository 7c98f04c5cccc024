/// Password Hashing and Verification
///
/// One-way adaptive hashing with bcrypt. Comparison happens inside
/// `bcrypt::verify`.

use bcrypt::{hash, verify};

use crate::error::AppError;

/// Hash a password using bcrypt
///
/// # Arguments
/// * `password` - Plain text password to hash
/// * `cost` - bcrypt work factor (4..=31), `bcrypt::DEFAULT_COST` in production
///
/// # Errors
/// Returns error if the cost is out of range or hashing fails
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// # Arguments
/// * `password` - Plain text password to verify
/// * `hash` - Bcrypt hash to verify against
///
/// # Errors
/// Returns error if the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_password() {
        let password = "Admin123!";
        let hash = hash_password(password, TEST_COST).expect("Failed to hash password");

        // Hash should not be the same as password
        assert_ne!(password, hash);
        // Hash should start with bcrypt identifier
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let first = hash_password("Admin123!", TEST_COST).unwrap();
        let second = hash_password("Admin123!", TEST_COST).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("Admin123!", TEST_COST).unwrap();

        let is_valid = verify_password("Admin123!", &hash).expect("Failed to verify password");
        assert!(is_valid);
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hash_password("Admin123!", TEST_COST).unwrap();

        let is_valid = verify_password("wrong", &hash).expect("Failed to verify password");
        assert!(!is_valid);
    }

    #[test]
    fn test_empty_password_fails_verification() {
        let hash = hash_password("Admin123!", TEST_COST).unwrap();
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("Admin123!", "not-a-bcrypt-hash").is_err());
    }

    #[test]
    fn test_invalid_cost() {
        assert!(hash_password("Admin123!", 2).is_err());
    }
}
