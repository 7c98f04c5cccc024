/// Registration input validators
/// Rules:
/// 1. Username: required, at most 50 characters, no control characters
/// 2. Password: required, at least 6 characters
/// 3. Confirmation must equal the password
/// 4. Usernames carrying SQL injection patterns are refused outright

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_USERNAME_LENGTH: usize = 50;
const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_PASSWORD_LENGTH: usize = 128; // bcrypt limitation and DoS prevention

lazy_static! {
    // Regex to detect potentially malicious SQL patterns
    static ref SQL_INJECTION_PATTERNS: [Regex; 3] = [
        // Union-based SQL injection
        Regex::new(r"(?i)\s+UNION\s+").unwrap(),
        // Comment-based injection and statement terminators
        Regex::new(r"(--|;|/\*|\*/)").unwrap(),
        // Boolean-based injection
        Regex::new(r#"(?i)(\bOR\b|\bAND\b)\s*(['"][0-9]*['"]|[0-9]*)\s*=\s*(['"][0-9]*['"]|[0-9]*|True|False)"#).unwrap(),
    ];
}

/// Validated registration input
#[derive(Debug, Clone)]
pub struct RegistrationInput {
    pub username: String,
    pub password: String,
}

/// Validates a registration request, returning the trimmed username.
pub fn validate_registration(
    username: &str,
    password: &str,
    confirm_password: &str,
) -> Result<RegistrationInput, ValidationError> {
    let username = is_valid_username(username)?;
    is_valid_password(password)?;

    if password != confirm_password {
        return Err(ValidationError::Mismatch(
            "confirmPassword".to_string(),
            "password".to_string(),
        ));
    }

    Ok(RegistrationInput {
        username,
        password: password.to_string(),
    })
}

/// Validates a username
/// - Required after trimming
/// - Length limit measured in characters
/// - No control characters or SQL injection patterns
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    if trimmed.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username".to_string(), MAX_USERNAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("username".to_string()));
    }

    if contains_sql_injection_patterns(trimmed) {
        return Err(ValidationError::PossibleSQLInjection);
    }

    Ok(trimmed.to_string())
}

/// Validates a password. Not trimmed: whitespace is part of the secret.
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_LENGTH));
    }

    Ok(())
}

/// Checks if input contains SQL injection patterns
fn contains_sql_injection_patterns(input: &str) -> bool {
    SQL_INJECTION_PATTERNS.iter().any(|pattern| pattern.is_match(input))
}
