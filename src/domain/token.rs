/// Refresh token ledger rows and the token pair handed to clients

use chrono::{DateTime, Utc};
use std::fmt;

use super::user::User;

/// One issued refresh token. Only the hash of the token is ever stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    /// Hex SHA-256 of the plaintext token
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    /// Once true, never false again
    pub is_revoked: bool,
    /// The record this one was rotated from, if any
    pub replaced_token_id: Option<i64>,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Insert payload for the ledger
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub replaced_token_id: Option<i64>,
}

/// A ledger record together with its owner, as returned by hash lookup
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub record: RefreshTokenRecord,
    pub owner: User,
}

/// Access and refresh token returned to the caller exactly once.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_is_strictly_in_the_past() {
        let now = Utc::now();
        let record = RefreshTokenRecord {
            id: 1,
            user_id: 1,
            token_hash: "h".repeat(64),
            expires_at: now,
            is_revoked: false,
            replaced_token_id: None,
        };
        assert!(!record.is_expired(now));
        assert!(record.is_expired(now + Duration::seconds(1)));
    }

    #[test]
    fn test_token_pair_debug_is_redacted() {
        let pair = TokenPair {
            access_token: "a.b.c".to_string(),
            refresh_token: "plaintext".to_string(),
        };
        assert!(!format!("{:?}", pair).contains("plaintext"));
    }
}
