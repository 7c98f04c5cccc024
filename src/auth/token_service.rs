/// Token issuance and refresh-token rotation
///
/// Handles:
/// - Minting access + refresh token pairs and recording the refresh hash
/// - Exchanging a refresh token for a new pair (one-time use, rotation)
/// - Revoking refresh tokens on logout

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::auth::claims::ParsedClaims;
use crate::auth::jwt::{parse_claims, AccessTokenCodec};
use crate::auth::refresh_token::{generate_refresh_token, hash_token};
use crate::clock::Clock;
use crate::configuration::JwtSettings;
use crate::domain::{NewRefreshToken, RefreshTokenRecord, TokenPair, User};
use crate::error::{AppError, ConfigError};
use crate::store::RefreshTokenLedger;

/// Why a refresh was refused. All variants look the same to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailure {
    NotFound,
    Revoked,
    Expired,
    OwnerDisabled,
    /// A concurrent refresh consumed the token between lookup and rotation
    AlreadyConsumed,
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefreshFailure::NotFound => "refresh token not found",
            RefreshFailure::Revoked => "refresh token revoked",
            RefreshFailure::Expired => "refresh token expired",
            RefreshFailure::OwnerDisabled => "token owner is disabled",
            RefreshFailure::AlreadyConsumed => "refresh token consumed concurrently",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Rotated(TokenPair),
    Rejected(RefreshFailure),
}

impl RefreshOutcome {
    pub fn into_pair(self) -> Option<TokenPair> {
        match self {
            RefreshOutcome::Rotated(pair) => Some(pair),
            RefreshOutcome::Rejected(_) => None,
        }
    }
}

pub struct TokenIssuer {
    codec: AccessTokenCodec,
    refresh_lifetime: chrono::Duration,
    ledger: Arc<dyn RefreshTokenLedger>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// # Errors
    /// `ConfigError` if the signing key is missing or shorter than 32 bytes
    pub fn new(
        settings: &JwtSettings,
        ledger: Arc<dyn RefreshTokenLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            codec: AccessTokenCodec::new(settings)?,
            refresh_lifetime: settings.refresh_token_lifetime()?,
            ledger,
            clock,
        })
    }

    pub fn codec(&self) -> &AccessTokenCodec {
        &self.codec
    }

    /// Mint a token pair for `user` and record the refresh token's hash.
    #[tracing::instrument(name = "issue_tokens", skip(self, user), fields(user_id = user.id))]
    pub async fn issue(&self, user: &User) -> Result<TokenPair, AppError> {
        let now = self.clock.now();
        let access_token = self.codec.generate(user, now)?;
        let refresh_token = generate_refresh_token();

        let record = self
            .ledger
            .insert(NewRefreshToken {
                user_id: user.id,
                token_hash: hash_token(&refresh_token),
                expires_at: self.refresh_expiry(now)?,
                replaced_token_id: None,
            })
            .await?;

        tracing::info!(record_id = record.id, "Token pair issued");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange `presented` for a new pair.
    ///
    /// A given refresh token succeeds at most once; replays, expired tokens,
    /// unknown tokens and tokens of disabled users are all rejected.
    #[tracing::instrument(name = "refresh_tokens", skip_all)]
    pub async fn refresh(&self, presented: &str) -> Result<RefreshOutcome, AppError> {
        let Some(entry) = self.ledger.find_by_hash(&hash_token(presented)).await? else {
            return Ok(self.reject(RefreshFailure::NotFound, None));
        };

        let now = self.clock.now();
        let record = &entry.record;
        if record.is_revoked {
            return Ok(self.reject(RefreshFailure::Revoked, Some(record)));
        }
        if record.is_expired(now) {
            return Ok(self.reject(RefreshFailure::Expired, Some(record)));
        }
        if !entry.owner.is_active {
            return Ok(self.reject(RefreshFailure::OwnerDisabled, Some(record)));
        }

        let access_token = self.codec.generate(&entry.owner, now)?;
        let refresh_token = generate_refresh_token();

        let successor = self
            .ledger
            .rotate(
                record.id,
                NewRefreshToken {
                    user_id: entry.owner.id,
                    token_hash: hash_token(&refresh_token),
                    expires_at: self.refresh_expiry(now)?,
                    replaced_token_id: Some(record.id),
                },
            )
            .await?;

        let Some(successor) = successor else {
            return Ok(self.reject(RefreshFailure::AlreadyConsumed, Some(record)));
        };

        tracing::info!(
            user_id = entry.owner.id,
            consumed = record.id,
            successor = successor.id,
            "Refresh token rotated"
        );
        Ok(RefreshOutcome::Rotated(TokenPair {
            access_token,
            refresh_token,
        }))
    }

    /// Revoke `presented`. Returns whether anything changed; unknown and
    /// already revoked tokens are not an error.
    pub async fn logout(&self, presented: &str) -> Result<bool, AppError> {
        match self.ledger.find_by_hash(&hash_token(presented)).await? {
            Some(entry) => {
                let revoked = self.ledger.revoke(entry.record.id).await?;
                tracing::info!(user_id = entry.owner.id, record_id = entry.record.id, revoked, "Logout");
                Ok(revoked)
            }
            None => Ok(false),
        }
    }

    /// Revoke every outstanding refresh token of `user`.
    pub async fn logout_all(&self, user: &User) -> Result<u64, AppError> {
        let revoked = self.ledger.revoke_all_for_user(user.id).await?;
        tracing::info!(user_id = user.id, revoked, "Logout from all sessions");
        Ok(revoked)
    }

    /// Lenient, unverified read of an access token's claims
    pub fn parse_claims(&self, access_token: &str) -> ParsedClaims {
        parse_claims(access_token)
    }

    fn refresh_expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        now.checked_add_signed(self.refresh_lifetime)
            .ok_or_else(|| AppError::Internal("refresh token expiry overflows".to_string()))
    }

    fn reject(&self, failure: RefreshFailure, record: Option<&RefreshTokenRecord>) -> RefreshOutcome {
        match record {
            Some(record) => tracing::warn!(
                record_id = record.id,
                user_id = record.user_id,
                reason = %failure,
                "Refresh rejected"
            ),
            None => tracing::warn!(reason = %failure, "Refresh rejected"),
        }
        RefreshOutcome::Rejected(failure)
    }
}
