/// Persistence seams for the authentication core
///
/// `CredentialStore` holds user records, `RefreshTokenLedger` holds issued
/// refresh-token hashes. Both come in a PostgreSQL flavour for the running
/// service and an in-memory flavour for tests and local runs.

mod memory;
mod postgres;

pub use memory::{InMemoryCredentialStore, InMemoryRefreshTokenLedger};
pub use postgres::{PgCredentialStore, PgRefreshTokenLedger};

use async_trait::async_trait;

use crate::domain::{LedgerEntry, NewRefreshToken, NewUser, RefreshTokenRecord, User};
use crate::error::AppError;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Exact, case-sensitive username match
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn exists(&self, username: &str) -> Result<bool, AppError>;

    /// Fails with `DatabaseError::UniqueConstraintViolation` when the
    /// username is taken.
    async fn insert(&self, user: NewUser) -> Result<User, AppError>;

    /// Returns false when no such user exists.
    async fn set_active(&self, id: i64, is_active: bool) -> Result<bool, AppError>;
}

#[async_trait]
pub trait RefreshTokenLedger: Send + Sync {
    /// Fails with `DatabaseError::UniqueConstraintViolation` on a hash
    /// collision; an existing row is never overwritten.
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<LedgerEntry>, AppError>;

    /// Revoke `consumed_id` and insert `successor` as one atomic step.
    ///
    /// The revoke only applies while the record is still unrevoked. Returns
    /// `None`, with nothing written, when another caller got there first.
    async fn rotate(
        &self,
        consumed_id: i64,
        successor: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Returns true if this call flipped the flag.
    async fn revoke(&self, id: i64) -> Result<bool, AppError>;

    /// Revoke every outstanding token of a user, returning how many changed.
    async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64, AppError>;
}
