/// PostgreSQL stores
///
/// Schema lives in `migrations/`. `token_hash` and `username` carry UNIQUE
/// constraints; violations surface as
/// `DatabaseError::UniqueConstraintViolation` through `From<sqlx::Error>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::{CredentialStore, RefreshTokenLedger};
use crate::domain::{LedgerEntry, NewRefreshToken, NewUser, RefreshTokenRecord, User};
use crate::error::AppError;

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
    is_active: bool,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse().map_err(|_| {
            AppError::Internal(format!("user {} has unknown role '{}'", row.id, row.role))
        })?;
        Ok(User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct RefreshTokenRow {
    id: i64,
    user_id: i64,
    token_hash: String,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    replaced_token_id: Option<i64>,
}

/// A refresh token joined with its owner
#[derive(FromRow)]
struct LedgerRow {
    id: i64,
    user_id: i64,
    token_hash: String,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    replaced_token_id: Option<i64>,
    username: String,
    password_hash: String,
    role: String,
    is_active: bool,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshTokenRecord {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            is_revoked: row.is_revoked,
            replaced_token_id: row.replaced_token_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, role, is_active
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, role, is_active
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn exists(&self, username: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, password_hash, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, username, password_hash, role, is_active
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        User::try_from(row)
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_active = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
pub struct PgRefreshTokenLedger {
    pool: PgPool,
}

impl PgRefreshTokenLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_REFRESH_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (user_id, token_hash, expires_at, is_revoked, replaced_token_id, created_at)
    VALUES ($1, $2, $3, false, $4, $5)
    RETURNING id, user_id, token_hash, expires_at, is_revoked, replaced_token_id
"#;

#[async_trait]
impl RefreshTokenLedger for PgRefreshTokenLedger {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(INSERT_REFRESH_TOKEN)
            .bind(token.user_id)
            .bind(&token.token_hash)
            .bind(token.expires_at)
            .bind(token.replaced_token_id)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<LedgerEntry>, AppError> {
        let row = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT t.id, t.user_id, t.token_hash, t.expires_at, t.is_revoked, t.replaced_token_id,
                   u.username, u.password_hash, u.role, u.is_active
            FROM refresh_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let owner = User::try_from(UserRow {
            id: row.user_id,
            username: row.username,
            password_hash: row.password_hash,
            role: row.role,
            is_active: row.is_active,
        })?;

        Ok(Some(LedgerEntry {
            record: RefreshTokenRecord {
                id: row.id,
                user_id: row.user_id,
                token_hash: row.token_hash,
                expires_at: row.expires_at,
                is_revoked: row.is_revoked,
                replaced_token_id: row.replaced_token_id,
            },
            owner,
        }))
    }

    async fn rotate(
        &self,
        consumed_id: i64,
        successor: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Conditional revoke: only one concurrent caller can flip the flag.
        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE id = $2 AND is_revoked = false
            "#,
        )
        .bind(now)
        .bind(consumed_id)
        .execute(&mut tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, RefreshTokenRow>(INSERT_REFRESH_TOKEN)
            .bind(successor.user_id)
            .bind(&successor.token_hash)
            .bind(successor.expires_at)
            .bind(successor.replaced_token_id)
            .bind(now)
            .fetch_one(&mut tx)
            .await?;

        tx.commit().await?;
        Ok(Some(row.into()))
    }

    async fn revoke(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE id = $2 AND is_revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE user_id = $2 AND is_revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = user_id, revoked = result.rows_affected(), "All refresh tokens revoked for user");
        Ok(result.rows_affected())
    }
}
