/// In-memory stores
///
/// Each operation takes one mutex acquisition, which gives the same
/// atomicity the PostgreSQL stores get from transactions. No lock is held
/// across an `.await`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{CredentialStore, RefreshTokenLedger};
use crate::domain::{LedgerEntry, NewRefreshToken, NewUser, RefreshTokenRecord, User};
use crate::error::{AppError, DatabaseError, USERNAME_UNIQUE_CONSTRAINT};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    rows: Vec<User>,
}

/// Credential store backed by a `Vec` behind a mutex.
///
/// Cheap to clone; clones share the same table, so an
/// `InMemoryRefreshTokenLedger` can resolve token owners through it.
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    users: Arc<Mutex<UserTable>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, id: i64) -> Option<User> {
        lock(&self.users).rows.iter().find(|u| u.id == id).cloned()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users)
            .rows
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.get(id))
    }

    async fn exists(&self, username: &str) -> Result<bool, AppError> {
        Ok(lock(&self.users).rows.iter().any(|u| u.username == username))
    }

    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let mut table = lock(&self.users);
        if table.rows.iter().any(|u| u.username == user.username) {
            return Err(DatabaseError::UniqueConstraintViolation(USERNAME_UNIQUE_CONSTRAINT.to_string()).into());
        }
        table.next_id += 1;
        let user = User {
            id: table.next_id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            is_active: user.is_active,
        };
        table.rows.push(user.clone());
        Ok(user)
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<bool, AppError> {
        let mut table = lock(&self.users);
        match table.rows.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.is_active = is_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
struct TokenTable {
    next_id: i64,
    rows: Vec<RefreshTokenRecord>,
    by_hash: HashMap<String, usize>,
}

impl TokenTable {
    fn push(&mut self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        if self.by_hash.contains_key(&token.token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh_tokens_token_hash_key".to_string(),
            )
            .into());
        }
        self.next_id += 1;
        let record = RefreshTokenRecord {
            id: self.next_id,
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            is_revoked: false,
            replaced_token_id: token.replaced_token_id,
        };
        self.by_hash.insert(record.token_hash.clone(), self.rows.len());
        self.rows.push(record.clone());
        Ok(record)
    }

    fn get_mut(&mut self, id: i64) -> Option<&mut RefreshTokenRecord> {
        self.rows.iter_mut().find(|r| r.id == id)
    }
}

/// Refresh token ledger kept in process memory.
#[derive(Clone)]
pub struct InMemoryRefreshTokenLedger {
    users: InMemoryCredentialStore,
    tokens: Arc<Mutex<TokenTable>>,
}

impl InMemoryRefreshTokenLedger {
    /// `users` resolves the owner of each record on lookup.
    pub fn new(users: InMemoryCredentialStore) -> Self {
        Self {
            users,
            tokens: Arc::new(Mutex::new(TokenTable::default())),
        }
    }

    /// Every record, in insertion order
    pub fn records(&self) -> Vec<RefreshTokenRecord> {
        lock(&self.tokens).rows.clone()
    }

    /// Overwrite a record's expiry; used to age tokens in tests.
    pub fn set_expires_at(&self, id: i64, expires_at: chrono::DateTime<chrono::Utc>) -> bool {
        match lock(&self.tokens).get_mut(id) {
            Some(record) => {
                record.expires_at = expires_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RefreshTokenLedger for InMemoryRefreshTokenLedger {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        if self.users.get(token.user_id).is_none() {
            return Err(DatabaseError::QueryExecution(format!(
                "refresh token owner {} does not exist",
                token.user_id
            ))
            .into());
        }
        lock(&self.tokens).push(token)
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<LedgerEntry>, AppError> {
        let record = {
            let table = lock(&self.tokens);
            match table.by_hash.get(token_hash) {
                Some(&idx) => table.rows[idx].clone(),
                None => return Ok(None),
            }
        };
        Ok(self
            .users
            .get(record.user_id)
            .map(|owner| LedgerEntry { record, owner }))
    }

    async fn rotate(
        &self,
        consumed_id: i64,
        successor: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let mut table = lock(&self.tokens);

        // Check the hash before touching anything so a collision leaves the
        // consumed record as it was.
        if table.by_hash.contains_key(&successor.token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh_tokens_token_hash_key".to_string(),
            )
            .into());
        }

        match table.get_mut(consumed_id) {
            Some(record) if !record.is_revoked => record.is_revoked = true,
            _ => return Ok(None),
        }

        table.push(successor).map(Some)
    }

    async fn revoke(&self, id: i64) -> Result<bool, AppError> {
        match lock(&self.tokens).get_mut(id) {
            Some(record) if !record.is_revoked => {
                record.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let mut table = lock(&self.tokens);
        let mut revoked = 0;
        for record in table
            .rows
            .iter_mut()
            .filter(|r| r.user_id == user_id && !r.is_revoked)
        {
            record.is_revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }
}
