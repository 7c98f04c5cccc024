/// Username/password authentication against the credential store
///
/// Expected failures come back as `LoginOutcome::Failure`; only store or
/// hashing faults are `Err`.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::auth::password::{hash_password, verify_password};
use crate::domain::User;
use crate::error::AppError;
use crate::store::CredentialStore;

/// Why a login was refused. Logged, never sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    UnknownUser,
    IncorrectPassword,
    AccountDisabled,
}

impl LoginFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            LoginFailure::UnknownUser => "user does not exist",
            LoginFailure::IncorrectPassword => "incorrect password",
            LoginFailure::AccountDisabled => "account disabled",
        }
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success(User),
    Failure(LoginFailure),
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            LoginOutcome::Success(user) => Some(user),
            LoginOutcome::Failure(_) => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&'static str> {
        match self {
            LoginOutcome::Success(_) => None,
            LoginOutcome::Failure(failure) => Some(failure.reason()),
        }
    }
}

pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    hash_cost: u32,
    // Verified against when the username is unknown, so that path costs
    // one bcrypt round like the others.
    dummy_hash: OnceLock<String>,
}

impl Authenticator {
    /// `hash_cost` should match the cost stored hashes were made with.
    pub fn new(store: Arc<dyn CredentialStore>, hash_cost: u32) -> Self {
        Self {
            store,
            hash_cost,
            dummy_hash: OnceLock::new(),
        }
    }

    /// Check `username`/`password`.
    ///
    /// Checks run in order: user exists, password matches, account active.
    /// A disabled account therefore only reports `AccountDisabled` when the
    /// password was right.
    #[tracing::instrument(name = "validate_user", skip(self, password))]
    pub async fn validate(&self, username: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let Some(user) = self.store.find_by_username(username).await? else {
            self.burn_dummy_verification(password)?;
            tracing::info!(reason = LoginFailure::UnknownUser.reason(), "Login rejected");
            return Ok(LoginOutcome::Failure(LoginFailure::UnknownUser));
        };

        if !verify_password(password, &user.password_hash)? {
            tracing::info!(user_id = user.id, reason = LoginFailure::IncorrectPassword.reason(), "Login rejected");
            return Ok(LoginOutcome::Failure(LoginFailure::IncorrectPassword));
        }

        if !user.is_active {
            tracing::info!(user_id = user.id, reason = LoginFailure::AccountDisabled.reason(), "Login rejected");
            return Ok(LoginOutcome::Failure(LoginFailure::AccountDisabled));
        }

        tracing::debug!(user_id = user.id, "Credentials accepted");
        Ok(LoginOutcome::Success(user))
    }

    fn burn_dummy_verification(&self, password: &str) -> Result<(), AppError> {
        let dummy = match self.dummy_hash.get() {
            Some(hash) => hash,
            None => {
                let hash = hash_password("dummy-password-for-timing", self.hash_cost)?;
                self.dummy_hash.get_or_init(|| hash)
            }
        };
        verify_password(password, dummy)?;
        Ok(())
    }
}
