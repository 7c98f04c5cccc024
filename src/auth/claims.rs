/// JWT Claims structure
///
/// `AccessTokenClaims` is what gets signed into an access token and what the
/// strict validator hands back. `ClaimsView` is the lenient, display-only
/// reading produced by `parse_claims`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::User;
use crate::error::AppError;

/// Claim keys tried, in order, when resolving the user name.
pub const NAME_CLAIM_KEYS: &[&str] = &[
    "name",
    "unique_name",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name",
    "sub",
];

/// Claim keys tried, in order, when resolving the role. The browser client
/// reads `role` verbatim, so it must stay first.
pub const ROLE_CLAIM_KEYS: &[&str] = &[
    "role",
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
];

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Username
    pub name: String,
    /// `Admin` or `User`
    pub role: String,
    /// Subject (also the username)
    pub sub: String,
    /// Unique token id
    pub jti: String,
    pub iss: String,
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl AccessTokenClaims {
    /// Build claims for `user`, valid from `now` for `lifetime`.
    ///
    /// # Errors
    /// `AppError::Internal` if the expiry falls outside the representable range
    pub fn new(
        user: &User,
        issuer: &str,
        audience: &str,
        now: DateTime<Utc>,
        lifetime: chrono::Duration,
    ) -> Result<Self, AppError> {
        let expires_at = now
            .checked_add_signed(lifetime)
            .ok_or_else(|| AppError::Internal("access token expiry overflows".to_string()))?;

        Ok(Self {
            name: user.username.clone(),
            role: user.role.to_string(),
            sub: user.username.clone(),
            jti: Uuid::new_v4().to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp < now.timestamp()
    }
}

/// Lenient view of an access token's claims. Missing claims are empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClaimsView {
    pub user_name: String,
    pub role: String,
    pub subject: String,
    pub token_id: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub expires_at: Option<i64>,
}

impl ClaimsView {
    pub(crate) fn from_payload(payload: &Map<String, Value>) -> Self {
        Self {
            user_name: first_string(payload, NAME_CLAIM_KEYS),
            role: first_string(payload, ROLE_CLAIM_KEYS),
            subject: first_string(payload, &["sub"]),
            token_id: first_string(payload, &["jti"]),
            issuer: first_string(payload, &["iss"]),
            audience: match payload.get("aud") {
                Some(Value::String(aud)) => vec![aud.clone()],
                Some(Value::Array(auds)) => auds
                    .iter()
                    .filter_map(|a| a.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            },
            expires_at: payload.get("exp").and_then(Value::as_i64),
        }
    }
}

/// Outcome of reading a token without verifying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedClaims {
    Parsed(ClaimsView),
    Unparseable,
}

impl ParsedClaims {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParsedClaims::Parsed(_))
    }

    /// The parsed view, or an all-empty one
    pub fn claims_or_default(self) -> ClaimsView {
        match self {
            ParsedClaims::Parsed(view) => view,
            ParsedClaims::Unparseable => ClaimsView::default(),
        }
    }
}

/// First candidate key holding a string, first wins. Roles may be arrays when
/// a token carries several; the first entry is taken.
fn first_string(payload: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| match payload.get(*key) {
            Some(Value::String(v)) => Some(v.clone()),
            Some(Value::Array(vs)) => vs.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .unwrap_or_default()
}
