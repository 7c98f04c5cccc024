/// Authentication module
///
/// Password hashing, access-token signing and parsing, refresh-token
/// generation, the Authenticator and the Token Issuer.

mod authenticator;
mod claims;
mod jwt;
mod password;
mod refresh_token;
mod token_service;

pub use authenticator::{Authenticator, LoginFailure, LoginOutcome};
pub use claims::{AccessTokenClaims, ClaimsView, ParsedClaims, NAME_CLAIM_KEYS, ROLE_CLAIM_KEYS};
pub use jwt::{parse_claims, AccessTokenCodec};
pub use password::{hash_password, verify_password};
pub use refresh_token::{generate_refresh_token, hash_token, REFRESH_TOKEN_BYTES};
pub use token_service::{RefreshFailure, RefreshOutcome, TokenIssuer};
