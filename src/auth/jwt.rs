/// JWT Token Generation and Validation
///
/// HS256 access tokens. `AccessTokenCodec` is built once from `JwtSettings`
/// and refuses keys shorter than 32 bytes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};

use crate::auth::claims::{AccessTokenClaims, ClaimsView, ParsedClaims};
use crate::configuration::JwtSettings;
use crate::domain::User;
use crate::error::{AppError, AuthError, ConfigError};

#[derive(Clone)]
pub struct AccessTokenCodec {
    issuer: String,
    audience: String,
    lifetime: chrono::Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AccessTokenCodec {
    /// # Errors
    /// `ConfigError` if the signing key is missing or shorter than 32 bytes,
    /// or the access-token lifetime is out of range
    pub fn new(settings: &JwtSettings) -> Result<Self, ConfigError> {
        let key = settings.signing_key()?;
        Ok(Self {
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            lifetime: settings.access_token_lifetime()?,
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
        })
    }

    /// Sign a fresh access token for `user`, issued at `now`.
    ///
    /// # Errors
    /// Returns error if token generation fails
    pub fn generate(&self, user: &User, now: DateTime<Utc>) -> Result<String, AppError> {
        let claims = AccessTokenClaims::new(user, &self.issuer, &self.audience, now, self.lifetime)?;

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify signature, expiry, issuer and audience.
    ///
    /// # Errors
    /// `AuthError::TokenInvalid` if the token is malformed, expired,
    /// tampered with or minted for another issuer/audience
    pub fn validate(&self, token: &str) -> Result<AccessTokenClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT validation error: {}", e);
                AppError::Auth(AuthError::TokenInvalid)
            })
    }
}

/// Read an access token's claims without checking signature or expiry.
///
/// For display only: never use the result for an authorization decision.
pub fn parse_claims(token: &str) -> ParsedClaims {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return ParsedClaims::Unparseable;
    };

    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
        return ParsedClaims::Unparseable;
    };

    match serde_json::from_slice::<Map<String, Value>>(&bytes) {
        Ok(map) => ParsedClaims::Parsed(ClaimsView::from_payload(&map)),
        Err(_) => ParsedClaims::Unparseable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn get_test_config() -> JwtSettings {
        JwtSettings {
            issuer: "MyApp".to_string(),
            audience: "MyAppClient".to_string(),
            key: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 7,
        }
    }

    fn admin() -> User {
        User {
            id: 1,
            username: "admin".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
            is_active: true,
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let codec = AccessTokenCodec::new(&get_test_config()).unwrap();

        let token = codec.generate(&admin(), Utc::now()).expect("Failed to generate token");
        let claims = codec.validate(&token).expect("Failed to validate token");

        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.name, "admin");
        assert_eq!(claims.role, "Admin");
        assert_eq!(claims.iss, "MyApp");
        assert_eq!(claims.aud, "MyAppClient");
    }

    #[test]
    fn test_token_has_three_segments() {
        let codec = AccessTokenCodec::new(&get_test_config()).unwrap();
        let token = codec.generate(&admin(), Utc::now()).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_short_key_fails_fast() {
        let mut config = get_test_config();
        config.key = "short".to_string();
        assert!(AccessTokenCodec::new(&config).is_err());
    }

    #[test]
    fn test_invalid_token() {
        let codec = AccessTokenCodec::new(&get_test_config()).unwrap();
        assert!(codec.validate("invalid.token.here").is_err());
    }

    #[test]
    fn test_tampered_token() {
        let codec = AccessTokenCodec::new(&get_test_config()).unwrap();
        let token = codec.generate(&admin(), Utc::now()).unwrap();

        let tampered = format!("{}X", token);
        assert!(codec.validate(&tampered).is_err());
    }

    #[test]
    fn test_expired_token() {
        let codec = AccessTokenCodec::new(&get_test_config()).unwrap();
        let token = codec
            .generate(&admin(), Utc::now() - chrono::Duration::hours(2))
            .unwrap();
        assert!(codec.validate(&token).is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let codec = AccessTokenCodec::new(&get_test_config()).unwrap();
        let token = codec.generate(&admin(), Utc::now()).unwrap();

        let mut config = get_test_config();
        config.issuer = "wrong-issuer".to_string();
        let other = AccessTokenCodec::new(&config).unwrap();

        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_wrong_audience() {
        let codec = AccessTokenCodec::new(&get_test_config()).unwrap();
        let token = codec.generate(&admin(), Utc::now()).unwrap();

        let mut config = get_test_config();
        config.audience = "someone-else".to_string();
        let other = AccessTokenCodec::new(&config).unwrap();

        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_parse_claims_round_trip() {
        let codec = AccessTokenCodec::new(&get_test_config()).unwrap();
        let token = codec.generate(&admin(), Utc::now()).unwrap();

        let view = parse_claims(&token).claims_or_default();
        assert_eq!(view.user_name, "admin");
        assert_eq!(view.role, "Admin");
        assert_eq!(view.subject, "admin");
        assert_eq!(view.issuer, "MyApp");
        assert_eq!(view.audience, vec!["MyAppClient".to_string()]);
        assert!(!view.token_id.is_empty());
        assert!(view.expires_at.is_some());
    }

    #[test]
    fn test_parse_claims_ignores_signature_and_expiry() {
        let codec = AccessTokenCodec::new(&get_test_config()).unwrap();
        let token = codec
            .generate(&admin(), Utc::now() - chrono::Duration::days(1))
            .unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[2] = "bogus";

        let parsed = parse_claims(&parts.join("."));
        assert!(parsed.is_parsed());
        assert_eq!(parsed.claims_or_default().role, "Admin");
    }

    #[test]
    fn test_parse_claims_on_garbage_is_lenient() {
        for input in ["", "not-a-jwt", "a.b", "a.!!!.c", "a.b.c.d"] {
            let parsed = parse_claims(input);
            assert_eq!(parsed, ParsedClaims::Unparseable, "input: {}", input);
            assert_eq!(parsed.claims_or_default(), ClaimsView::default());
        }
    }

    #[test]
    fn test_parse_claims_non_object_payload() {
        let payload = URL_SAFE_NO_PAD.encode(b"[1,2,3]");
        assert_eq!(parse_claims(&format!("h.{}.s", payload)), ParsedClaims::Unparseable);
    }
}
