use serde::Deserialize;

use crate::error::ConfigError;

/// Minimum HMAC signing key length in bytes (256 bits)
pub const MIN_SIGNING_KEY_BYTES: usize = 32;
/// Upper bound for `jwt.access_token_expiry_minutes` (one day)
pub const MAX_ACCESS_TOKEN_MINUTES: i64 = 24 * 60;
/// Upper bound for `jwt.refresh_token_expiry_days`
pub const MAX_REFRESH_TOKEN_DAYS: i64 = 365;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// bcrypt cost used when hashing new passwords
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
    /// Admin account created at startup when absent
    #[serde(default)]
    pub seed_admin: Option<SeedAdminSettings>,
}

#[derive(Deserialize, Clone)]
pub struct SeedAdminSettings {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SeedAdminSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedAdminSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT authentication settings
#[derive(Deserialize, Clone)]
pub struct JwtSettings {
    pub issuer: String,
    pub audience: String,
    /// Symmetric HMAC key, at least 32 bytes
    pub key: String,
    #[serde(default = "default_access_token_expiry_minutes")]
    pub access_token_expiry_minutes: i64,
    #[serde(default = "default_refresh_token_expiry_days")]
    pub refresh_token_expiry_days: i64,
}

impl JwtSettings {
    /// Returns the signing key bytes, refusing keys shorter than 256 bits.
    pub fn signing_key(&self) -> Result<&[u8], ConfigError> {
        let key = self.key.as_bytes();
        if key.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.key".to_string()));
        }
        if key.len() < MIN_SIGNING_KEY_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.key must be at least {} bytes, got {}",
                MIN_SIGNING_KEY_BYTES,
                key.len()
            )));
        }
        Ok(key)
    }

    /// Access-token lifetime, in `1..=MAX_ACCESS_TOKEN_MINUTES` minutes.
    pub fn access_token_lifetime(&self) -> Result<chrono::Duration, ConfigError> {
        let minutes = self.access_token_expiry_minutes;
        if !(1..=MAX_ACCESS_TOKEN_MINUTES).contains(&minutes) {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.access_token_expiry_minutes must be between 1 and {}, got {}",
                MAX_ACCESS_TOKEN_MINUTES, minutes
            )));
        }
        Ok(chrono::Duration::minutes(minutes))
    }

    /// Refresh-token lifetime, in `1..=MAX_REFRESH_TOKEN_DAYS` days.
    pub fn refresh_token_lifetime(&self) -> Result<chrono::Duration, ConfigError> {
        let days = self.refresh_token_expiry_days;
        if !(1..=MAX_REFRESH_TOKEN_DAYS).contains(&days) {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.refresh_token_expiry_days must be between 1 and {}, got {}",
                MAX_REFRESH_TOKEN_DAYS, days
            )));
        }
        Ok(chrono::Duration::days(days))
    }

    /// Checks everything token issuance depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signing_key()?;
        self.access_token_lifetime()?;
        self.refresh_token_lifetime()?;
        Ok(())
    }
}

// The key never shows up in logs.
impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("key", &"<redacted>")
            .field("access_token_expiry_minutes", &self.access_token_expiry_minutes)
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .finish()
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_password_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_access_token_expiry_minutes() -> i64 {
    30
}

fn default_refresh_token_expiry_days() -> i64 {
    7
}

/// Load settings from `configuration.yaml` (optional) overlaid with
/// `APP__SECTION__KEY` environment variables.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .try_parsing(true)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.jwt.validate()?;
    Ok(settings)
}
