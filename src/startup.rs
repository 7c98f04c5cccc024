use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{hash_password, Authenticator, TokenIssuer};
use crate::clock::Clock;
use crate::configuration::{SeedAdminSettings, Settings};
use crate::domain::{NewUser, Role};
use crate::error::{AppError, ConfigError};
use crate::logger::RequestLogger;
use crate::middleware::JwtMiddleware;
use crate::routes::{current_user, health_check, login, logout, logout_all, refresh, register};
use crate::store::{CredentialStore, RefreshTokenLedger};

/// Shared state handed to every handler.
pub struct AppState {
    pub authenticator: Authenticator,
    pub issuer: TokenIssuer,
    pub users: Arc<dyn CredentialStore>,
    pub password_hash_cost: u32,
}

impl AppState {
    /// Wires the authentication core over the given stores.
    ///
    /// # Errors
    /// `ConfigError` when the signing key is unusable; callers must not start
    /// serving in that case.
    pub fn build(
        settings: &Settings,
        users: Arc<dyn CredentialStore>,
        ledger: Arc<dyn RefreshTokenLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let cost = settings.application.password_hash_cost;
        Ok(Self {
            authenticator: Authenticator::new(users.clone(), cost),
            issuer: TokenIssuer::new(&settings.jwt, ledger, clock)?,
            users,
            password_hash_cost: cost,
        })
    }
}

/// Creates the configured admin account unless the username is taken.
/// Returns true when an account was created.
#[tracing::instrument(name = "seed_admin", skip_all, fields(username = %seed.username))]
pub async fn seed_admin(
    users: &dyn CredentialStore,
    seed: &SeedAdminSettings,
    cost: u32,
) -> Result<bool, AppError> {
    if users.exists(&seed.username).await? {
        tracing::debug!("Admin account already present");
        return Ok(false);
    }

    let user = users
        .insert(NewUser {
            username: seed.username.clone(),
            password_hash: hash_password(&seed.password, cost)?,
            role: Role::Admin,
            is_active: true,
        })
        .await?;

    tracing::info!(user_id = user.id, "Admin account created");
    Ok(true)
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let codec = state.issuer.codec().clone();
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(RequestLogger)
            .app_data(state.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/auth")
                    .route("/login", web::post().to(login))
                    .route("/register", web::post().to(register))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    // Bearer access token required
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::get().to(current_user)),
                    )
                    .service(
                        web::resource("/logout-all")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::post().to(logout_all)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
