use auth_server::clock::SystemClock;
use auth_server::configuration::get_configuration;
use auth_server::startup::{run, seed_admin, AppState};
use auth_server::store::{PgCredentialStore, PgRefreshTokenLedger};
use auth_server::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

fn startup_error(kind: std::io::ErrorKind, message: &'static str) -> std::io::Error {
    std::io::Error::new(kind, message)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("info");

    tracing::info!("Starting application");

    // A bad signing key is fatal here, before anything listens.
    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        startup_error(std::io::ErrorKind::Other, "Migration error")
    })?;

    let users = Arc::new(PgCredentialStore::new(pool.clone()));
    let ledger = Arc::new(PgRefreshTokenLedger::new(pool));

    if let Some(seed) = &configuration.application.seed_admin {
        seed_admin(
            users.as_ref(),
            seed,
            configuration.application.password_hash_cost,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to seed admin account: {}", e);
            startup_error(std::io::ErrorKind::Other, "Admin seeding error")
        })?;
    }

    let state = AppState::build(&configuration, users, ledger, Arc::new(SystemClock)).map_err(|e| {
        tracing::error!("Invalid token settings: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, state)?.await
}
