//! PostgreSQL store behaviour. Each test runs against its own freshly
//! migrated database, so a reachable Postgres (see `configuration.yaml`)
//! is required.

use auth_server::auth::{RefreshOutcome, TokenIssuer};
use auth_server::clock::SystemClock;
use auth_server::configuration::{get_configuration, DatabaseSettings};
use auth_server::domain::{NewRefreshToken, NewUser, Role, User};
use auth_server::error::{AppError, DatabaseError};
use auth_server::store::{
    CredentialStore, PgCredentialStore, PgRefreshTokenLedger, RefreshTokenLedger,
};
use chrono::{Duration, Utc};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::sync::Arc;

pub struct TestDb {
    pub users: PgCredentialStore,
    pub ledger: PgRefreshTokenLedger,
}

async fn spawn_db() -> TestDb {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let pool = configure_database(&configuration.database).await;

    TestDb {
        users: PgCredentialStore::new(pool.clone()),
        ledger: PgRefreshTokenLedger::new(pool),
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn insert_user(db: &TestDb, username: &str) -> User {
    db.users
        .insert(NewUser {
            username: username.to_string(),
            password_hash: "unused".to_string(),
            role: Role::Admin,
            is_active: true,
        })
        .await
        .expect("Failed to insert user")
}

fn new_token(user_id: i64, hash: &str, replaced: Option<i64>) -> NewRefreshToken {
    NewRefreshToken {
        user_id,
        token_hash: hash.to_string(),
        expires_at: Utc::now() + Duration::days(7),
        replaced_token_id: replaced,
    }
}

// --- Credential Store ---

#[tokio::test]
async fn username_lookup_is_exact_and_case_sensitive() {
    let db = spawn_db().await;
    let admin = insert_user(&db, "admin").await;

    let found = db.users.find_by_username("admin").await.unwrap().unwrap();
    assert_eq!(found.id, admin.id);
    assert_eq!(found.role, Role::Admin);

    assert!(db.users.find_by_username("Admin").await.unwrap().is_none());
    assert!(db.users.find_by_username("admin ").await.unwrap().is_none());
    assert!(db.users.exists("admin").await.unwrap());
    assert!(!db.users.exists("ADMIN").await.unwrap());
}

#[tokio::test]
async fn duplicate_username_is_a_username_conflict() {
    let db = spawn_db().await;
    insert_user(&db, "admin").await;

    let result = db
        .users
        .insert(NewUser {
            username: "admin".to_string(),
            password_hash: "other".to_string(),
            role: Role::User,
            is_active: true,
        })
        .await;

    match result {
        Err(AppError::Database(e)) => assert!(e.is_username_conflict()),
        other => panic!("Expected a username conflict, got {:?}", other.map(|u| u.id)),
    }
}

#[tokio::test]
async fn deactivation_is_visible_through_the_ledger() {
    let db = spawn_db().await;
    let admin = insert_user(&db, "admin").await;
    db.ledger.insert(new_token(admin.id, "hash-1", None)).await.unwrap();

    assert!(db.users.set_active(admin.id, false).await.unwrap());
    assert!(!db.users.set_active(admin.id + 1000, false).await.unwrap());

    let entry = db.ledger.find_by_hash("hash-1").await.unwrap().unwrap();
    assert!(!entry.owner.is_active);
}

// --- Refresh Token Ledger ---

#[tokio::test]
async fn duplicate_token_hash_is_rejected_without_overwrite() {
    let db = spawn_db().await;
    let admin = insert_user(&db, "admin").await;
    let first = db.ledger.insert(new_token(admin.id, "same-hash", None)).await.unwrap();

    let result = db.ledger.insert(new_token(admin.id, "same-hash", None)).await;
    match result {
        Err(AppError::Database(e @ DatabaseError::UniqueConstraintViolation(_))) => {
            assert!(!e.is_username_conflict());
        }
        other => panic!("Expected a unique violation, got {:?}", other.map(|r| r.id)),
    }

    let entry = db.ledger.find_by_hash("same-hash").await.unwrap().unwrap();
    assert_eq!(entry.record.id, first.id);
}

#[tokio::test]
async fn rotation_revokes_and_links_the_successor() {
    let db = spawn_db().await;
    let admin = insert_user(&db, "admin").await;
    let consumed = db.ledger.insert(new_token(admin.id, "old", None)).await.unwrap();

    let successor = db
        .ledger
        .rotate(consumed.id, new_token(admin.id, "new", Some(consumed.id)))
        .await
        .unwrap()
        .expect("rotation should win");

    assert_eq!(successor.replaced_token_id, Some(consumed.id));
    assert!(!successor.is_revoked);

    let old = db.ledger.find_by_hash("old").await.unwrap().unwrap();
    assert!(old.record.is_revoked);
    assert_eq!(old.owner.id, admin.id);

    let new = db.ledger.find_by_hash("new").await.unwrap().unwrap();
    assert_eq!(new.record.id, successor.id);

    // A second rotation of the same record loses and writes nothing
    let again = db
        .ledger
        .rotate(consumed.id, new_token(admin.id, "newer", Some(consumed.id)))
        .await
        .unwrap();
    assert!(again.is_none());
    assert!(db.ledger.find_by_hash("newer").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_rotations_have_one_winner() {
    let db = spawn_db().await;
    let admin = insert_user(&db, "admin").await;
    let consumed = db.ledger.insert(new_token(admin.id, "contested", None)).await.unwrap();

    let (a, b) = tokio::join!(
        db.ledger
            .rotate(consumed.id, new_token(admin.id, "winner-a", Some(consumed.id))),
        db.ledger
            .rotate(consumed.id, new_token(admin.id, "winner-b", Some(consumed.id))),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);

    let a_row = db.ledger.find_by_hash("winner-a").await.unwrap();
    let b_row = db.ledger.find_by_hash("winner-b").await.unwrap();
    assert_eq!(a_row.is_some(), a.is_some());
    assert_eq!(b_row.is_some(), b.is_some());
}

#[tokio::test]
async fn rotation_with_colliding_hash_rolls_back() {
    let db = spawn_db().await;
    let admin = insert_user(&db, "admin").await;
    db.ledger.insert(new_token(admin.id, "taken", None)).await.unwrap();
    let consumed = db.ledger.insert(new_token(admin.id, "current", None)).await.unwrap();

    let result = db
        .ledger
        .rotate(consumed.id, new_token(admin.id, "taken", Some(consumed.id)))
        .await;
    assert!(result.is_err());

    let current = db.ledger.find_by_hash("current").await.unwrap().unwrap();
    assert!(!current.record.is_revoked);
}

#[tokio::test]
async fn revoke_and_revoke_all_only_touch_live_tokens() {
    let db = spawn_db().await;
    let admin = insert_user(&db, "admin").await;
    let other = insert_user(&db, "other").await;

    let first = db.ledger.insert(new_token(admin.id, "a1", None)).await.unwrap();
    db.ledger.insert(new_token(admin.id, "a2", None)).await.unwrap();
    db.ledger.insert(new_token(admin.id, "a3", None)).await.unwrap();
    db.ledger.insert(new_token(other.id, "o1", None)).await.unwrap();

    assert!(db.ledger.revoke(first.id).await.unwrap());
    assert!(!db.ledger.revoke(first.id).await.unwrap());

    assert_eq!(db.ledger.revoke_all_for_user(admin.id).await.unwrap(), 2);
    assert_eq!(db.ledger.revoke_all_for_user(admin.id).await.unwrap(), 0);

    let untouched = db.ledger.find_by_hash("o1").await.unwrap().unwrap();
    assert!(!untouched.record.is_revoked);
}

// --- Token Issuer over PostgreSQL ---

#[tokio::test]
async fn issuer_refreshes_a_token_exactly_once() {
    let db = spawn_db().await;
    let admin = insert_user(&db, "admin").await;
    let configuration = get_configuration().expect("Failed to read configuration.");

    let issuer = TokenIssuer::new(
        &configuration.jwt,
        Arc::new(db.ledger.clone()),
        Arc::new(SystemClock),
    )
    .expect("Failed to build issuer");

    let pair = issuer.issue(&admin).await.unwrap();

    let (a, b) = tokio::join!(
        issuer.refresh(&pair.refresh_token),
        issuer.refresh(&pair.refresh_token),
    );
    let rotated = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(|outcome| matches!(outcome, RefreshOutcome::Rotated(_)))
        .count();
    assert_eq!(rotated, 1);

    let replay = issuer.refresh(&pair.refresh_token).await.unwrap();
    assert!(matches!(replay, RefreshOutcome::Rejected(_)));
}
