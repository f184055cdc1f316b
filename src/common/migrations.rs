// src/common/migrations.rs
//! Database migration and schema management

use sqlx::SqlitePool;
use std::env;
use tracing::{info, warn};

/// Run all database migrations
///
/// Tables are created if missing. `RESET_DB=true` drops everything first.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let should_reset_db = env::var("RESET_DB").unwrap_or_else(|_| "false".to_string()) == "true";

    if should_reset_db {
        warn!("RESET_DB=true - dropping all tables and recreating schema");
        drop_all_tables(pool).await?;
    } else {
        info!("Skipping table drop (RESET_DB not set)");
    }

    create_schema(pool).await?;

    info!("Database migration completed");
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    create_identity_tables(pool).await?;
    create_oauth_tables(pool).await?;
    create_sponsorship_tables(pool).await?;
    create_indexes(pool).await?;
    Ok(())
}

async fn drop_all_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for table in [
        "sponsorship_events",
        "sponsorships",
        "oauth_states",
        "external_identities",
        "users",
    ] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn create_identity_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Users table. `email` is NULL until a verified address is known;
    // SQLite UNIQUE admits any number of NULLs.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE,
            name TEXT,
            password_hash TEXT,
            session_version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_seen_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS external_identities (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            subject TEXT NOT NULL,
            email TEXT,
            email_verified INTEGER NOT NULL DEFAULT 0,
            name TEXT,
            avatar TEXT,
            linked_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(provider, subject),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_oauth_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS oauth_states (
            state TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sponsorship_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sponsorships (
            user_id TEXT PRIMARY KEY,
            tier TEXT NOT NULL,
            status TEXT NOT NULL,
            last_event_id TEXT NOT NULL,
            payment_id TEXT,
            invoice_url TEXT,
            activated_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Applied-event history; the primary key is what makes application idempotent.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sponsorship_events (
            event_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL,
            tier TEXT,
            payment_id TEXT,
            applied_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_identities_user ON external_identities(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_identities_email ON external_identities(email)",
        "CREATE INDEX IF NOT EXISTS idx_oauth_states_expires ON oauth_states(expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_sponsorship_events_user ON sponsorship_events(user_id, applied_at)",
    ];

    for statement in indexes {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

/// In-memory database with the full schema, pinned to one connection so every
/// query sees the same database.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    create_schema(&pool).await.unwrap();
    pool
}
