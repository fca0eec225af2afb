//! Database initialization
//!
//! Creates the database on first run and brings the claims ledger and
//! assignment tables into existence. Safe to call repeatedly.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default per-statement busy timeout
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 250;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    init_database_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
}

/// Initialize database with an explicit SQLite busy timeout
///
/// The busy timeout bounds how long a single statement (including
/// `BEGIN IMMEDIATE`) waits for the write lock before reporting
/// `SQLITE_BUSY`; longer waits are handled by the caller's retry loop.
pub async fn init_database_with_timeout(db_path: &Path, busy_timeout_ms: u64) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // WAL allows concurrent readers with one writer; options apply to
    // every pooled connection, not just the first one.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    info!("Database busy timeout set to {} ms", busy_timeout_ms);

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_claims_table(pool).await?;
    create_assignments_table(pool).await?;
    Ok(())
}

/// Create the claims ledger
///
/// `resource_id` is the primary key: a resource can be claimed by one
/// session only, for the lifetime of the store.
async fn create_claims_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS claims (
            resource_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            claimed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_claims_session ON claims(session_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the assignment store (ordered resources per session)
async fn create_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            session_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            resource_id TEXT NOT NULL,
            PRIMARY KEY (session_id, ordinal)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
