//! Write-locking transactions
//!
//! `sqlx` begins SQLite transactions as DEFERRED, which only takes the
//! write lock at the first write. Allocation reads the claims ledger and
//! then writes based on what it read, so it needs the lock up front:
//! `BEGIN IMMEDIATE`. This module wraps a pooled connection holding such a
//! transaction and logs acquisition and hold timing.

use rankpool_common::{Error, Result};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::time::Instant;

/// Pooled connection inside `BEGIN IMMEDIATE`
///
/// Finish with [`commit`](Self::commit) or [`rollback`](Self::rollback).
/// If the guard is dropped while the transaction is still open (an error
/// path or a cancelled future), the connection is detached from the pool
/// and closed, and SQLite rolls the transaction back.
pub struct ImmediateTransaction {
    conn: Option<PoolConnection<Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl ImmediateTransaction {
    /// Connection to run statements on
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| Error::Internal("transaction already finished".to_string()))
    }

    /// Commit and return the connection to the pool
    pub async fn commit(mut self) -> Result<()> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| Error::Internal("transaction already finished".to_string()))?;

        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            // A failed COMMIT may leave the transaction open; never pool it
            drop(conn.detach());
            tracing::warn!(caller = self.caller, error = %e, "Commit failed, connection discarded");
            return Err(Error::TransactionFailed(e));
        }

        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 1000 {
            tracing::warn!(
                caller = self.caller,
                held_ms = held_ms,
                "Write lock held longer than expected (>1s)"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms = held_ms, "Write lock released (commit)");
        }

        Ok(())
    }

    /// Roll back and return the connection to the pool
    pub async fn rollback(mut self) -> Result<()> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| Error::Internal("transaction already finished".to_string()))?;

        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            drop(conn.detach());
            return Err(Error::Database(e));
        }

        tracing::debug!(
            caller = self.caller,
            held_ms = self.acquired_at.elapsed().as_millis(),
            "Write lock released (rollback)"
        );

        Ok(())
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Write lock released (drop), closing connection"
            );
            drop(conn.detach());
        }
    }
}

/// Acquire a connection and take the database write lock
///
/// Waits up to the connection's busy timeout for the lock; on contention
/// the returned error satisfies [`Error::is_lock_error`].
pub async fn begin_immediate(pool: &SqlitePool, caller: &'static str) -> Result<ImmediateTransaction> {
    let start = Instant::now();

    tracing::debug!(caller = caller, "Write lock requested");

    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 500 {
        tracing::info!(
            caller = caller,
            wait_ms = wait_ms,
            "Write lock acquisition slower than expected (>500ms)"
        );
    } else {
        tracing::debug!(caller = caller, wait_ms = wait_ms, "Write lock acquired");
    }

    Ok(ImmediateTransaction {
        conn: Some(conn),
        caller,
        acquired_at: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankpool_common::db::init_database;
    use tempfile::TempDir;

    async fn claim_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM claims")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn insert_claim(tx: &mut ImmediateTransaction, id: &str) {
        sqlx::query("INSERT INTO claims (resource_id, session_id, claimed_at) VALUES (?, 's', 0)")
            .bind(id)
            .execute(tx.conn().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("t.db")).await.unwrap();

        let mut tx = begin_immediate(&pool, "test").await.unwrap();
        insert_claim(&mut tx, "a.jpg").await;
        tx.commit().await.unwrap();

        assert_eq!(claim_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("t.db")).await.unwrap();

        let mut tx = begin_immediate(&pool, "test").await.unwrap();
        insert_claim(&mut tx, "a.jpg").await;
        tx.rollback().await.unwrap();

        assert_eq!(claim_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_drop_discards_and_releases_lock() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("t.db")).await.unwrap();

        {
            let mut tx = begin_immediate(&pool, "test").await.unwrap();
            insert_claim(&mut tx, "a.jpg").await;
        }

        assert_eq!(claim_count(&pool).await, 0);

        // Lock must be free again
        let tx = begin_immediate(&pool, "test").await.unwrap();
        tx.commit().await.unwrap();
    }
}
