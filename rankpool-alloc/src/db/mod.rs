//! Claim ledger and assignment store
//!
//! `claims` and `assignments` hold free functions usable on the pool or on
//! a transaction's connection. [`AssignmentStore`] is the injected handle
//! the allocator and HTTP layer share; it owns the pool and the lock-wait
//! budget and runs every per-session mutation in one immediate transaction.

pub mod assignments;
pub mod claims;

use rankpool_common::{Result, SessionId};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::types::ResourceId;
use crate::utils::{begin_immediate, retry_on_lock, ImmediateTransaction};

/// Snapshot of ledger contents for operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub claimed_resources: i64,
    pub sessions: i64,
    pub assignment_rows: i64,
}

/// Rows removed when releasing a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Released {
    pub claims: u64,
    pub assignment_rows: u64,
}

/// Durable store for claims and assignments
#[derive(Clone)]
pub struct AssignmentStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl AssignmentStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn max_lock_wait_ms(&self) -> u64 {
        self.max_lock_wait_ms
    }

    /// Take the write lock for one allocate-or-release step
    pub async fn begin_immediate(&self, caller: &'static str) -> Result<ImmediateTransaction> {
        begin_immediate(&self.pool, caller).await
    }

    /// Ordered assignment of `session`, empty if none (no lock needed)
    pub async fn fetch_assignment(&self, session: &SessionId) -> Result<Vec<ResourceId>> {
        assignments::load_assignment(&self.pool, session).await
    }

    /// Resources claimed by `session`
    pub async fn fetch_claims(&self, session: &SessionId) -> Result<Vec<ResourceId>> {
        claims::claims_for_session(&self.pool, session).await
    }

    /// Atomically delete all claim and assignment rows of `session`
    pub async fn release_session(&self, session: &SessionId) -> Result<Released> {
        retry_on_lock("release_session", self.max_lock_wait_ms, || async move {
            let mut tx = self.begin_immediate("store::release_session").await?;
            let released = Released {
                assignment_rows: assignments::delete_session_assignment(tx.conn()?, session).await?,
                claims: claims::delete_session_claims(tx.conn()?, session).await?,
            };
            tx.commit().await?;
            Ok(released)
        })
        .await
    }

    /// Atomically delete every claim and assignment
    pub async fn clear_ledger(&self) -> Result<Released> {
        retry_on_lock("clear_ledger", self.max_lock_wait_ms, || async move {
            let mut tx = self.begin_immediate("store::clear_ledger").await?;
            let released = Released {
                assignment_rows: assignments::delete_all_assignments(tx.conn()?).await?,
                claims: claims::delete_all_claims(tx.conn()?).await?,
            };
            tx.commit().await?;
            Ok(released)
        })
        .await
    }

    /// Counts of claims, sessions and assignment rows
    pub async fn ledger_summary(&self) -> Result<LedgerSummary> {
        let (claimed_resources, sessions) = claims::claim_counts(&self.pool).await?;
        let assignment_rows = assignments::assignment_row_count(&self.pool).await?;
        Ok(LedgerSummary {
            claimed_resources,
            sessions,
            assignment_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankpool_common::db::init_database;
    use tempfile::TempDir;

    async fn seeded_store(temp_dir: &TempDir) -> AssignmentStore {
        let pool = init_database(&temp_dir.path().join("store.db")).await.unwrap();
        let store = AssignmentStore::new(pool, 1000);

        for (session, ids) in [("s1", ["a.jpg", "b.jpg"]), ("s2", ["c.jpg", "d.jpg"])] {
            let session = SessionId::parse(session).unwrap();
            let ids: Vec<ResourceId> = ids.iter().map(|s| s.to_string()).collect();
            let mut tx = store.begin_immediate("test").await.unwrap();
            claims::insert_claims(tx.conn().unwrap(), &session, &ids, 1).await.unwrap();
            assignments::insert_assignment(tx.conn().unwrap(), &session, &ids).await.unwrap();
            tx.commit().await.unwrap();
        }

        store
    }

    #[tokio::test]
    async fn test_fetch_assignment_is_ordered() {
        let temp_dir = TempDir::new().unwrap();
        let store = seeded_store(&temp_dir).await;

        let s1 = SessionId::parse("s1").unwrap();
        assert_eq!(store.fetch_assignment(&s1).await.unwrap(), vec!["a.jpg", "b.jpg"]);

        let unknown = SessionId::parse("nobody").unwrap();
        assert!(store.fetch_assignment(&unknown).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_session_only_touches_that_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = seeded_store(&temp_dir).await;

        let s1 = SessionId::parse("s1").unwrap();
        let released = store.release_session(&s1).await.unwrap();
        assert_eq!(
            released,
            Released {
                claims: 2,
                assignment_rows: 2
            }
        );

        assert!(store.fetch_assignment(&s1).await.unwrap().is_empty());
        assert!(store.fetch_claims(&s1).await.unwrap().is_empty());

        let summary = store.ledger_summary().await.unwrap();
        assert_eq!(
            summary,
            LedgerSummary {
                claimed_resources: 2,
                sessions: 1,
                assignment_rows: 2
            }
        );
    }

    #[tokio::test]
    async fn test_clear_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let store = seeded_store(&temp_dir).await;

        let released = store.clear_ledger().await.unwrap();
        assert_eq!(released.claims, 4);
        assert_eq!(released.assignment_rows, 4);

        let summary = store.ledger_summary().await.unwrap();
        assert_eq!(summary.claimed_resources, 0);
        assert_eq!(summary.sessions, 0);
        assert_eq!(summary.assignment_rows, 0);
    }
}
