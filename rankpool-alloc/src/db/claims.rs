//! Claim ledger database operations
//!
//! A claim grants one resource to one session for the lifetime of the
//! store. Writers must run inside an immediate transaction (see
//! [`crate::utils::begin_immediate`]) so that reading the claimed set and
//! inserting new claims cannot interleave with another allocation.

use rankpool_common::{Result, SessionId};
use sqlx::{Sqlite, SqliteConnection};
use std::collections::HashSet;

use crate::types::ResourceId;

/// Insert one claim row per resource, all owned by `session`
///
/// Fails (and leaves the transaction to be rolled back) if any resource
/// is already claimed.
pub async fn insert_claims(
    conn: &mut SqliteConnection,
    session: &SessionId,
    resource_ids: &[ResourceId],
    claimed_at: i64,
) -> Result<()> {
    for resource_id in resource_ids {
        sqlx::query("INSERT INTO claims (resource_id, session_id, claimed_at) VALUES (?, ?, ?)")
            .bind(resource_id)
            .bind(session.as_str())
            .bind(claimed_at)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Full scan of currently claimed resource identifiers
pub async fn claimed_resource_ids<'e, E>(executor: E) -> Result<HashSet<ResourceId>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows: Vec<String> = sqlx::query_scalar("SELECT resource_id FROM claims")
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Resources claimed by one session, sorted
pub async fn claims_for_session<'e, E>(executor: E, session: &SessionId) -> Result<Vec<ResourceId>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_scalar(
        "SELECT resource_id FROM claims WHERE session_id = ? ORDER BY resource_id",
    )
    .bind(session.as_str())
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Delete every claim owned by `session`, returning the number removed
pub async fn delete_session_claims(conn: &mut SqliteConnection, session: &SessionId) -> Result<u64> {
    let result = sqlx::query("DELETE FROM claims WHERE session_id = ?")
        .bind(session.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Delete every claim in the ledger
pub async fn delete_all_claims(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM claims").execute(conn).await?;
    Ok(result.rows_affected())
}

/// (claimed resources, distinct owning sessions)
pub async fn claim_counts<'e, E>(executor: E) -> Result<(i64, i64)>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let counts: (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT session_id) FROM claims")
            .fetch_one(executor)
            .await?;
    Ok(counts)
}
