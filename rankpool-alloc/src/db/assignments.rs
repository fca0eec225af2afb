//! Assignment store database operations
//!
//! One row per (session, ordinal). Rows for a session are written once,
//! together with the session's claims, and only ever replaced as a whole.

use rankpool_common::{Result, SessionId};
use sqlx::{Sqlite, SqliteConnection};

use crate::types::ResourceId;

/// Ordered assignment for `session` (empty if none)
pub async fn load_assignment<'e, E>(executor: E, session: &SessionId) -> Result<Vec<ResourceId>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_scalar(
        "SELECT resource_id FROM assignments WHERE session_id = ? ORDER BY ordinal",
    )
    .bind(session.as_str())
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Insert the full ordered assignment, ordinals `0..len`
pub async fn insert_assignment(
    conn: &mut SqliteConnection,
    session: &SessionId,
    resource_ids: &[ResourceId],
) -> Result<()> {
    for (ordinal, resource_id) in resource_ids.iter().enumerate() {
        sqlx::query("INSERT INTO assignments (session_id, ordinal, resource_id) VALUES (?, ?, ?)")
            .bind(session.as_str())
            .bind(ordinal as i64)
            .bind(resource_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Delete the whole assignment of `session`, returning the number of rows removed
pub async fn delete_session_assignment(
    conn: &mut SqliteConnection,
    session: &SessionId,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM assignments WHERE session_id = ?")
        .bind(session.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Delete every assignment row
pub async fn delete_all_assignments(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM assignments").execute(conn).await?;
    Ok(result.rows_affected())
}

/// Total assignment rows
pub async fn assignment_row_count<'e, E>(executor: E) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM assignments")
        .fetch_one(executor)
        .await?;
    Ok(count)
}
