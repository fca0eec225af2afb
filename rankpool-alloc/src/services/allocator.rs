//! Pool allocator
//!
//! Hands each session a disjoint, durable slice of the image pool.
//!
//! **Guarantees:**
//! - Re-entry with the same session and `n_total` returns the stored list
//!   unchanged (no reshuffle on reload).
//! - No resource is ever assigned to two sessions: the claimed set is read
//!   and the new claims written under one `BEGIN IMMEDIATE` lock.
//! - A call either returns exactly `n_total` identifiers or fails without
//!   writing anything.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rankpool_common::{Error, Result, SessionId};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::db::{assignments, claims, AssignmentStore};
use crate::types::ResourceId;
use crate::utils::{retry_on_lock, ImmediateTransaction};

/// Allocates pool slices to sessions
#[derive(Clone)]
pub struct Allocator {
    store: AssignmentStore,
}

impl Allocator {
    pub fn new(store: AssignmentStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &AssignmentStore {
        &self.store
    }

    /// Return the session's assignment, creating it on first use
    ///
    /// Lock contention is retried with backoff up to the store's
    /// `max_lock_wait_ms`, after which [`Error::Busy`] is returned.
    /// [`Error::PoolExhausted`] is returned when fewer than `n_total`
    /// unclaimed resources remain.
    pub async fn get_or_create_assignment(
        &self,
        session: &SessionId,
        pool_ids: &[ResourceId],
        n_total: usize,
        seed: u64,
    ) -> Result<Vec<ResourceId>> {
        if n_total == 0 {
            return Err(Error::InvalidInput("n_total must be greater than 0".to_string()));
        }

        retry_on_lock(
            "get_or_create_assignment",
            self.store.max_lock_wait_ms(),
            move || self.try_get_or_create(session, pool_ids, n_total, seed),
        )
        .await
    }

    async fn try_get_or_create(
        &self,
        session: &SessionId,
        pool_ids: &[ResourceId],
        n_total: usize,
        seed: u64,
    ) -> Result<Vec<ResourceId>> {
        let existing = self.store.fetch_assignment(session).await?;

        if existing.len() == n_total {
            tracing::debug!(session = %session, n_total, "Returning existing assignment");
            return Ok(existing);
        }

        if !existing.is_empty() {
            tracing::warn!(
                session = %session,
                stored = existing.len(),
                n_total,
                "Stale assignment size, releasing and reallocating"
            );
            if let Err(e) = self.store.release_session(session).await {
                // Allocation below refuses to run over leftover rows
                tracing::warn!(session = %session, error = %e, "Stale assignment cleanup failed");
            }
        }

        self.allocate(session, pool_ids, n_total, seed).await
    }

    async fn allocate(
        &self,
        session: &SessionId,
        pool_ids: &[ResourceId],
        n_total: usize,
        seed: u64,
    ) -> Result<Vec<ResourceId>> {
        let mut tx = self.store.begin_immediate("allocator::allocate").await?;

        // A concurrent call for the same session may have committed first
        let existing = assignments::load_assignment(tx.conn()?, session).await?;
        if existing.len() == n_total {
            tx.commit().await?;
            tracing::debug!(session = %session, "Assignment created by concurrent call");
            return Ok(existing);
        }
        if !existing.is_empty() {
            tx.rollback().await?;
            return Err(Error::Internal(format!(
                "session {} still holds {} stale assignment rows",
                session,
                existing.len()
            )));
        }

        let claimed = claims::claimed_resource_ids(tx.conn()?).await?;
        let remaining = remaining_pool(pool_ids, &claimed);

        if remaining.len() < n_total {
            tx.rollback().await?;
            tracing::error!(
                session = %session,
                remaining = remaining.len(),
                needed = n_total,
                "Pool exhausted"
            );
            return Err(Error::PoolExhausted {
                remaining: remaining.len(),
                needed: n_total,
            });
        }

        let picked = sample_assignment(&remaining, n_total, session_seed(seed, session));

        if let Err(e) = write_allocation(&mut tx, session, &picked).await {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(session = %session, error = %rollback_err, "Rollback failed");
            }
            return Err(e);
        }
        tx.commit().await?;

        tracing::info!(
            session = %session,
            n_total,
            remaining_after = remaining.len() - n_total,
            "Assignment created"
        );

        Ok(picked)
    }
}

/// Insert claims and assignment rows for a fresh draw
async fn write_allocation(
    tx: &mut ImmediateTransaction,
    session: &SessionId,
    picked: &[ResourceId],
) -> Result<()> {
    let claimed_at = chrono::Utc::now().timestamp();

    claims::insert_claims(tx.conn()?, session, picked, claimed_at)
        .await
        .map_err(into_transaction_failed)?;
    assignments::insert_assignment(tx.conn()?, session, picked)
        .await
        .map_err(into_transaction_failed)?;

    Ok(())
}

fn into_transaction_failed(err: Error) -> Error {
    match err {
        Error::Database(e) => Error::TransactionFailed(e),
        other => other,
    }
}

/// Unclaimed pool identifiers, in pool order, without duplicates
fn remaining_pool(pool_ids: &[ResourceId], claimed: &HashSet<ResourceId>) -> Vec<ResourceId> {
    let mut seen = HashSet::with_capacity(pool_ids.len());
    pool_ids
        .iter()
        .filter(|id| !claimed.contains(*id) && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Per-session RNG seed: global seed plus a stable hash of the token
///
/// The hash is the first 8 bytes (little endian) of SHA-256, so draws are
/// reproducible across runs, builds and platforms while sessions started
/// together with the same global seed still diverge.
pub fn session_seed(seed: u64, session: &SessionId) -> u64 {
    let digest = Sha256::digest(session.as_str().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    seed.wrapping_add(u64::from_le_bytes(head))
}

/// Draw `n_total` distinct identifiers, then shuffle presentation order
///
/// Sampling decides which images; shuffling decides display order.
pub fn sample_assignment(remaining: &[ResourceId], n_total: usize, rng_seed: u64) -> Vec<ResourceId> {
    let mut rng = StdRng::seed_from_u64(rng_seed);
    let amount = n_total.min(remaining.len());

    let mut picked: Vec<ResourceId> = rand::seq::index::sample(&mut rng, remaining.len(), amount)
        .into_iter()
        .map(|i| remaining[i].clone())
        .collect();
    picked.shuffle(&mut rng);
    picked
}
