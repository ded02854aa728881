//! TTL-fenced worker locks stored in the `Locks` table.
//!
//! A lock row is `Unlocked` when absent or when its owner is cleared, and
//! `Locked(owner, expires_at)` otherwise. Expiry is judged against the
//! client's [`Clock`](crate::clock::Clock): a lock whose `expires_at` is at
//! or before "now" is free for anyone to take. Every decision is made inside
//! one read-write transaction, so two workers racing for the same resource
//! cannot both win.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::client::{Client, ReadContext};
use crate::error::StorageError;
use crate::mutation::Mutation;
use crate::value::{get_optional_timestamp, FromRow, Statement};

const LOCKS_TABLE: &str = "Locks";

/// A granted lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockLease {
    pub resource: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

struct LockRow {
    worker_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl FromRow for LockRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(LockRow {
            worker_id: row.get(0)?,
            expires_at: get_optional_timestamp(row, 1)?,
        })
    }
}

impl LockRow {
    /// Owner of a lock that is still in force at `now`.
    fn live_owner(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.worker_id, self.expires_at) {
            (Some(owner), Some(expires_at)) if expires_at > now => Some(owner),
            _ => None,
        }
    }
}

fn select_lock(resource: &str) -> Statement {
    Statement::new("SELECT WorkerID, ExpiresAt FROM Locks WHERE ID = @id").bind("id", resource)
}

impl Client {
    /// Acquires or renews the lock on `resource` for `worker_id`.
    ///
    /// Succeeds when the resource is unlocked, when the current lock has
    /// expired, or when `worker_id` already holds it (the expiry is then
    /// pushed out to `now + ttl`). Fails with
    /// [`StorageError::AlreadyLocked`] while another worker's lock is live.
    pub async fn try_acquire_lock(
        &self,
        resource: &str,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<LockLease, StorageError> {
        let ttl = TimeDelta::from_std(ttl)
            .map_err(|e| StorageError::InvalidArgument(format!("lock ttl: {e}")))?;

        self.read_write(|txn| {
            let now = self.now();
            let current: Option<LockRow> = txn
                .query_optional(&select_lock(resource))
                .map_err(|e| e.in_operation("read lock"))?;

            if let Some(owner) = current.as_ref().and_then(|row| row.live_owner(now)) {
                if owner != worker_id {
                    return Err(StorageError::AlreadyLocked {
                        resource: resource.to_string(),
                        owner: owner.to_string(),
                    });
                }
            }

            let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
                StorageError::InvalidArgument(format!("lock ttl {ttl} overflows the expiry time"))
            })?;
            txn.buffer(
                Mutation::insert_or_update(LOCKS_TABLE)
                    .key("ID", resource)
                    .set("WorkerID", worker_id)
                    .set("ExpiresAt", expires_at)
                    .set_commit_timestamp("UpdatedAt"),
            );
            tracing::debug!(resource, worker_id, %expires_at, "lock acquired");
            Ok(LockLease {
                resource: resource.to_string(),
                owner: worker_id.to_string(),
                expires_at,
            })
        })
        .await
    }

    /// Releases `worker_id`'s lock on `resource`.
    ///
    /// A missing or already-cleared lock is a no-op. A lock recorded for a
    /// different worker, expired or not, fails with
    /// [`StorageError::LockNotOwned`] and is left untouched.
    pub async fn release_lock(&self, resource: &str, worker_id: &str) -> Result<(), StorageError> {
        self.read_write(|txn| {
            let current: Option<LockRow> = txn
                .query_optional(&select_lock(resource))
                .map_err(|e| e.in_operation("read lock"))?;

            let Some(owner) = current.and_then(|row| row.worker_id) else {
                return Ok(());
            };
            if owner != worker_id {
                return Err(StorageError::LockNotOwned {
                    resource: resource.to_string(),
                    worker_id: worker_id.to_string(),
                });
            }

            txn.buffer(
                Mutation::update(LOCKS_TABLE)
                    .key("ID", resource)
                    .set("WorkerID", Option::<String>::None)
                    .set("ExpiresAt", Option::<DateTime<Utc>>::None)
                    .set_commit_timestamp("UpdatedAt"),
            );
            tracing::debug!(resource, worker_id, "lock released");
            Ok(())
        })
        .await
    }
}
