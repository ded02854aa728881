//! The storage client and its transaction types.
//!
//! [`Client`] owns a single SQLite connection behind an async-aware
//! `tokio::sync::Mutex` (the connection is `!Sync`). Work runs inside
//! closures handed to [`Client::read_only`] or [`Client::read_write`]:
//!
//! - Read-only closures see a consistent snapshot and cannot stage writes.
//! - Read-write closures stage [`Mutation`]s that are applied, together with
//!   the commit timestamp, only if the closure returns `Ok`. A closure that
//!   fails, or a caller that drops the future, commits nothing.
//! - When the engine reports contention the whole closure is re-run, up to
//!   [`StorageConfig::max_transaction_attempts`]. Application errors are
//!   never retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::mutation::Mutation;
use crate::value::{FromRow, Statement};

/// Read access shared by both transaction kinds.
pub trait ReadContext {
    fn connection(&self) -> &Connection;

    /// Runs `stmt` and decodes every row.
    fn query<T: FromRow>(&self, stmt: &Statement) -> Result<Vec<T>, StorageError> {
        let conn = self.connection();
        let mut prepared = conn.prepare_cached(stmt.sql())?;
        let params = stmt.named_params();
        let rows = prepared.query_map(params.as_slice(), T::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Runs `stmt` and decodes the first row, if any.
    fn query_optional<T: FromRow>(&self, stmt: &Statement) -> Result<Option<T>, StorageError> {
        let conn = self.connection();
        let mut prepared = conn.prepare_cached(stmt.sql())?;
        let params = stmt.named_params();
        let mut rows = prepared.query(params.as_slice())?;
        match rows.next()? {
            Some(row) => Ok(Some(T::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Like [`query_optional`](Self::query_optional) but zero rows is
    /// [`StorageError::QueryReturnedNoResults`].
    fn query_one<T: FromRow>(&self, stmt: &Statement) -> Result<T, StorageError> {
        self.query_optional(stmt)?
            .ok_or(StorageError::QueryReturnedNoResults)
    }
}

pub struct ReadOnlyTxn<'c> {
    tx: Transaction<'c>,
}

impl ReadContext for ReadOnlyTxn<'_> {
    fn connection(&self) -> &Connection {
        &self.tx
    }
}

pub struct ReadWriteTxn<'c> {
    tx: Transaction<'c>,
    buffered: Vec<Mutation>,
}

impl ReadContext for ReadWriteTxn<'_> {
    fn connection(&self) -> &Connection {
        &self.tx
    }
}

impl ReadWriteTxn<'_> {
    /// Stages a mutation for commit.
    pub fn buffer(&mut self, mutation: Mutation) {
        self.buffered.push(mutation);
    }

    pub fn buffer_all(&mut self, mutations: impl IntoIterator<Item = Mutation>) {
        self.buffered.extend(mutations);
    }

    /// Mutations staged so far.
    pub fn buffered(&self) -> &[Mutation] {
        &self.buffered
    }

    fn commit(self, commit_ts: DateTime<Utc>) -> Result<usize, StorageError> {
        let ReadWriteTxn { tx, buffered } = self;
        for mutation in &buffered {
            mutation.apply(&tx, &commit_ts)?;
        }
        tx.commit()
            .map_err(|e| StorageError::internal("commit", e))?;
        Ok(buffered.len())
    }
}

struct ClientInner {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    config: StorageConfig,
}

/// Handle to the store. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Opens the database named by `config` using the system clock.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        config: StorageConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        let conn = if config.is_in_memory() {
            crate::schema::open_in_memory()?
        } else {
            crate::schema::open_database(&config.database_path)?
        };
        tracing::debug!(path = %config.database_path, "opened storage client");
        Ok(Client {
            inner: Arc::new(ClientInner {
                conn: Mutex::new(conn),
                clock,
                config,
            }),
        })
    }

    /// Private in-memory database with default settings (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::open(StorageConfig::in_memory())
    }

    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Runs `f` inside a read-only snapshot.
    pub async fn read_only<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&ReadOnlyTxn<'_>) -> Result<T, StorageError>,
    {
        let mut conn = self.inner.conn.lock().await;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|e| StorageError::internal("begin read-only transaction", e))?;
        let txn = ReadOnlyTxn { tx };
        let out = f(&txn)?;
        txn.tx
            .rollback()
            .map_err(|e| StorageError::internal("end read-only transaction", e))?;
        Ok(out)
    }

    /// Runs `f` inside a read-write transaction and commits its staged
    /// mutations. `f` may run more than once.
    pub async fn read_write<T, F>(&self, mut f: F) -> Result<T, StorageError>
    where
        F: FnMut(&mut ReadWriteTxn<'_>) -> Result<T, StorageError>,
    {
        let max_attempts = self.inner.config.max_transaction_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = {
                let mut conn = self.inner.conn.lock().await;
                self.run_read_write(&mut conn, &mut f)
            };
            match result {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(attempt, error = %err, "read-write transaction aborted, retrying");
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn run_read_write<T, F>(&self, conn: &mut Connection, f: &mut F) -> Result<T, StorageError>
    where
        F: FnMut(&mut ReadWriteTxn<'_>) -> Result<T, StorageError>,
    {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::internal("begin read-write transaction", e))?;
        let mut txn = ReadWriteTxn {
            tx,
            buffered: Vec::new(),
        };
        let out = f(&mut txn)?;
        let applied = txn.commit(self.inner.clock.now())?;
        if applied > 0 {
            tracing::debug!(mutations = applied, "committed read-write transaction");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::get_timestamp;

    struct Lock {
        worker: Option<String>,
        updated_at: DateTime<Utc>,
    }

    impl FromRow for Lock {
        fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
            Ok(Lock {
                worker: row.get(0)?,
                updated_at: get_timestamp(row, 1)?,
            })
        }
    }

    fn select_lock(id: &str) -> Statement {
        Statement::new("SELECT WorkerID, UpdatedAt FROM Locks WHERE ID = @id").bind("id", id)
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let client = Client::in_memory().unwrap();
        client
            .read_write(|txn| {
                txn.buffer(
                    Mutation::insert_or_update("Locks")
                        .key("ID", "r")
                        .set("WorkerID", "w")
                        .set_commit_timestamp("UpdatedAt"),
                );
                let seen: Option<Lock> = txn.query_optional(&select_lock("r"))?;
                assert!(seen.is_none());
                Ok(())
            })
            .await
            .unwrap();

        let lock: Lock = client
            .read_only(|txn| txn.query_one(&select_lock("r")))
            .await
            .unwrap();
        assert_eq!(lock.worker.as_deref(), Some("w"));
        assert!(lock.updated_at <= Utc::now());
    }

    #[tokio::test]
    async fn failed_closure_commits_nothing() {
        let client = Client::in_memory().unwrap();
        let err = client
            .read_write(|txn| -> Result<(), StorageError> {
                txn.buffer(
                    Mutation::insert_or_update("Locks")
                        .key("ID", "r")
                        .set_commit_timestamp("UpdatedAt"),
                );
                Err(StorageError::InvalidArgument("boom".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        let err = client
            .read_only(|txn| txn.query_one::<Lock>(&select_lock("r")))
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn failing_mutation_rolls_back_earlier_ones() {
        let client = Client::in_memory().unwrap();
        let result = client
            .read_write(|txn| {
                txn.buffer(
                    Mutation::insert("Locks")
                        .key("ID", "first")
                        .set_commit_timestamp("UpdatedAt"),
                );
                txn.buffer(Mutation::update("Locks").key("ID", "missing").set("WorkerID", "w"));
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_not_found());

        let found: Option<Lock> = client
            .read_only(|txn| txn.query_optional(&select_lock("first")))
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
