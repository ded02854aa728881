//! Buffered row mutations.
//!
//! A [`Mutation`] names a table, the key columns that identify the row(s),
//! and the non-key columns to write. Mutations are staged on a
//! [`ReadWriteTxn`](crate::client::ReadWriteTxn) and only turned into SQL at
//! commit, so reads inside the transaction never observe them.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::error::StorageError;
use crate::value::{format_timestamp, SqlValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    /// Fails if the row already exists.
    Insert,
    /// Fails with [`StorageError::QueryReturnedNoResults`] if the row is missing.
    Update,
    /// Inserts, or overwrites the listed columns of an existing row. The row
    /// is updated in place, so dependent rows are untouched.
    InsertOrUpdate,
    /// Deletes the row with the full key.
    Delete,
    /// Deletes every row whose listed key columns match. No key columns
    /// deletes the whole table.
    DeleteMatching,
}

/// A column value, or the placeholder for the commit timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Value(Value),
    CommitTimestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    table: &'static str,
    op: MutationOp,
    key: Vec<(&'static str, Value)>,
    columns: Vec<(&'static str, ColumnValue)>,
}

impl Mutation {
    fn new(table: &'static str, op: MutationOp) -> Self {
        Mutation {
            table,
            op,
            key: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn insert(table: &'static str) -> Self {
        Self::new(table, MutationOp::Insert)
    }

    pub fn update(table: &'static str) -> Self {
        Self::new(table, MutationOp::Update)
    }

    pub fn insert_or_update(table: &'static str) -> Self {
        Self::new(table, MutationOp::InsertOrUpdate)
    }

    pub fn delete(table: &'static str) -> Self {
        Self::new(table, MutationOp::Delete)
    }

    pub fn delete_matching(table: &'static str) -> Self {
        Self::new(table, MutationOp::DeleteMatching)
    }

    /// Adds a key column.
    pub fn key(mut self, column: &'static str, value: impl SqlValue) -> Self {
        self.key.push((column, value.into_value()));
        self
    }

    /// Adds a non-key column.
    pub fn set(mut self, column: &'static str, value: impl SqlValue) -> Self {
        self.columns
            .push((column, ColumnValue::Value(value.into_value())));
        self
    }

    /// Sets `column` to the transaction's commit timestamp.
    pub fn set_commit_timestamp(mut self, column: &'static str) -> Self {
        self.columns.push((column, ColumnValue::CommitTimestamp));
        self
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn op(&self) -> MutationOp {
        self.op
    }

    /// Value staged for `column`, key or non-key.
    pub fn value(&self, column: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    pub fn key_value(&self, column: &str) -> Option<&Value> {
        self.key.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    /// Executes the mutation. Returns the number of affected rows.
    pub(crate) fn apply(
        &self,
        conn: &Connection,
        commit_ts: &DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let commit_ts = Value::Text(format_timestamp(commit_ts));
        let resolve = |v: &ColumnValue| match v {
            ColumnValue::Value(v) => v.clone(),
            ColumnValue::CommitTimestamp => commit_ts.clone(),
        };
        let table = quote(self.table);

        let (sql, values): (String, Vec<Value>) = match self.op {
            MutationOp::Insert | MutationOp::InsertOrUpdate => {
                let names: Vec<String> = self
                    .key
                    .iter()
                    .map(|(c, _)| quote(c))
                    .chain(self.columns.iter().map(|(c, _)| quote(c)))
                    .collect();
                let placeholders: Vec<String> =
                    (1..=names.len()).map(|i| format!("?{i}")).collect();
                let mut sql = format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    names.join(", "),
                    placeholders.join(", ")
                );
                if self.op == MutationOp::InsertOrUpdate {
                    let conflict: Vec<String> = self.key.iter().map(|(c, _)| quote(c)).collect();
                    if self.columns.is_empty() {
                        sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", conflict.join(", ")));
                    } else {
                        let assignments: Vec<String> = self
                            .columns
                            .iter()
                            .map(|(c, _)| format!("{0} = excluded.{0}", quote(c)))
                            .collect();
                        sql.push_str(&format!(
                            " ON CONFLICT ({}) DO UPDATE SET {}",
                            conflict.join(", "),
                            assignments.join(", ")
                        ));
                    }
                }
                let values = self
                    .key
                    .iter()
                    .map(|(_, v)| v.clone())
                    .chain(self.columns.iter().map(|(_, v)| resolve(v)))
                    .collect();
                (sql, values)
            }
            MutationOp::Update => {
                if self.columns.is_empty() {
                    return Ok(0);
                }
                let assignments: Vec<String> = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, (c, _))| format!("{} = ?{}", quote(c), i + 1))
                    .collect();
                let offset = self.columns.len();
                let sql = format!(
                    "UPDATE {table} SET {}{}",
                    assignments.join(", "),
                    where_clause(&self.key, offset)
                );
                let values = self
                    .columns
                    .iter()
                    .map(|(_, v)| resolve(v))
                    .chain(self.key.iter().map(|(_, v)| v.clone()))
                    .collect();
                (sql, values)
            }
            MutationOp::Delete | MutationOp::DeleteMatching => {
                let sql = format!("DELETE FROM {table}{}", where_clause(&self.key, 0));
                let values = self.key.iter().map(|(_, v)| v.clone()).collect();
                (sql, values)
            }
        };

        let context = || format!("{:?} on {}", self.op, self.table);
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| StorageError::internal(context(), e))?;
        let affected = stmt
            .execute(params_from_iter(values.iter()))
            .map_err(|e| StorageError::internal(context(), e))?;

        if self.op == MutationOp::Update && affected == 0 {
            return Err(StorageError::QueryReturnedNoResults);
        }
        Ok(affected)
    }
}

fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn where_clause(key: &[(&'static str, Value)], offset: usize) -> String {
    if key.is_empty() {
        return String::new();
    }
    let predicates: Vec<String> = key
        .iter()
        .enumerate()
        .map(|(i, (c, _))| format!("{} = ?{}", quote(c), offset + i + 1))
        .collect();
    format!(" WHERE {}", predicates.join(" AND "))
}
