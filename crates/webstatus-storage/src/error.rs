//! Storage error types for webstatus-storage.
//!
//! [`StorageError`] is the single error type returned by every primitive and
//! table function. Expected protocol outcomes (not found, lock contention,
//! quota and role checks) have their own variants so callers can branch on
//! them; anything the engine reports that is not otherwise classified is
//! carried as [`StorageError::InternalQueryFailure`].

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A by-key read matched zero rows.
    #[error("query returned no results")]
    QueryReturnedNoResults,

    /// The engine failed for a reason not otherwise classified.
    #[error("internal query failure during {context}: {source}")]
    InternalQueryFailure {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A pagination token could not be decoded into the expected shape.
    #[error("invalid cursor format: {0}")]
    InvalidCursorFormat(String),

    /// Another worker holds an unexpired lock on the resource.
    #[error("resource '{resource}' is already locked by '{owner}'")]
    AlreadyLocked { resource: String, owner: String },

    /// The releasing worker is not the current lock owner.
    #[error("lock on '{resource}' is not owned by '{worker_id}'")]
    LockNotOwned { resource: String, worker_id: String },

    /// The user lacks the role the operation requires.
    #[error("user '{user_id}' is missing required role {role}")]
    MissingRequiredRole { user_id: String, role: String },

    /// The user already owns the maximum number of saved searches.
    #[error("saved search quota of {limit} exceeded")]
    SavedSearchQuotaExceeded { limit: usize },

    /// The user already has the maximum number of notification channels.
    #[error("notification channel quota of {limit} exceeded")]
    NotificationChannelQuotaExceeded { limit: usize },

    /// The desired list handed to a sync repeats a business key.
    #[error("duplicate key {key} in desired state for {table}")]
    DuplicateSyncKey { table: &'static str, key: String },

    /// A business key referenced by an entity does not exist.
    #[error("{table} has no row with key '{key}'")]
    ReferenceNotFound { table: &'static str, key: String },

    /// A caller-supplied argument is outside its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored enumeration value could not be parsed.
    #[error(transparent)]
    Core(#[from] webstatus_core::CoreError),

    /// A background task panicked or was cancelled.
    #[error("task failure: {0}")]
    TaskFailure(String),
}

impl StorageError {
    /// Wraps an engine error with the operation that was running.
    pub fn internal(context: impl Into<String>, source: rusqlite::Error) -> Self {
        match source {
            rusqlite::Error::QueryReturnedNoRows => StorageError::QueryReturnedNoResults,
            source => StorageError::InternalQueryFailure {
                context: context.into(),
                source,
            },
        }
    }

    /// Replaces the context of an internal failure; other kinds pass through.
    pub fn in_operation(self, context: impl Into<String>) -> Self {
        match self {
            StorageError::InternalQueryFailure { source, .. } => {
                StorageError::InternalQueryFailure {
                    context: context.into(),
                    source,
                }
            }
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::QueryReturnedNoResults)
    }

    /// True for engine contention errors the transaction runner retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::InternalQueryFailure {
                source: rusqlite::Error::SqliteFailure(err, _),
                ..
            } => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::internal("query execution", err)
    }
}
