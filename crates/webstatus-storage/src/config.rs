//! Runtime configuration for the storage client.
//!
//! Values come from [`StorageConfig::default`], a deserialized config file,
//! or the environment via [`StorageConfig::from_env`]:
//! - `WEBSTATUS_DB_PATH`: SQLite database path (default: "webstatus.db")
//! - `WEBSTATUS_MAX_MUTATIONS`: mutation bound per sync transaction
//! - `WEBSTATUS_BATCH_CHUNK_SIZE`: rows per batch-writer flush
//! - `WEBSTATUS_BATCH_CHANNEL_CAPACITY`: batch producer queue depth
//! - `WEBSTATUS_MAX_TXN_ATTEMPTS`: attempts per read-write transaction

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Path that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file, or [`IN_MEMORY_PATH`].
    pub database_path: String,
    /// Upper bound on mutations applied in one sync transaction. Larger
    /// sync plans are split into several transactions.
    pub max_mutations_per_transaction: usize,
    /// Rows accumulated by the batch writer before each flush.
    pub batch_chunk_size: usize,
    /// Capacity of the bounded producer channel in the batch writer.
    pub batch_channel_capacity: usize,
    /// Attempts per read-write transaction when the engine reports contention.
    pub max_transaction_attempts: u32,
    pub max_saved_searches_per_user: usize,
    pub max_notification_channels_per_user: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            database_path: "webstatus.db".to_string(),
            max_mutations_per_transaction: 20_000,
            batch_chunk_size: 1_000,
            batch_channel_capacity: 1_000,
            max_transaction_attempts: 5,
            max_saved_searches_per_user: 25,
            max_notification_channels_per_user: 10,
        }
    }
}

impl StorageConfig {
    /// Default configuration over a private in-memory database.
    pub fn in_memory() -> Self {
        StorageConfig {
            database_path: IN_MEMORY_PATH.to_string(),
            ..StorageConfig::default()
        }
    }

    /// Reads overrides from `WEBSTATUS_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = StorageConfig::default();
        StorageConfig {
            database_path: std::env::var("WEBSTATUS_DB_PATH")
                .unwrap_or(defaults.database_path),
            max_mutations_per_transaction: env_or(
                "WEBSTATUS_MAX_MUTATIONS",
                defaults.max_mutations_per_transaction,
            ),
            batch_chunk_size: env_or("WEBSTATUS_BATCH_CHUNK_SIZE", defaults.batch_chunk_size),
            batch_channel_capacity: env_or(
                "WEBSTATUS_BATCH_CHANNEL_CAPACITY",
                defaults.batch_channel_capacity,
            ),
            max_transaction_attempts: env_or(
                "WEBSTATUS_MAX_TXN_ATTEMPTS",
                defaults.max_transaction_attempts,
            ),
            ..defaults
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == IN_MEMORY_PATH
    }
}

fn env_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable setting");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"batch_chunk_size": 7}"#).unwrap();
        assert_eq!(config.batch_chunk_size, 7);
        assert_eq!(config.max_transaction_attempts, 5);
        assert_eq!(config.database_path, "webstatus.db");
    }

    #[test]
    fn in_memory_uses_memory_path() {
        assert!(StorageConfig::in_memory().is_in_memory());
        assert!(!StorageConfig::default().is_in_memory());
    }
}
