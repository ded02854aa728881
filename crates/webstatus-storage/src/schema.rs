//! SQL schema and migration setup.
//!
//! Uses `rusqlite_migration` to manage schema migrations via SQLite's
//! `user_version` pragma. Migrations are embedded at compile time via
//! `include_str!`.

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StorageError;

/// All schema migrations, applied in order via `user_version` tracking.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial_schema.sql"))])
}

/// Opens (or creates) a SQLite database at `path` with WAL mode, foreign keys,
/// and all pending migrations applied.
pub fn open_database(path: &str) -> Result<Connection, StorageError> {
    let mut conn =
        Connection::open(path).map_err(|e| StorageError::internal("open database", e))?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

/// Opens an in-memory SQLite database with foreign keys and all pending
/// migrations applied.
pub fn open_in_memory() -> Result<Connection, StorageError> {
    let mut conn = Connection::open_in_memory()
        .map_err(|e| StorageError::internal("open in-memory database", e))?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

fn configure_and_migrate(conn: &mut Connection) -> Result<(), StorageError> {
    let pragma = |e| StorageError::internal("configure pragmas", e);
    conn.pragma_update(None, "journal_mode", "WAL").map_err(pragma)?;
    conn.pragma_update(None, "synchronous", "NORMAL").map_err(pragma)?;
    // Child rows of WebFeatures are not cascaded; deletes must clean them up.
    conn.pragma_update(None, "foreign_keys", "ON").map_err(pragma)?;

    migrations()
        .to_latest(conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn in_memory_database_has_all_tables() {
        let conn = open_in_memory().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        for expected in [
            "BrowserFeatureAvailabilities",
            "BrowserReleases",
            "DailyChromiumHistogramMetrics",
            "FeatureBaselineStatus",
            "FeatureSupportEvents",
            "LatestDailyChromiumHistogramMetrics",
            "LatestWPTRunFeatureMetrics",
            "Locks",
            "NotificationChannels",
            "SavedSearchUserRoles",
            "SavedSearches",
            "UserSavedSearchBookmarks",
            "WPTRunFeatureMetrics",
            "WPTRuns",
            "WebFeatures",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }
}
