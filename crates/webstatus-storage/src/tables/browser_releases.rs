//! The `BrowserReleases` table, keyed by (browser name, browser version).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webstatus_core::BrowserRelease;

use crate::client::{Client, ReadContext, ReadWriteTxn};
use crate::cursor::{decode_page_token, page_limit, Page};
use crate::error::StorageError;
use crate::mapper::{ReadMapper, WriteMapper};
use crate::mutation::Mutation;
use crate::reader::EntityReader;
use crate::value::{get_timestamp, FromRow, Statement};
use crate::writer::{EntityWriter, WriteAction};

const TABLE: &str = "BrowserReleases";

const SELECT_COLUMNS: &str = "SELECT BrowserName, BrowserVersion, ReleaseDate FROM BrowserReleases";

impl FromRow for BrowserRelease {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(BrowserRelease {
            browser_name: row.get(0)?,
            browser_version: row.get(1)?,
            release_date: get_timestamp(row, 2)?,
        })
    }
}

struct BrowserReleaseMapper;

impl ReadMapper for BrowserReleaseMapper {
    type Key = (String, String);
    type Internal = BrowserRelease;

    fn table(&self) -> &'static str {
        TABLE
    }

    fn select_one(&self, (name, version): &(String, String)) -> Statement {
        Statement::new(format!(
            "{SELECT_COLUMNS} WHERE BrowserName = @browser_name AND BrowserVersion = @browser_version"
        ))
        .bind("browser_name", name.as_str())
        .bind("browser_version", version.as_str())
    }
}

impl WriteMapper for BrowserReleaseMapper {
    type External = BrowserRelease;

    fn key_from_external(&self, external: &BrowserRelease) -> (String, String) {
        (external.browser_name.clone(), external.browser_version.clone())
    }

    fn new_entity(
        &self,
        _txn: &ReadWriteTxn<'_>,
        external: &BrowserRelease,
    ) -> Result<BrowserRelease, StorageError> {
        Ok(external.clone())
    }

    fn merge_and_check_changed(
        &self,
        external: &BrowserRelease,
        existing: BrowserRelease,
    ) -> (BrowserRelease, bool) {
        let changed = external.release_date != existing.release_date;
        (
            BrowserRelease {
                release_date: external.release_date,
                ..existing
            },
            changed,
        )
    }

    fn upsert_mutation(&self, entity: &BrowserRelease) -> Mutation {
        Mutation::insert_or_update(TABLE)
            .key("BrowserName", entity.browser_name.as_str())
            .key("BrowserVersion", entity.browser_version.as_str())
            .set("ReleaseDate", entity.release_date)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct BrowserReleaseCursor {
    last_release_date: DateTime<Utc>,
    last_browser_name: String,
    last_browser_version: String,
}

impl Client {
    pub async fn upsert_browser_release(
        &self,
        release: &BrowserRelease,
    ) -> Result<WriteAction, StorageError> {
        let outcome = EntityWriter::new(BrowserReleaseMapper)
            .upsert(self, release)
            .await?;
        Ok(outcome.action)
    }

    pub async fn get_browser_release(
        &self,
        browser_name: &str,
        browser_version: &str,
    ) -> Result<BrowserRelease, StorageError> {
        EntityReader::new(BrowserReleaseMapper)
            .read(self, &(browser_name.to_string(), browser_version.to_string()))
            .await
    }

    /// Lists releases newest first; ties by browser name then version.
    pub async fn list_browser_releases_paged(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page<BrowserRelease>, StorageError> {
        let cursor: Option<BrowserReleaseCursor> = decode_page_token(page_token)?;
        let (page_size, limit) = page_limit(page_size);
        const ORDER: &str = "ORDER BY ReleaseDate DESC, BrowserName, BrowserVersion LIMIT @limit";

        let stmt = match cursor {
            Some(cursor) => Statement::new(format!(
                "{SELECT_COLUMNS}
                 WHERE ReleaseDate < @last_date
                    OR (ReleaseDate = @last_date AND BrowserName > @last_name)
                    OR (ReleaseDate = @last_date AND BrowserName = @last_name
                        AND BrowserVersion > @last_version)
                 {ORDER}"
            ))
            .bind("last_date", cursor.last_release_date)
            .bind("last_name", cursor.last_browser_name)
            .bind("last_version", cursor.last_browser_version),
            None => Statement::new(format!("{SELECT_COLUMNS} {ORDER}")),
        }
        .bind("limit", limit);

        let releases: Vec<BrowserRelease> = self
            .read_only(|txn| txn.query(&stmt))
            .await
            .map_err(|e| e.in_operation("list browser releases"))?;
        Page::from_rows(releases, page_size, |last| BrowserReleaseCursor {
            last_release_date: last.release_date,
            last_browser_name: last.browser_name.clone(),
            last_browser_version: last.browser_version.clone(),
        })
    }
}
