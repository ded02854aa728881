//! The `BrowserFeatureAvailabilities` table: the browser release in which
//! each browser first shipped each feature.
//!
//! Callers address rows by (feature key, browser name). The stored row
//! holds the feature's internal ID, so writes resolve the key first and
//! fail with [`StorageError::ReferenceNotFound`] for an unknown feature or
//! release.

use webstatus_core::BrowserFeatureAvailability;

use crate::client::{Client, ReadContext, ReadWriteTxn};
use crate::error::StorageError;
use crate::mapper::{DeleteMapper, ReadMapper, SyncMapper, WriteMapper};
use crate::mutation::Mutation;
use crate::sync::{EntitySynchronizer, SyncSummary};
use crate::tables::web_features::resolve_feature_id;
use crate::value::{FromRow, Statement};
use crate::writer::{EntityWriter, WriteAction};

const TABLE: &str = "BrowserFeatureAvailabilities";

const SELECT_COLUMNS: &str = "SELECT a.WebFeatureID, wf.FeatureKey, a.BrowserName, a.BrowserVersion
     FROM BrowserFeatureAvailabilities a
     JOIN WebFeatures wf ON wf.ID = a.WebFeatureID";

#[derive(Debug, Clone, PartialEq)]
struct StoredAvailability {
    web_feature_id: String,
    feature_key: String,
    browser_name: String,
    browser_version: String,
}

impl FromRow for StoredAvailability {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredAvailability {
            web_feature_id: row.get(0)?,
            feature_key: row.get(1)?,
            browser_name: row.get(2)?,
            browser_version: row.get(3)?,
        })
    }
}

impl From<StoredAvailability> for BrowserFeatureAvailability {
    fn from(stored: StoredAvailability) -> Self {
        BrowserFeatureAvailability {
            browser_name: stored.browser_name,
            browser_version: stored.browser_version,
            feature_key: stored.feature_key,
        }
    }
}

fn ensure_release_exists(
    ctx: &impl ReadContext,
    browser_name: &str,
    browser_version: &str,
) -> Result<(), StorageError> {
    let stmt = Statement::new(
        "SELECT COUNT(*) FROM BrowserReleases
         WHERE BrowserName = @browser_name AND BrowserVersion = @browser_version",
    )
    .bind("browser_name", browser_name)
    .bind("browser_version", browser_version);
    if ctx.query_one::<i64>(&stmt)? == 0 {
        return Err(StorageError::ReferenceNotFound {
            table: "BrowserReleases",
            key: format!("{browser_name} {browser_version}"),
        });
    }
    Ok(())
}

struct AvailabilityMapper;

impl ReadMapper for AvailabilityMapper {
    /// (feature key, browser name)
    type Key = (String, String);
    type Internal = StoredAvailability;

    fn table(&self) -> &'static str {
        TABLE
    }

    fn select_one(&self, (feature_key, browser_name): &(String, String)) -> Statement {
        Statement::new(format!(
            "{SELECT_COLUMNS} WHERE wf.FeatureKey = @feature_key AND a.BrowserName = @browser_name"
        ))
        .bind("feature_key", feature_key.as_str())
        .bind("browser_name", browser_name.as_str())
    }
}

impl WriteMapper for AvailabilityMapper {
    type External = BrowserFeatureAvailability;

    fn key_from_external(&self, external: &BrowserFeatureAvailability) -> (String, String) {
        (external.feature_key.clone(), external.browser_name.clone())
    }

    fn new_entity(
        &self,
        txn: &ReadWriteTxn<'_>,
        external: &BrowserFeatureAvailability,
    ) -> Result<StoredAvailability, StorageError> {
        let web_feature_id = resolve_feature_id(txn, &external.feature_key)?;
        self.resolve_references(txn, external)?;
        Ok(StoredAvailability {
            web_feature_id,
            feature_key: external.feature_key.clone(),
            browser_name: external.browser_name.clone(),
            browser_version: external.browser_version.clone(),
        })
    }

    fn resolve_references(
        &self,
        txn: &ReadWriteTxn<'_>,
        external: &BrowserFeatureAvailability,
    ) -> Result<(), StorageError> {
        ensure_release_exists(txn, &external.browser_name, &external.browser_version)
    }

    fn merge_and_check_changed(
        &self,
        external: &BrowserFeatureAvailability,
        mut existing: StoredAvailability,
    ) -> (StoredAvailability, bool) {
        let changed = external.browser_version != existing.browser_version;
        existing.browser_version = external.browser_version.clone();
        (existing, changed)
    }

    fn upsert_mutation(&self, entity: &StoredAvailability) -> Mutation {
        Mutation::insert_or_update(TABLE)
            .key("WebFeatureID", entity.web_feature_id.as_str())
            .key("BrowserName", entity.browser_name.as_str())
            .set("BrowserVersion", entity.browser_version.as_str())
    }
}

impl DeleteMapper for AvailabilityMapper {
    fn delete_mutation(&self, entity: &StoredAvailability) -> Mutation {
        Mutation::delete(TABLE)
            .key("WebFeatureID", entity.web_feature_id.as_str())
            .key("BrowserName", entity.browser_name.as_str())
    }
}

impl SyncMapper for AvailabilityMapper {
    fn key_from_internal(&self, internal: &StoredAvailability) -> (String, String) {
        (internal.feature_key.clone(), internal.browser_name.clone())
    }

    fn select_all(&self) -> Statement {
        Statement::new(format!("{SELECT_COLUMNS} ORDER BY wf.FeatureKey, a.BrowserName"))
    }
}

impl Client {
    /// Records that `availability.browser_name` shipped the feature in
    /// `availability.browser_version`. Both the feature and the release
    /// must already exist.
    pub async fn upsert_browser_feature_availability(
        &self,
        availability: &BrowserFeatureAvailability,
    ) -> Result<WriteAction, StorageError> {
        let outcome = EntityWriter::new(AvailabilityMapper)
            .upsert(self, availability)
            .await?;
        Ok(outcome.action)
    }

    /// Makes the stored availabilities exactly `availabilities`. Any
    /// unresolvable feature or release aborts the whole sync.
    pub async fn sync_browser_feature_availabilities(
        &self,
        availabilities: &[BrowserFeatureAvailability],
    ) -> Result<SyncSummary, StorageError> {
        EntitySynchronizer::new(AvailabilityMapper)
            .sync(self, availabilities)
            .await
    }

    /// Availabilities of one feature, ordered by browser name.
    pub async fn list_availabilities_for_feature(
        &self,
        feature_key: &str,
    ) -> Result<Vec<BrowserFeatureAvailability>, StorageError> {
        let stmt = Statement::new(format!(
            "{SELECT_COLUMNS} WHERE wf.FeatureKey = @feature_key ORDER BY a.BrowserName"
        ))
        .bind("feature_key", feature_key);
        let rows: Vec<StoredAvailability> = self
            .read_only(|txn| txn.query(&stmt))
            .await
            .map_err(|e| e.in_operation("list availabilities for feature"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
