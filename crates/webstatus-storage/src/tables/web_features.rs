//! The `WebFeatures` table.
//!
//! Features are addressed by their feature key. The generated `ID` column
//! is what every dependent table references, and it never leaves this
//! crate except through [`Client::get_web_feature_id_by_key`].
//!
//! Dependent rows are not cascaded by the schema. Deleting a feature
//! (directly or by sync) clears the `Latest*` pointer rows first, then the
//! per-feature rows in every child table, then the feature itself.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webstatus_core::WebFeature;

use crate::client::{Client, ReadContext, ReadWriteTxn};
use crate::cursor::{decode_page_token, page_limit, Page};
use crate::error::StorageError;
use crate::mapper::{DeleteMapper, IdentifiedEntity, ReadMapper, SyncMapper, WriteMapper};
use crate::mutation::Mutation;
use crate::reader::EntityReader;
use crate::sync::{EntitySynchronizer, SyncSummary};
use crate::value::{FromRow, Statement};
use crate::writer::{EntityWriter, WriteAction};

const TABLE: &str = "WebFeatures";

/// Pointer tables whose rows reference per-feature child rows.
const POINTER_TABLES: [&str; 2] = [
    "LatestWPTRunFeatureMetrics",
    "LatestDailyChromiumHistogramMetrics",
];

/// Tables holding per-feature rows keyed by `WebFeatureID`.
const CHILD_TABLES: [&str; 5] = [
    "FeatureBaselineStatus",
    "BrowserFeatureAvailabilities",
    "FeatureSupportEvents",
    "DailyChromiumHistogramMetrics",
    "WPTRunFeatureMetrics",
];

const SELECT_COLUMNS: &str = "SELECT ID, FeatureKey, Name, Description FROM WebFeatures";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredWebFeature {
    id: String,
    feature_key: String,
    name: String,
    description: String,
}

impl FromRow for StoredWebFeature {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredWebFeature {
            id: row.get(0)?,
            feature_key: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
        })
    }
}

impl IdentifiedEntity for StoredWebFeature {
    fn internal_id(&self) -> &str {
        &self.id
    }
}

impl From<StoredWebFeature> for WebFeature {
    fn from(stored: StoredWebFeature) -> Self {
        WebFeature {
            feature_key: stored.feature_key,
            name: stored.name,
            description: stored.description,
        }
    }
}

struct WebFeatureMapper;

impl ReadMapper for WebFeatureMapper {
    type Key = String;
    type Internal = StoredWebFeature;

    fn table(&self) -> &'static str {
        TABLE
    }

    fn select_one(&self, key: &String) -> Statement {
        Statement::new(format!("{SELECT_COLUMNS} WHERE FeatureKey = @feature_key"))
            .bind("feature_key", key.as_str())
    }
}

impl WriteMapper for WebFeatureMapper {
    type External = WebFeature;

    fn key_from_external(&self, external: &WebFeature) -> String {
        external.feature_key.clone()
    }

    fn new_entity(
        &self,
        _txn: &ReadWriteTxn<'_>,
        external: &WebFeature,
    ) -> Result<StoredWebFeature, StorageError> {
        Ok(StoredWebFeature {
            id: Uuid::new_v4().to_string(),
            feature_key: external.feature_key.clone(),
            name: external.name.clone(),
            description: external.description.clone(),
        })
    }

    // Empty strings keep the stored value.
    fn merge_and_check_changed(
        &self,
        external: &WebFeature,
        mut existing: StoredWebFeature,
    ) -> (StoredWebFeature, bool) {
        let mut changed = false;
        if !external.name.is_empty() && external.name != existing.name {
            existing.name = external.name.clone();
            changed = true;
        }
        if !external.description.is_empty() && external.description != existing.description {
            existing.description = external.description.clone();
            changed = true;
        }
        (existing, changed)
    }

    fn upsert_mutation(&self, entity: &StoredWebFeature) -> Mutation {
        Mutation::insert_or_update(TABLE)
            .key("ID", entity.id.as_str())
            .set("FeatureKey", entity.feature_key.as_str())
            .set("Name", entity.name.as_str())
            .set("Description", entity.description.as_str())
            .set_commit_timestamp("UpdatedAt")
    }
}

impl DeleteMapper for WebFeatureMapper {
    fn delete_mutation(&self, entity: &StoredWebFeature) -> Mutation {
        Mutation::delete(TABLE).key("ID", entity.id.as_str())
    }

    fn pre_delete_hook(
        &self,
        _txn: &ReadWriteTxn<'_>,
        entity: &StoredWebFeature,
    ) -> Result<Vec<Mutation>, StorageError> {
        Ok(POINTER_TABLES
            .into_iter()
            .map(|table| Mutation::delete_matching(table).key("WebFeatureID", entity.id.as_str()))
            .collect())
    }

    fn child_delete_mutations(
        &self,
        _txn: &ReadWriteTxn<'_>,
        entity: &StoredWebFeature,
    ) -> Result<Vec<Mutation>, StorageError> {
        Ok(CHILD_TABLES
            .into_iter()
            .map(|table| Mutation::delete_matching(table).key("WebFeatureID", entity.id.as_str()))
            .collect())
    }
}

impl SyncMapper for WebFeatureMapper {
    fn key_from_internal(&self, internal: &StoredWebFeature) -> String {
        internal.feature_key.clone()
    }

    fn select_all(&self) -> Statement {
        Statement::new(format!("{SELECT_COLUMNS} ORDER BY FeatureKey"))
    }
}

/// Looks up the internal ID for `feature_key`, failing with
/// [`StorageError::ReferenceNotFound`] when the feature does not exist.
pub(crate) fn resolve_feature_id(
    ctx: &impl ReadContext,
    feature_key: &str,
) -> Result<String, StorageError> {
    let stmt = Statement::new("SELECT ID FROM WebFeatures WHERE FeatureKey = @feature_key")
        .bind("feature_key", feature_key);
    ctx.query_optional::<String>(&stmt)?
        .ok_or_else(|| StorageError::ReferenceNotFound {
            table: TABLE,
            key: feature_key.to_string(),
        })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WebFeatureCursor {
    last_feature_key: String,
}

impl Client {
    /// Inserts `feature`, or merges it into the stored feature with the
    /// same key. Empty name or description keep the stored values.
    pub async fn upsert_web_feature(&self, feature: &WebFeature) -> Result<WriteAction, StorageError> {
        let outcome = EntityWriter::new(WebFeatureMapper).upsert(self, feature).await?;
        Ok(outcome.action)
    }

    /// Like [`upsert_web_feature`](Self::upsert_web_feature) but returns the
    /// feature's internal ID.
    pub async fn upsert_web_feature_returning_id(
        &self,
        feature: &WebFeature,
    ) -> Result<String, StorageError> {
        EntityWriter::new(WebFeatureMapper)
            .upsert_returning_id(self, feature)
            .await
    }

    /// Makes the stored feature set exactly `features`. Removed features
    /// take all of their dependent rows with them.
    pub async fn sync_web_features(&self, features: &[WebFeature]) -> Result<SyncSummary, StorageError> {
        EntitySynchronizer::new(WebFeatureMapper)
            .sync(self, features)
            .await
    }

    pub async fn get_web_feature_by_key(&self, feature_key: &str) -> Result<WebFeature, StorageError> {
        let key = feature_key.to_string();
        let stored = EntityReader::new(WebFeatureMapper)
            .read(self, &key)
            .await?;
        Ok(stored.into())
    }

    pub async fn get_web_feature_id_by_key(&self, feature_key: &str) -> Result<String, StorageError> {
        let key = feature_key.to_string();
        let stored = EntityReader::new(WebFeatureMapper)
            .read(self, &key)
            .await?;
        Ok(stored.id)
    }

    /// Lists features ordered by feature key.
    pub async fn list_web_features_paged(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page<WebFeature>, StorageError> {
        let cursor: Option<WebFeatureCursor> = decode_page_token(page_token)?;
        let (page_size, limit) = page_limit(page_size);

        let stmt = match &cursor {
            Some(cursor) => Statement::new(format!(
                "{SELECT_COLUMNS} WHERE FeatureKey > @last_feature_key ORDER BY FeatureKey LIMIT @limit"
            ))
            .bind("last_feature_key", cursor.last_feature_key.as_str()),
            None => Statement::new(format!("{SELECT_COLUMNS} ORDER BY FeatureKey LIMIT @limit")),
        }
        .bind("limit", limit);

        let rows: Vec<StoredWebFeature> = self
            .read_only(|txn| txn.query(&stmt))
            .await
            .map_err(|e| e.in_operation("list web features"))?;
        let features: Vec<WebFeature> = rows.into_iter().map(WebFeature::from).collect();
        Page::from_rows(features, page_size, |last| WebFeatureCursor {
            last_feature_key: last.feature_key.clone(),
        })
    }

    /// Deletes the feature with `feature_key` and all of its dependent rows.
    pub async fn delete_web_feature(&self, feature_key: &str) -> Result<(), StorageError> {
        EntityWriter::new(WebFeatureMapper)
            .delete_by_key(self, &feature_key.to_string())
            .await
    }
}
