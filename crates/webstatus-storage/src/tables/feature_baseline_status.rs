//! The `FeatureBaselineStatus` table and the cumulative baseline counts
//! derived from it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use webstatus_core::{BaselineStatus, BaselineStatusCount, FeatureBaselineStatus};

use crate::client::{Client, ReadContext, ReadWriteTxn};
use crate::cursor::{decode_page_token, page_limit, Page};
use crate::error::StorageError;
use crate::mapper::{ReadMapper, WriteMapper};
use crate::mutation::Mutation;
use crate::reader::EntityReader;
use crate::tables::web_features::resolve_feature_id;
use crate::value::{get_date, get_optional_date, get_optional_parsed, FromRow, Statement};
use crate::writer::{EntityWriter, WriteAction};

const TABLE: &str = "FeatureBaselineStatus";

#[derive(Debug, Clone, PartialEq)]
struct StoredBaselineStatus {
    web_feature_id: String,
    feature_key: String,
    status: Option<BaselineStatus>,
    low_date: Option<NaiveDate>,
    high_date: Option<NaiveDate>,
}

impl FromRow for StoredBaselineStatus {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredBaselineStatus {
            web_feature_id: row.get(0)?,
            feature_key: row.get(1)?,
            status: get_optional_parsed(row, 2)?,
            low_date: get_optional_date(row, 3)?,
            high_date: get_optional_date(row, 4)?,
        })
    }
}

impl From<StoredBaselineStatus> for FeatureBaselineStatus {
    fn from(stored: StoredBaselineStatus) -> Self {
        FeatureBaselineStatus {
            feature_key: stored.feature_key,
            status: stored.status,
            low_date: stored.low_date,
            high_date: stored.high_date,
        }
    }
}

struct BaselineStatusMapper;

impl ReadMapper for BaselineStatusMapper {
    type Key = String;
    type Internal = StoredBaselineStatus;

    fn table(&self) -> &'static str {
        TABLE
    }

    fn select_one(&self, feature_key: &String) -> Statement {
        Statement::new(
            "SELECT s.WebFeatureID, wf.FeatureKey, s.Status, s.LowDate, s.HighDate
             FROM FeatureBaselineStatus s
             JOIN WebFeatures wf ON wf.ID = s.WebFeatureID
             WHERE wf.FeatureKey = @feature_key",
        )
        .bind("feature_key", feature_key.as_str())
    }
}

impl WriteMapper for BaselineStatusMapper {
    type External = FeatureBaselineStatus;

    fn key_from_external(&self, external: &FeatureBaselineStatus) -> String {
        external.feature_key.clone()
    }

    fn new_entity(
        &self,
        txn: &ReadWriteTxn<'_>,
        external: &FeatureBaselineStatus,
    ) -> Result<StoredBaselineStatus, StorageError> {
        Ok(StoredBaselineStatus {
            web_feature_id: resolve_feature_id(txn, &external.feature_key)?,
            feature_key: external.feature_key.clone(),
            status: external.status,
            low_date: external.low_date,
            high_date: external.high_date,
        })
    }

    // Every field is authoritative, including clearing to None.
    fn merge_and_check_changed(
        &self,
        external: &FeatureBaselineStatus,
        existing: StoredBaselineStatus,
    ) -> (StoredBaselineStatus, bool) {
        let merged = StoredBaselineStatus {
            status: external.status,
            low_date: external.low_date,
            high_date: external.high_date,
            ..existing.clone()
        };
        let changed = merged != existing;
        (merged, changed)
    }

    fn upsert_mutation(&self, entity: &StoredBaselineStatus) -> Mutation {
        Mutation::insert_or_update(TABLE)
            .key("WebFeatureID", entity.web_feature_id.as_str())
            .set("Status", entity.status.map(|s| s.as_str()))
            .set("LowDate", entity.low_date)
            .set("HighDate", entity.high_date)
    }
}

/// A distinct low date and how many features reached it.
struct LowDateCount {
    date: NaiveDate,
    count: i64,
}

impl FromRow for LowDateCount {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(LowDateCount {
            date: get_date(row, 0)?,
            count: row.get(1)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct BaselineCountCursor {
    last_date: NaiveDate,
    last_cumulative_count: i64,
}

impl Client {
    pub async fn upsert_feature_baseline_status(
        &self,
        status: &FeatureBaselineStatus,
    ) -> Result<WriteAction, StorageError> {
        let outcome = EntityWriter::new(BaselineStatusMapper)
            .upsert(self, status)
            .await?;
        Ok(outcome.action)
    }

    pub async fn get_feature_baseline_status(
        &self,
        feature_key: &str,
    ) -> Result<FeatureBaselineStatus, StorageError> {
        let stored = EntityReader::new(BaselineStatusMapper)
            .read(self, &feature_key.to_string())
            .await?;
        Ok(stored.into())
    }

    /// Cumulative count of features that reached baseline low, one entry
    /// per distinct low date in `[start, end)`, oldest first.
    ///
    /// The first entry already includes every feature whose low date is
    /// before `start`. The running total is carried in the page token.
    pub async fn list_baseline_status_counts_paged(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page<BaselineStatusCount>, StorageError> {
        let cursor: Option<BaselineCountCursor> = decode_page_token(page_token)?;
        let (page_size, limit) = page_limit(page_size);

        let (counts, initial) = self
            .read_only(|txn| {
                let (lower_bound, initial) = match &cursor {
                    Some(cursor) => (
                        "LowDate > @last_date",
                        cursor.last_cumulative_count,
                    ),
                    None => {
                        let before = Statement::new(
                            "SELECT COUNT(*) FROM FeatureBaselineStatus
                             WHERE LowDate IS NOT NULL AND LowDate < @start",
                        )
                        .bind("start", start);
                        ("LowDate >= @start", txn.query_one::<i64>(&before)?)
                    }
                };

                let mut stmt = Statement::new(format!(
                    "SELECT LowDate, COUNT(*) FROM FeatureBaselineStatus
                     WHERE LowDate IS NOT NULL AND {lower_bound} AND LowDate < @end
                     GROUP BY LowDate
                     ORDER BY LowDate
                     LIMIT @limit"
                ))
                .bind("end", end)
                .bind("limit", limit);
                stmt = match &cursor {
                    Some(cursor) => stmt.bind("last_date", cursor.last_date),
                    None => stmt.bind("start", start),
                };

                let counts: Vec<LowDateCount> = txn.query(&stmt)?;
                Ok((counts, initial))
            })
            .await
            .map_err(|e| e.in_operation("list baseline status counts"))?;

        let mut cumulative = initial;
        let items = counts
            .into_iter()
            .map(|row| {
                cumulative += row.count;
                BaselineStatusCount {
                    date: row.date,
                    cumulative_count: cumulative,
                }
            })
            .collect();

        Page::from_rows(items, page_size, |last| BaselineCountCursor {
            last_date: last.date,
            last_cumulative_count: last.cumulative_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webstatus_core::WebFeature;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn low(feature_key: &str, low_date: NaiveDate) -> FeatureBaselineStatus {
        FeatureBaselineStatus {
            feature_key: feature_key.to_string(),
            status: Some(BaselineStatus::Low),
            low_date: Some(low_date),
            high_date: None,
        }
    }

    async fn client_with_features(keys: &[&str]) -> Client {
        let client = Client::in_memory().unwrap();
        for key in keys {
            client
                .upsert_web_feature(&WebFeature::new(*key, *key, ""))
                .await
                .unwrap();
        }
        client
    }

    #[tokio::test]
    async fn status_fields_overwrite_including_clears() {
        let client = client_with_features(&["grid"]).await;
        client
            .upsert_feature_baseline_status(&low("grid", date(1, 1)))
            .await
            .unwrap();
        let cleared = FeatureBaselineStatus {
            feature_key: "grid".into(),
            status: Some(BaselineStatus::None),
            low_date: None,
            high_date: None,
        };
        let action = client.upsert_feature_baseline_status(&cleared).await.unwrap();
        assert_eq!(action, WriteAction::Updated);
        assert_eq!(client.get_feature_baseline_status("grid").await.unwrap(), cleared);
        assert_eq!(
            client.upsert_feature_baseline_status(&cleared).await.unwrap(),
            WriteAction::Unchanged
        );
    }

    #[tokio::test]
    async fn counts_carry_running_total_across_pages() {
        let client = client_with_features(&["a", "b", "c", "d", "e"]).await;
        for (key, d) in [
            ("a", date(1, 1)),
            ("b", date(2, 1)),
            ("c", date(2, 1)),
            ("d", date(3, 1)),
            ("e", date(4, 1)),
        ] {
            client.upsert_feature_baseline_status(&low(key, d)).await.unwrap();
        }

        let first = client
            .list_baseline_status_counts_paged(date(2, 1), date(5, 1), 2, None)
            .await
            .unwrap();
        assert_eq!(
            first.items,
            vec![
                BaselineStatusCount { date: date(2, 1), cumulative_count: 3 },
                BaselineStatusCount { date: date(3, 1), cumulative_count: 4 },
            ]
        );

        let second = client
            .list_baseline_status_counts_paged(
                date(2, 1),
                date(5, 1),
                2,
                first.next_page_token.as_deref(),
            )
            .await
            .unwrap();
        assert_eq!(
            second.items,
            vec![BaselineStatusCount { date: date(4, 1), cumulative_count: 5 }]
        );
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn garbage_token_is_invalid_cursor() {
        let client = client_with_features(&[]).await;
        let err = client
            .list_baseline_status_counts_paged(date(1, 1), date(2, 1), 10, Some("%%%"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidCursorFormat(_)));
    }
}
