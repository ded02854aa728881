//! web-platform-tests runs and per-feature run metrics.
//!
//! Runs are addressed by their external run ID. Metrics are stored per
//! (run, feature) with the run's start time, browser and channel copied in,
//! and `LatestWPTRunFeatureMetrics` points at the newest run per
//! (feature, browser, channel).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webstatus_core::{WptRun, WptRunFeatureMetric, WptRunFeatureMetricWithTime};

use crate::client::{Client, ReadContext, ReadWriteTxn};
use crate::cursor::{decode_page_token, page_limit, Page};
use crate::error::StorageError;
use crate::latest::should_replace_latest;
use crate::mapper::{ReadMapper, WriteMapper};
use crate::mutation::Mutation;
use crate::reader::EntityReader;
use crate::tables::web_features::resolve_feature_id;
use crate::value::{get_timestamp, FromRow, Statement};
use crate::writer::{EntityWriter, WriteAction};

const RUNS_TABLE: &str = "WPTRuns";
const METRICS_TABLE: &str = "WPTRunFeatureMetrics";
const LATEST_TABLE: &str = "LatestWPTRunFeatureMetrics";

#[derive(Debug, Clone, PartialEq)]
struct StoredWptRun {
    id: String,
    run: WptRun,
}

impl FromRow for StoredWptRun {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredWptRun {
            id: row.get(0)?,
            run: WptRun {
                run_id: row.get(1)?,
                time_start: get_timestamp(row, 2)?,
                time_end: get_timestamp(row, 3)?,
                browser_name: row.get(4)?,
                browser_version: row.get(5)?,
                channel: row.get(6)?,
                os_name: row.get(7)?,
                os_version: row.get(8)?,
                full_revision_hash: row.get(9)?,
            },
        })
    }
}

struct WptRunMapper;

impl ReadMapper for WptRunMapper {
    type Key = i64;
    type Internal = StoredWptRun;

    fn table(&self) -> &'static str {
        RUNS_TABLE
    }

    fn select_one(&self, run_id: &i64) -> Statement {
        Statement::new(
            "SELECT ID, ExternalRunID, TimeStart, TimeEnd, BrowserName, BrowserVersion,
                    Channel, OSName, OSVersion, FullRevisionHash
             FROM WPTRuns WHERE ExternalRunID = @run_id",
        )
        .bind("run_id", *run_id)
    }
}

impl WriteMapper for WptRunMapper {
    type External = WptRun;

    fn key_from_external(&self, external: &WptRun) -> i64 {
        external.run_id
    }

    fn new_entity(&self, _txn: &ReadWriteTxn<'_>, external: &WptRun) -> Result<StoredWptRun, StorageError> {
        Ok(StoredWptRun {
            id: Uuid::new_v4().to_string(),
            run: external.clone(),
        })
    }

    fn merge_and_check_changed(&self, external: &WptRun, existing: StoredWptRun) -> (StoredWptRun, bool) {
        let changed = *external != existing.run;
        (
            StoredWptRun {
                id: existing.id,
                run: external.clone(),
            },
            changed,
        )
    }

    fn upsert_mutation(&self, entity: &StoredWptRun) -> Mutation {
        let run = &entity.run;
        Mutation::insert_or_update(RUNS_TABLE)
            .key("ID", entity.id.as_str())
            .set("ExternalRunID", run.run_id)
            .set("TimeStart", run.time_start)
            .set("TimeEnd", run.time_end)
            .set("BrowserName", run.browser_name.as_str())
            .set("BrowserVersion", run.browser_version.as_str())
            .set("Channel", run.channel.as_str())
            .set("OSName", run.os_name.as_str())
            .set("OSVersion", run.os_version.as_str())
            .set("FullRevisionHash", run.full_revision_hash.as_str())
    }
}

impl FromRow for WptRunFeatureMetricWithTime {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(WptRunFeatureMetricWithTime {
            time_start: get_timestamp(row, 0)?,
            run_id: row.get(1)?,
            metric: WptRunFeatureMetric {
                total_tests: row.get(2)?,
                test_pass: row.get(3)?,
                total_subtests: row.get(4)?,
                subtest_pass: row.get(5)?,
            },
        })
    }
}

/// `TimeStart` of the current latest pointer.
struct LatestPointer(DateTime<Utc>);

impl FromRow for LatestPointer {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(LatestPointer(get_timestamp(row, 0)?))
    }
}

/// Metric rows copy their run's `TimeStart`, `BrowserName` and `Channel`.
fn ensure_metric_copies_match(txn: &ReadWriteTxn<'_>, run: &WptRun) -> Result<(), StorageError> {
    let stmt = Statement::new(
        "SELECT COUNT(*) FROM WPTRunFeatureMetrics
         WHERE ExternalRunID = @run_id
           AND (TimeStart <> @time_start OR BrowserName <> @browser_name OR Channel <> @channel)",
    )
    .bind("run_id", run.run_id)
    .bind("time_start", run.time_start)
    .bind("browser_name", run.browser_name.as_str())
    .bind("channel", run.channel.as_str());
    if txn.query_one::<i64>(&stmt)? > 0 {
        return Err(StorageError::InvalidArgument(format!(
            "wpt run {} already has metrics; its start time, browser and channel cannot change",
            run.run_id
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WptMetricCursor {
    last_time_start: DateTime<Utc>,
    last_run_id: i64,
}

const METRIC_COLUMNS: &str = "m.TimeStart, m.ExternalRunID, m.TotalTests, m.TestPass,
     m.TotalSubtests, m.SubtestPass";

impl Client {
    /// Inserts or updates a run. Once metrics reference the run its start
    /// time, browser and channel are fixed, and changing them is
    /// [`StorageError::InvalidArgument`].
    pub async fn upsert_wpt_run(&self, run: &WptRun) -> Result<WriteAction, StorageError> {
        let writer = EntityWriter::new(WptRunMapper);
        self.read_write(|txn| {
            ensure_metric_copies_match(txn, run)?;
            Ok(writer.upsert_in(txn, run)?.action)
        })
        .await
    }

    pub async fn get_wpt_run(&self, run_id: i64) -> Result<WptRun, StorageError> {
        let stored = EntityReader::new(WptRunMapper).read(self, &run_id).await?;
        Ok(stored.run)
    }

    /// Writes the metrics of run `run_id`, keyed by feature key, and moves
    /// each feature's latest pointer to this run when the run is newer.
    ///
    /// The run and every feature must exist; otherwise nothing is written.
    pub async fn upsert_wpt_run_feature_metrics(
        &self,
        run_id: i64,
        metrics: &BTreeMap<String, WptRunFeatureMetric>,
    ) -> Result<(), StorageError> {
        self.read_write(|txn| {
            let stored = EntityReader::new(WptRunMapper)
                .read_by_key(txn, &run_id)
                .map_err(|e| match e {
                    StorageError::QueryReturnedNoResults => StorageError::ReferenceNotFound {
                        table: RUNS_TABLE,
                        key: run_id.to_string(),
                    },
                    other => other,
                })?;
            let run = &stored.run;

            for (feature_key, metric) in metrics {
                let feature_id = resolve_feature_id(txn, feature_key)?;
                txn.buffer(
                    Mutation::insert_or_update(METRICS_TABLE)
                        .key("ID", stored.id.as_str())
                        .key("WebFeatureID", feature_id.as_str())
                        .set("ExternalRunID", run.run_id)
                        .set("TimeStart", run.time_start)
                        .set("BrowserName", run.browser_name.as_str())
                        .set("Channel", run.channel.as_str())
                        .set("TotalTests", metric.total_tests)
                        .set("TestPass", metric.test_pass)
                        .set("TotalSubtests", metric.total_subtests)
                        .set("SubtestPass", metric.subtest_pass),
                );

                let current: Option<LatestPointer> = txn.query_optional(
                    &Statement::new(
                        "SELECT TimeStart FROM LatestWPTRunFeatureMetrics
                         WHERE WebFeatureID = @feature_id
                           AND BrowserName = @browser_name AND Channel = @channel",
                    )
                    .bind("feature_id", feature_id.as_str())
                    .bind("browser_name", run.browser_name.as_str())
                    .bind("channel", run.channel.as_str()),
                )?;
                let current = current.map(|pointer| pointer.0);
                if should_replace_latest(current.as_ref(), &run.time_start) {
                    txn.buffer(
                        Mutation::insert_or_update(LATEST_TABLE)
                            .key("WebFeatureID", feature_id.as_str())
                            .key("BrowserName", run.browser_name.as_str())
                            .key("Channel", run.channel.as_str())
                            .set("RunMetricID", stored.id.as_str())
                            .set("TimeStart", run.time_start),
                    );
                }
            }
            tracing::debug!(run_id, features = metrics.len(), "staged wpt run metrics");
            Ok(())
        })
        .await
    }

    /// The metric of the newest run for (feature, browser, channel).
    pub async fn get_latest_wpt_run_feature_metric(
        &self,
        feature_key: &str,
        browser_name: &str,
        channel: &str,
    ) -> Result<WptRunFeatureMetricWithTime, StorageError> {
        let stmt = Statement::new(format!(
            "SELECT {METRIC_COLUMNS}
             FROM LatestWPTRunFeatureMetrics l
             JOIN WebFeatures wf ON wf.ID = l.WebFeatureID
             JOIN WPTRunFeatureMetrics m
               ON m.ID = l.RunMetricID AND m.WebFeatureID = l.WebFeatureID
             WHERE wf.FeatureKey = @feature_key
               AND l.BrowserName = @browser_name AND l.Channel = @channel"
        ))
        .bind("feature_key", feature_key)
        .bind("browser_name", browser_name)
        .bind("channel", channel);
        self.read_only(|txn| txn.query_one(&stmt)).await
    }

    /// Metrics for one feature on one browser and channel with run start in
    /// `[start_at, end_at)`, newest first; ties by external run ID
    /// descending.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_metrics_for_feature_paged(
        &self,
        feature_key: &str,
        browser_name: &str,
        channel: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page<WptRunFeatureMetricWithTime>, StorageError> {
        let cursor: Option<WptMetricCursor> = decode_page_token(page_token)?;
        let (page_size, limit) = page_limit(page_size);

        let seek = if cursor.is_some() {
            "AND (m.TimeStart < @last_time_start
                  OR (m.TimeStart = @last_time_start AND m.ExternalRunID < @last_run_id))"
        } else {
            ""
        };
        let mut stmt = Statement::new(format!(
            "SELECT {METRIC_COLUMNS}
             FROM WPTRunFeatureMetrics m
             JOIN WebFeatures wf ON wf.ID = m.WebFeatureID
             WHERE wf.FeatureKey = @feature_key
               AND m.BrowserName = @browser_name AND m.Channel = @channel
               AND m.TimeStart >= @start_at AND m.TimeStart < @end_at
               {seek}
             ORDER BY m.TimeStart DESC, m.ExternalRunID DESC
             LIMIT @limit"
        ))
        .bind("feature_key", feature_key)
        .bind("browser_name", browser_name)
        .bind("channel", channel)
        .bind("start_at", start_at)
        .bind("end_at", end_at)
        .bind("limit", limit);
        if let Some(cursor) = &cursor {
            stmt = stmt
                .bind("last_time_start", cursor.last_time_start)
                .bind("last_run_id", cursor.last_run_id);
        }

        let items: Vec<WptRunFeatureMetricWithTime> = self
            .read_only(|txn| txn.query(&stmt))
            .await
            .map_err(|e| e.in_operation("list wpt metrics for feature"))?;
        Page::from_rows(items, page_size, |last| WptMetricCursor {
            last_time_start: last.time_start,
            last_run_id: last.run_id,
        })
    }
}
