//! Daily Chromium use-counter rates per feature, plus the pointer to each
//! feature's most recent day.

use chrono::NaiveDate;
use webstatus_core::{DailyChromiumHistogramMetric, HistogramName};

use crate::client::{Client, ReadContext};
use crate::error::StorageError;
use crate::latest::should_replace_latest;
use crate::mutation::Mutation;
use crate::tables::web_features::resolve_feature_id;
use crate::value::{get_date, FromRow, Statement};

const DAILY_TABLE: &str = "DailyChromiumHistogramMetrics";
const LATEST_TABLE: &str = "LatestDailyChromiumHistogramMetrics";

impl FromRow for DailyChromiumHistogramMetric {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(DailyChromiumHistogramMetric {
            day: get_date(row, 0)?,
            rate: row.get(1)?,
        })
    }
}

struct LatestDay(NaiveDate);

impl FromRow for LatestDay {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(LatestDay(get_date(row, 0)?))
    }
}

impl Client {
    /// Stores the rate of `feature_key` for `metric.day`, overwriting any
    /// rate already stored for that day, and advances the feature's latest
    /// day if `metric.day` is newer.
    pub async fn upsert_daily_chromium_histogram_metric(
        &self,
        histogram: HistogramName,
        feature_key: &str,
        metric: &DailyChromiumHistogramMetric,
    ) -> Result<(), StorageError> {
        self.read_write(|txn| {
            let feature_id = resolve_feature_id(txn, feature_key)?;
            txn.buffer(
                Mutation::insert_or_update(DAILY_TABLE)
                    .key("WebFeatureID", feature_id.as_str())
                    .key("HistogramName", histogram.as_str())
                    .key("Day", metric.day)
                    .set("Rate", metric.rate),
            );

            let current: Option<LatestDay> = txn.query_optional(
                &Statement::new(
                    "SELECT Day FROM LatestDailyChromiumHistogramMetrics
                     WHERE WebFeatureID = @feature_id AND HistogramName = @histogram",
                )
                .bind("feature_id", feature_id.as_str())
                .bind("histogram", histogram.as_str()),
            )?;
            if should_replace_latest(current.as_ref().map(|c| &c.0), &metric.day) {
                txn.buffer(
                    Mutation::insert_or_update(LATEST_TABLE)
                        .key("WebFeatureID", feature_id.as_str())
                        .key("HistogramName", histogram.as_str())
                        .set("Day", metric.day),
                );
            }
            Ok(())
        })
        .await
    }

    /// The metric for the most recent day recorded for `feature_key`.
    pub async fn get_latest_daily_chromium_histogram_metric(
        &self,
        histogram: HistogramName,
        feature_key: &str,
    ) -> Result<DailyChromiumHistogramMetric, StorageError> {
        let stmt = Statement::new(
            "SELECT d.Day, d.Rate
             FROM LatestDailyChromiumHistogramMetrics l
             JOIN WebFeatures wf ON wf.ID = l.WebFeatureID
             JOIN DailyChromiumHistogramMetrics d
               ON d.WebFeatureID = l.WebFeatureID
              AND d.HistogramName = l.HistogramName
              AND d.Day = l.Day
             WHERE wf.FeatureKey = @feature_key AND l.HistogramName = @histogram",
        )
        .bind("feature_key", feature_key)
        .bind("histogram", histogram.as_str());
        self.read_only(|txn| txn.query_one(&stmt)).await
    }
}
