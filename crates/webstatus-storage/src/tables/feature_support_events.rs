//! The derived `FeatureSupportEvents` table.
//!
//! For every target browser, every release of any target browser in the
//! requested window, and every feature, one row records whether the target
//! browser supported the feature as of that release's date. The cross
//! product is streamed through a [`BatchWriter`] rather than materialized.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use webstatus_core::{FeatureSupportEvent, SupportStatus};

use crate::batch::BatchWriter;
use crate::client::{Client, ReadContext};
use crate::error::StorageError;
use crate::mutation::Mutation;
use crate::value::{get_parsed, get_timestamp, FromRow, Statement};

const TABLE: &str = "FeatureSupportEvents";

struct ReleaseEvent {
    browser_name: String,
    release_date: DateTime<Utc>,
}

impl FromRow for ReleaseEvent {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(ReleaseEvent {
            browser_name: row.get(0)?,
            release_date: get_timestamp(row, 1)?,
        })
    }
}

/// When a browser first shipped a feature.
struct ShippedAt {
    web_feature_id: String,
    browser_name: String,
    release_date: DateTime<Utc>,
}

impl FromRow for ShippedAt {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(ShippedAt {
            web_feature_id: row.get(0)?,
            browser_name: row.get(1)?,
            release_date: get_timestamp(row, 2)?,
        })
    }
}

#[derive(Debug)]
struct SupportEventRow {
    target_browser_name: String,
    event_browser_name: String,
    event_release_date: DateTime<Utc>,
    web_feature_id: String,
    support_status: SupportStatus,
}

fn event_mutation(row: &SupportEventRow) -> Mutation {
    Mutation::insert_or_update(TABLE)
        .key("TargetBrowserName", row.target_browser_name.as_str())
        .key("EventBrowserName", row.event_browser_name.as_str())
        .key("EventReleaseDate", row.event_release_date)
        .key("WebFeatureID", row.web_feature_id.as_str())
        .set("SupportStatus", row.support_status.as_str())
}

impl FromRow for FeatureSupportEvent {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(FeatureSupportEvent {
            target_browser_name: row.get(0)?,
            event_browser_name: row.get(1)?,
            event_release_date: get_timestamp(row, 2)?,
            feature_key: row.get(3)?,
            support_status: get_parsed(row, 4)?,
        })
    }
}

impl Client {
    /// Replaces every stored support event with the events for
    /// `target_browsers` over releases in `[start_at, end_at)`. Returns the
    /// number of events written.
    pub async fn precalculate_browser_feature_support_events(
        &self,
        target_browsers: &[String],
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        self.read_write(|txn| {
            txn.buffer(Mutation::delete_matching(TABLE));
            Ok(())
        })
        .await
        .map_err(|e| e.in_operation("clear feature support events"))?;

        let (feature_ids, releases, shipped) = self
            .read_only(|txn| {
                let feature_ids: Vec<String> =
                    txn.query(&Statement::new("SELECT ID FROM WebFeatures ORDER BY ID"))?;
                let releases: Vec<ReleaseEvent> = txn.query(
                    &Statement::new(
                        "SELECT BrowserName, ReleaseDate FROM BrowserReleases
                         WHERE ReleaseDate >= @start_at AND ReleaseDate < @end_at
                         ORDER BY ReleaseDate, BrowserName",
                    )
                    .bind("start_at", start_at)
                    .bind("end_at", end_at),
                )?;
                let shipped: Vec<ShippedAt> = txn.query(&Statement::new(
                    "SELECT a.WebFeatureID, a.BrowserName, r.ReleaseDate
                     FROM BrowserFeatureAvailabilities a
                     JOIN BrowserReleases r
                       ON r.BrowserName = a.BrowserName AND r.BrowserVersion = a.BrowserVersion",
                ))?;
                Ok((feature_ids, releases, shipped))
            })
            .await
            .map_err(|e| e.in_operation("read support event inputs"))?;

        let releases: Vec<ReleaseEvent> = releases
            .into_iter()
            .filter(|r| target_browsers.contains(&r.browser_name))
            .collect();
        let shipped: HashMap<(String, String), DateTime<Utc>> = shipped
            .into_iter()
            .map(|s| ((s.web_feature_id, s.browser_name), s.release_date))
            .collect();
        let targets = target_browsers.to_vec();

        tracing::info!(
            targets = targets.len(),
            releases = releases.len(),
            features = feature_ids.len(),
            "precalculating feature support events"
        );

        BatchWriter::from_config(self.config())
            .run(
                self,
                move |tx| async move {
                    for target in &targets {
                        for release in &releases {
                            for feature_id in &feature_ids {
                                let supported = shipped
                                    .get(&(feature_id.clone(), target.clone()))
                                    .is_some_and(|shipped_at| *shipped_at <= release.release_date);
                                let row = SupportEventRow {
                                    target_browser_name: target.clone(),
                                    event_browser_name: release.browser_name.clone(),
                                    event_release_date: release.release_date,
                                    web_feature_id: feature_id.clone(),
                                    support_status: if supported {
                                        SupportStatus::Supported
                                    } else {
                                        SupportStatus::Unsupported
                                    },
                                };
                                tx.send(row).await.map_err(|_| {
                                    StorageError::TaskFailure("support event consumer closed".into())
                                })?;
                            }
                        }
                    }
                    Ok(())
                },
                event_mutation,
            )
            .await
    }

    /// Support events for one target browser, ordered by event date,
    /// event browser and feature key.
    pub async fn list_feature_support_events(
        &self,
        target_browser_name: &str,
    ) -> Result<Vec<FeatureSupportEvent>, StorageError> {
        let stmt = Statement::new(
            "SELECT e.TargetBrowserName, e.EventBrowserName, e.EventReleaseDate,
                    wf.FeatureKey, e.SupportStatus
             FROM FeatureSupportEvents e
             JOIN WebFeatures wf ON wf.ID = e.WebFeatureID
             WHERE e.TargetBrowserName = @target
             ORDER BY e.EventReleaseDate, e.EventBrowserName, wf.FeatureKey",
        )
        .bind("target", target_browser_name);
        self.read_only(|txn| txn.query(&stmt))
            .await
            .map_err(|e| e.in_operation("list feature support events"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use webstatus_core::{BrowserFeatureAvailability, BrowserRelease, WebFeature};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    async fn seeded() -> Client {
        let client = Client::in_memory().unwrap();
        client
            .upsert_web_feature(&WebFeature::new("grid", "Grid", ""))
            .await
            .unwrap();
        for (name, version, d) in [("chrome", "1", 1), ("chrome", "2", 10), ("firefox", "1", 5)] {
            client
                .upsert_browser_release(&BrowserRelease {
                    browser_name: name.into(),
                    browser_version: version.into(),
                    release_date: day(d),
                })
                .await
                .unwrap();
        }
        client
            .upsert_browser_feature_availability(&BrowserFeatureAvailability {
                browser_name: "chrome".into(),
                browser_version: "2".into(),
                feature_key: "grid".into(),
            })
            .await
            .unwrap();
        client
    }

    #[tokio::test]
    async fn support_flips_at_shipping_release() {
        let client = seeded().await;
        let targets = vec!["chrome".to_string(), "firefox".to_string()];
        let written = client
            .precalculate_browser_feature_support_events(&targets, day(1), day(20))
            .await
            .unwrap();
        // 2 targets x 3 releases x 1 feature
        assert_eq!(written, 6);

        let chrome = client.list_feature_support_events("chrome").await.unwrap();
        let statuses: Vec<_> = chrome
            .iter()
            .map(|e| (e.event_browser_name.as_str(), e.support_status))
            .collect();
        assert_eq!(
            statuses,
            [
                ("chrome", SupportStatus::Unsupported),
                ("firefox", SupportStatus::Unsupported),
                ("chrome", SupportStatus::Supported),
            ]
        );

        let firefox = client.list_feature_support_events("firefox").await.unwrap();
        assert!(firefox
            .iter()
            .all(|e| e.support_status == SupportStatus::Unsupported));
    }

    #[tokio::test]
    async fn rerun_replaces_previous_events() {
        let client = seeded().await;
        let targets = vec!["chrome".to_string()];
        client
            .precalculate_browser_feature_support_events(&targets, day(1), day(20))
            .await
            .unwrap();
        let written = client
            .precalculate_browser_feature_support_events(&targets, day(9), day(20))
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(client.list_feature_support_events("chrome").await.unwrap().len(), 1);
    }
}
