//! Integration tests for table synchronization and upsert merging.

mod common;

use std::collections::BTreeSet;

use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use webstatus_core::{
    BaselineStatus, BrowserFeatureAvailability, BrowserRelease, DailyChromiumHistogramMetric,
    FeatureBaselineStatus, HistogramName, WebFeature, WptRun, WptRunFeatureMetric,
};
use webstatus_storage::{
    ReadContext, Statement, StorageConfig, StorageError, SyncSummary, WriteAction,
};

use common::{client, client_with_clock, client_with_config, count_rows, feature, stored_feature_keys};

#[tokio::test]
async fn sync_inserts_updates_and_deletes() {
    let client = client();

    let summary = client
        .sync_web_features(&[feature("a"), feature("b")])
        .await
        .unwrap();
    assert_eq!(
        summary,
        SyncSummary { inserted: 2, updated: 0, deleted: 0, unchanged: 0 }
    );

    let mut a = feature("a");
    a.name = "renamed".into();
    let summary = client.sync_web_features(&[a, feature("c")]).await.unwrap();
    assert_eq!(
        summary,
        SyncSummary { inserted: 1, updated: 1, deleted: 1, unchanged: 0 }
    );
    assert_eq!(stored_feature_keys(&client).await, ["a", "c"]);
    assert_eq!(client.get_web_feature_by_key("a").await.unwrap().name, "renamed");

    let summary = client.sync_web_features(&[]).await.unwrap();
    assert_eq!(summary.deleted, 2);
    assert!(stored_feature_keys(&client).await.is_empty());
}

#[tokio::test]
async fn sync_keeps_internal_id_of_surviving_features() {
    let client = client();
    client.sync_web_features(&[feature("a")]).await.unwrap();
    let id = client.get_web_feature_id_by_key("a").await.unwrap();

    client
        .sync_web_features(&[WebFeature::new("a", "new name", ""), feature("b")])
        .await
        .unwrap();
    assert_eq!(client.get_web_feature_id_by_key("a").await.unwrap(), id);
}

#[tokio::test]
async fn noop_sync_leaves_audit_timestamps_alone() {
    let (client, clock) = client_with_clock();
    let desired = [feature("a"), feature("b")];
    client.sync_web_features(&desired).await.unwrap();

    let updated_at = Statement::new("SELECT UpdatedAt FROM WebFeatures ORDER BY FeatureKey");
    let before: Vec<String> = client
        .read_only(|txn| txn.query(&updated_at))
        .await
        .unwrap();

    clock.advance(TimeDelta::hours(1));
    let summary = client.sync_web_features(&desired).await.unwrap();
    assert!(summary.is_noop());
    assert_eq!(summary.unchanged, 2);

    let after: Vec<String> = client
        .read_only(|txn| txn.query(&updated_at))
        .await
        .unwrap();
    assert_eq!(before, after);

    // A real change bumps only the changed row.
    let mut changed = feature("b");
    changed.description = "new".into();
    client.sync_web_features(&[feature("a"), changed]).await.unwrap();
    let bumped: Vec<String> = client
        .read_only(|txn| txn.query(&updated_at))
        .await
        .unwrap();
    assert_eq!(bumped[0], before[0]);
    assert_ne!(bumped[1], before[1]);
}

#[tokio::test]
async fn duplicate_keys_are_rejected_before_any_write() {
    let client = client();
    client.sync_web_features(&[feature("a")]).await.unwrap();

    let err = client
        .sync_web_features(&[feature("b"), feature("b")])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DuplicateSyncKey { table: "WebFeatures", .. }));
    assert_eq!(stored_feature_keys(&client).await, ["a"]);
}

#[tokio::test]
async fn removed_feature_takes_dependent_rows_with_it() {
    let client = client();
    client.sync_web_features(&[feature("a"), feature("b")]).await.unwrap();

    let release_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    client
        .upsert_browser_release(&BrowserRelease {
            browser_name: "chrome".into(),
            browser_version: "120".into(),
            release_date,
        })
        .await
        .unwrap();

    for key in ["a", "b"] {
        client
            .upsert_feature_baseline_status(&FeatureBaselineStatus {
                feature_key: key.into(),
                status: Some(BaselineStatus::Low),
                low_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                high_date: None,
            })
            .await
            .unwrap();
        client
            .upsert_browser_feature_availability(&BrowserFeatureAvailability {
                browser_name: "chrome".into(),
                browser_version: "120".into(),
                feature_key: key.into(),
            })
            .await
            .unwrap();
        client
            .upsert_daily_chromium_histogram_metric(
                HistogramName::WebDXFeatureObserver,
                key,
                &DailyChromiumHistogramMetric {
                    day: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                    rate: 0.5,
                },
            )
            .await
            .unwrap();
    }

    client
        .upsert_wpt_run(&WptRun {
            run_id: 7,
            time_start: release_date,
            time_end: release_date + TimeDelta::hours(1),
            browser_name: "chrome".into(),
            browser_version: "120".into(),
            channel: "stable".into(),
            os_name: "linux".into(),
            os_version: "".into(),
            full_revision_hash: "abc".into(),
        })
        .await
        .unwrap();
    let metrics = ["a", "b"]
        .into_iter()
        .map(|key| (key.to_string(), WptRunFeatureMetric::default()))
        .collect();
    client.upsert_wpt_run_feature_metrics(7, &metrics).await.unwrap();
    client
        .precalculate_browser_feature_support_events(
            &["chrome".to_string()],
            release_date,
            release_date + TimeDelta::days(1),
        )
        .await
        .unwrap();

    let summary = client.sync_web_features(&[feature("b")]).await.unwrap();
    assert_eq!(summary.deleted, 1);

    for table in [
        "FeatureBaselineStatus",
        "BrowserFeatureAvailabilities",
        "FeatureSupportEvents",
        "DailyChromiumHistogramMetrics",
        "LatestDailyChromiumHistogramMetrics",
        "WPTRunFeatureMetrics",
        "LatestWPTRunFeatureMetrics",
    ] {
        assert_eq!(count_rows(&client, table).await, 1, "{table} should only hold b");
    }
    assert!(client.get_feature_baseline_status("a").await.unwrap_err().is_not_found());
    assert_eq!(count_rows(&client, "WPTRuns").await, 1);
}

#[tokio::test]
async fn oversized_plans_are_applied_in_chunks() {
    let client = client_with_config(StorageConfig {
        max_mutations_per_transaction: 2,
        ..StorageConfig::in_memory()
    });
    let desired: Vec<_> = ["a", "b", "c", "d", "e"].into_iter().map(feature).collect();
    let summary = client.sync_web_features(&desired).await.unwrap();
    assert_eq!(summary.inserted, 5);
    assert_eq!(stored_feature_keys(&client).await, ["a", "b", "c", "d", "e"]);

    // Each delete group is larger than the limit and still lands whole.
    let summary = client.sync_web_features(&[feature("c")]).await.unwrap();
    assert_eq!(summary.deleted, 4);
    assert_eq!(stored_feature_keys(&client).await, ["c"]);
}

#[tokio::test]
async fn unresolved_reference_aborts_sync_without_writes() {
    let client = client();
    client.sync_web_features(&[feature("a")]).await.unwrap();
    client
        .upsert_browser_release(&BrowserRelease {
            browser_name: "chrome".into(),
            browser_version: "120".into(),
            release_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        })
        .await
        .unwrap();

    let availability = |key: &str| BrowserFeatureAvailability {
        browser_name: "chrome".into(),
        browser_version: "120".into(),
        feature_key: key.into(),
    };
    let err = client
        .sync_browser_feature_availabilities(&[availability("a"), availability("ghost")])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ReferenceNotFound { .. }));
    assert_eq!(count_rows(&client, "BrowserFeatureAvailabilities").await, 0);
}

#[tokio::test]
async fn update_to_unknown_release_aborts_chunked_sync() {
    let client = client_with_config(StorageConfig {
        max_mutations_per_transaction: 1,
        ..StorageConfig::in_memory()
    });
    client
        .sync_web_features(&[feature("a"), feature("b")])
        .await
        .unwrap();
    client
        .upsert_browser_release(&BrowserRelease {
            browser_name: "chrome".into(),
            browser_version: "120".into(),
            release_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        })
        .await
        .unwrap();

    let availability = |key: &str, version: &str| BrowserFeatureAvailability {
        browser_name: "chrome".into(),
        browser_version: version.into(),
        feature_key: key.into(),
    };
    client
        .sync_browser_feature_availabilities(&[availability("a", "120"), availability("b", "120")])
        .await
        .unwrap();

    // Drops b and moves a to a release that does not exist.
    let err = client
        .sync_browser_feature_availabilities(&[availability("a", "999")])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ReferenceNotFound { table: "BrowserReleases", .. }));
    assert_eq!(count_rows(&client, "BrowserFeatureAvailabilities").await, 2);
    assert_eq!(
        client.list_availabilities_for_feature("a").await.unwrap(),
        vec![availability("a", "120")]
    );
}

#[tokio::test]
async fn upsert_merge_preserves_unset_fields() {
    let client = client();
    assert_eq!(
        client.upsert_web_feature(&feature("grid")).await.unwrap(),
        WriteAction::Inserted
    );
    assert_eq!(
        client
            .upsert_web_feature(&WebFeature::new("grid", "", ""))
            .await
            .unwrap(),
        WriteAction::Unchanged
    );
    assert_eq!(client.get_web_feature_by_key("grid").await.unwrap(), feature("grid"));
}

fn keys() -> impl Strategy<Value = BTreeSet<String>> {
    proptest::collection::btree_set("[a-h]", 0..8)
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn sync_makes_storage_match_desired(initial in keys(), desired in keys(), limit in 1usize..6) {
        let (summary, stored) = run(async {
            let client = client_with_config(StorageConfig {
                max_mutations_per_transaction: limit,
                ..StorageConfig::in_memory()
            });
            let initial: Vec<_> = initial.iter().map(|k| feature(k)).collect();
            client.sync_web_features(&initial).await.unwrap();

            // Renaming every surviving feature forces updates as well.
            let desired: Vec<_> = desired
                .iter()
                .map(|k| WebFeature::new(k.as_str(), format!("{k} v2"), ""))
                .collect();
            let summary = client.sync_web_features(&desired).await.unwrap();
            (summary, stored_feature_keys(&client).await)
        });

        let expected: Vec<String> = desired.iter().cloned().collect();
        prop_assert_eq!(stored, expected);
        prop_assert_eq!(summary.inserted, desired.difference(&initial).count());
        prop_assert_eq!(summary.deleted, initial.difference(&desired).count());
        prop_assert_eq!(summary.updated, initial.intersection(&desired).count());
        prop_assert_eq!(summary.unchanged, 0);
    }

    #[test]
    fn merging_stored_state_reports_unchanged(name in "[a-z ]{0,12}", description in "[a-z ]{0,12}") {
        let actions = run(async {
            let client = client();
            let f = WebFeature::new("key", name.as_str(), description.as_str());
            let first = client.upsert_web_feature(&f).await.unwrap();
            let second = client.upsert_web_feature(&f).await.unwrap();
            (first, second)
        });
        prop_assert_eq!(actions, (WriteAction::Inserted, WriteAction::Unchanged));
    }
}
