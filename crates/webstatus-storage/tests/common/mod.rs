//! Shared helpers for webstatus-storage integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use webstatus_core::WebFeature;
use webstatus_storage::{Client, ManualClock, ReadContext, Statement, StorageConfig};

/// Routes `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn client() -> Client {
    init_tracing();
    Client::in_memory().expect("failed to open in-memory client")
}

pub fn client_with_config(config: StorageConfig) -> Client {
    init_tracing();
    Client::open(config).expect("failed to open client")
}

pub fn client_with_clock() -> (Client, Arc<ManualClock>) {
    init_tracing();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));
    let client = Client::open_with_clock(StorageConfig::in_memory(), clock.clone())
        .expect("failed to open client");
    (client, clock)
}

pub fn feature(key: &str) -> WebFeature {
    WebFeature::new(key, format!("{key} name"), format!("{key} description"))
}

pub async fn count_rows(client: &Client, table: &str) -> i64 {
    let stmt = Statement::new(format!("SELECT COUNT(*) FROM {table}"));
    client
        .read_only(|txn| txn.query_one(&stmt))
        .await
        .expect("count query failed")
}

pub async fn stored_feature_keys(client: &Client) -> Vec<String> {
    let stmt = Statement::new("SELECT FeatureKey FROM WebFeatures ORDER BY FeatureKey");
    client
        .read_only(|txn| txn.query(&stmt))
        .await
        .expect("feature key query failed")
}
