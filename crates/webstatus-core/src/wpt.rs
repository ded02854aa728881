//! web-platform-tests runs and the per-feature pass metrics derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single wpt.fyi run, keyed by its external `run_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WptRun {
    pub run_id: i64,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub browser_name: String,
    pub browser_version: String,
    pub channel: String,
    pub os_name: String,
    pub os_version: String,
    pub full_revision_hash: String,
}

/// Pass counts for the tests mapped to one feature within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WptRunFeatureMetric {
    pub total_tests: Option<i64>,
    pub test_pass: Option<i64>,
    pub total_subtests: Option<i64>,
    pub subtest_pass: Option<i64>,
}

/// A feature metric together with the run it came from, for time series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WptRunFeatureMetricWithTime {
    pub time_start: DateTime<Utc>,
    pub run_id: i64,
    pub metric: WptRunFeatureMetric,
}
