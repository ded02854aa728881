//! Browser releases, per-browser feature availability, and the derived
//! support events computed from them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A released browser version. Keyed by `(browser_name, browser_version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserRelease {
    pub browser_name: String,
    pub browser_version: String,
    pub release_date: DateTime<Utc>,
}

/// The first version of a browser that shipped a feature.
///
/// Keyed by `(feature_key, browser_name)`: a browser has at most one
/// availability row per feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserFeatureAvailability {
    pub browser_name: String,
    pub browser_version: String,
    pub feature_key: String,
}

/// Whether a feature was available in a target browser at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportStatus {
    Supported,
    Unsupported,
}

impl SupportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportStatus::Supported => "supported",
            SupportStatus::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for SupportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupportStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supported" => Ok(SupportStatus::Supported),
            "unsupported" => Ok(SupportStatus::Unsupported),
            other => Err(CoreError::UnknownSupportStatus(other.to_string())),
        }
    }
}

/// One point of the precalculated browser x release x feature grid.
///
/// For every release of `event_browser_name`, records whether
/// `target_browser_name` supported the feature as of that release date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSupportEvent {
    pub target_browser_name: String,
    pub event_browser_name: String,
    pub event_release_date: DateTime<Utc>,
    pub feature_key: String,
    pub support_status: SupportStatus,
}
