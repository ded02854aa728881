//! Baseline status: whether a feature is interoperable across the core
//! browser set, and since when.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Baseline level of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineStatus {
    /// Not yet available in all core browsers.
    None,
    /// Newly available in all core browsers.
    Low,
    /// Widely available (30 months after becoming newly available).
    High,
}

impl BaselineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineStatus::None => "none",
            BaselineStatus::Low => "low",
            BaselineStatus::High => "high",
        }
    }
}

impl fmt::Display for BaselineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaselineStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(BaselineStatus::None),
            "low" => Ok(BaselineStatus::Low),
            "high" => Ok(BaselineStatus::High),
            other => Err(CoreError::UnknownBaselineStatus(other.to_string())),
        }
    }
}

/// Baseline status of one feature, keyed by `feature_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBaselineStatus {
    pub feature_key: String,
    pub status: Option<BaselineStatus>,
    pub low_date: Option<NaiveDate>,
    pub high_date: Option<NaiveDate>,
}

/// Running total of features that reached baseline "low" on or before `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineStatusCount {
    pub date: NaiveDate,
    pub cumulative_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_status_round_trips_through_str() {
        for status in [BaselineStatus::None, BaselineStatus::Low, BaselineStatus::High] {
            assert_eq!(status.to_string().parse::<BaselineStatus>().unwrap(), status);
        }
    }

    #[test]
    fn baseline_status_rejects_unknown() {
        assert!("medium".parse::<BaselineStatus>().is_err());
    }

    #[test]
    fn baseline_status_serializes_lowercase() {
        let json = serde_json::to_string(&BaselineStatus::High).unwrap();
        assert_eq!(json, "\"high\"");
    }
}
