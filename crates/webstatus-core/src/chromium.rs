//! Daily Chromium use-counter metrics.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The UMA histograms the usage pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistogramName {
    WebDXFeatureObserver,
}

impl HistogramName {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistogramName::WebDXFeatureObserver => "WebDXFeatureObserver",
        }
    }
}

impl fmt::Display for HistogramName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistogramName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WebDXFeatureObserver" => Ok(HistogramName::WebDXFeatureObserver),
            other => Err(CoreError::UnknownHistogramName(other.to_string())),
        }
    }
}

/// Usage rate of a feature on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyChromiumHistogramMetric {
    pub day: NaiveDate,
    /// Fraction of page loads using the feature, in `[0, 1]`.
    pub rate: f64,
}
