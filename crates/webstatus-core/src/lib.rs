//! Caller-facing entity types for the web platform status store.
//!
//! These are the "external" shapes handed to and returned from
//! `webstatus-storage`: they carry business keys (feature keys, browser
//! names and versions, external run IDs) and never the storage-internal
//! identifiers the database assigns.

pub mod baseline;
pub mod browser;
pub mod chromium;
pub mod error;
pub mod feature;
pub mod notification;
pub mod saved_search;
pub mod wpt;

// Re-export commonly used types
pub use baseline::{BaselineStatus, BaselineStatusCount, FeatureBaselineStatus};
pub use browser::{BrowserFeatureAvailability, BrowserRelease, FeatureSupportEvent, SupportStatus};
pub use chromium::{DailyChromiumHistogramMetric, HistogramName};
pub use error::CoreError;
pub use feature::WebFeature;
pub use notification::{
    CreateNotificationChannelRequest, NotificationChannel, NotificationChannelConfig,
    NotificationChannelType,
};
pub use saved_search::{
    CreateSavedSearchRequest, SavedSearch, SavedSearchRole, SavedSearchScope,
    UpdateSavedSearchRequest,
};
pub use wpt::{WptRun, WptRunFeatureMetric, WptRunFeatureMetricWithTime};
