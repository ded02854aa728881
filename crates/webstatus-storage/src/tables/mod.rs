//! Table-specific operations, each an `impl Client` block built on the
//! generic primitives.

pub mod browser_feature_availabilities;
pub mod browser_releases;
pub mod chromium_histograms;
pub mod feature_baseline_status;
pub mod feature_support_events;
pub mod notification_channels;
pub mod saved_searches;
pub mod web_features;
pub mod wpt;
