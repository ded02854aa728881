//! Web platform features, identified by their web-features key.

use serde::{Deserialize, Serialize};

/// A web platform feature as supplied by the ingestion workflows.
///
/// `feature_key` is the business key (e.g. `"grid"`). An empty `name` or
/// `description` on an upsert means "leave the stored value alone".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebFeature {
    pub feature_key: String,
    pub name: String,
    pub description: String,
}

impl WebFeature {
    pub fn new(
        feature_key: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        WebFeature {
            feature_key: feature_key.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}
