//! User saved searches and the roles users hold on them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Visibility of a saved search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SavedSearchScope {
    /// Created by a user; readable by anyone with the link.
    UserPublic,
}

impl SavedSearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavedSearchScope::UserPublic => "USER_PUBLIC",
        }
    }
}

impl FromStr for SavedSearchScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER_PUBLIC" => Ok(SavedSearchScope::UserPublic),
            other => Err(CoreError::UnknownSavedSearchScope(other.to_string())),
        }
    }
}

/// Role a user holds on a saved search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SavedSearchRole {
    Owner,
}

impl SavedSearchRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavedSearchRole::Owner => "OWNER",
        }
    }
}

impl fmt::Display for SavedSearchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SavedSearchRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(SavedSearchRole::Owner),
            other => Err(CoreError::UnknownSavedSearchRole(other.to_string())),
        }
    }
}

/// A stored saved search as seen by a particular (optional) user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: String,
    pub name: String,
    pub query: String,
    pub description: Option<String>,
    pub scope: SavedSearchScope,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Role of the requesting user, if any.
    pub role: Option<SavedSearchRole>,
    /// Whether the requesting user has bookmarked the search.
    pub is_bookmarked: bool,
}

/// Input for creating a saved search owned by `owner_user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSavedSearchRequest {
    pub name: String,
    pub query: String,
    pub description: Option<String>,
    pub owner_user_id: String,
}

/// Partial update of a saved search. `None` fields keep the stored value;
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSavedSearchRequest {
    pub id: String,
    pub author_id: String,
    pub name: Option<String>,
    pub query: Option<String>,
    pub description: Option<Option<String>>,
}
