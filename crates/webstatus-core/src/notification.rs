//! Notification channels a user registers for saved-search alerts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Delivery mechanism of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationChannelType {
    Email,
}

impl NotificationChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannelType::Email => "EMAIL",
        }
    }
}

impl fmt::Display for NotificationChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannelType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMAIL" => Ok(NotificationChannelType::Email),
            other => Err(CoreError::UnknownChannelType(other.to_string())),
        }
    }
}

/// Type-specific channel configuration, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationChannelConfig {
    Email { address: String },
}

impl NotificationChannelConfig {
    pub fn channel_type(&self) -> NotificationChannelType {
        match self {
            NotificationChannelConfig::Email { .. } => NotificationChannelType::Email,
        }
    }
}

/// A stored notification channel, always scoped to its owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub channel_type: NotificationChannelType,
    pub config: NotificationChannelConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNotificationChannelRequest {
    pub user_id: String,
    pub name: String,
    pub config: NotificationChannelConfig,
}
