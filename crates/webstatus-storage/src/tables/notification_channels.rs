//! Per-user notification channels.
//!
//! Every read and delete is scoped to the owning user: another user's
//! channel is indistinguishable from a missing one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webstatus_core::{CreateNotificationChannelRequest, NotificationChannel};

use crate::client::{Client, ReadContext};
use crate::cursor::{decode_page_token, page_limit, Page};
use crate::error::StorageError;
use crate::mapper::{DeleteMapper, ReadMapper};
use crate::mutation::Mutation;
use crate::reader::EntityReader;
use crate::value::{get_parsed, get_timestamp, FromRow, Statement};
use crate::writer::EntityWriter;

const TABLE: &str = "NotificationChannels";

const SELECT_COLUMNS: &str =
    "SELECT ID, UserID, Name, Type, Config, CreatedAt, UpdatedAt FROM NotificationChannels";

impl FromRow for NotificationChannel {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let config: String = row.get(4)?;
        let config = serde_json::from_str(&config).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(NotificationChannel {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            channel_type: get_parsed(row, 3)?,
            config,
            created_at: get_timestamp(row, 5)?,
            updated_at: get_timestamp(row, 6)?,
        })
    }
}

struct ChannelMapper;

impl ReadMapper for ChannelMapper {
    /// (user ID, channel ID)
    type Key = (String, String);
    type Internal = NotificationChannel;

    fn table(&self) -> &'static str {
        TABLE
    }

    fn select_one(&self, (user_id, channel_id): &(String, String)) -> Statement {
        Statement::new(format!("{SELECT_COLUMNS} WHERE ID = @id AND UserID = @user_id"))
            .bind("id", channel_id.as_str())
            .bind("user_id", user_id.as_str())
    }
}

impl DeleteMapper for ChannelMapper {
    fn delete_mutation(&self, entity: &NotificationChannel) -> Mutation {
        Mutation::delete(TABLE).key("ID", entity.id.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChannelCursor {
    last_name: String,
    last_id: String,
}

impl Client {
    /// Creates a channel for `request.user_id` and returns its ID.
    pub async fn create_notification_channel(
        &self,
        request: &CreateNotificationChannelRequest,
    ) -> Result<String, StorageError> {
        let limit = self.config().max_notification_channels_per_user;
        let id = Uuid::new_v4().to_string();
        let config = serde_json::to_string(&request.config)?;
        let user_id = request.user_id.as_str();

        self.read_write(|txn| {
            let existing: i64 = txn.query_one(
                &Statement::new("SELECT COUNT(*) FROM NotificationChannels WHERE UserID = @user_id")
                    .bind("user_id", user_id),
            )?;
            if usize::try_from(existing).unwrap_or(usize::MAX) >= limit {
                return Err(StorageError::NotificationChannelQuotaExceeded { limit });
            }
            txn.buffer(
                Mutation::insert(TABLE)
                    .key("ID", id.as_str())
                    .set("UserID", user_id)
                    .set("Name", request.name.as_str())
                    .set("Type", request.config.channel_type().as_str())
                    .set("Config", config.as_str())
                    .set_commit_timestamp("CreatedAt")
                    .set_commit_timestamp("UpdatedAt"),
            );
            Ok(())
        })
        .await?;
        Ok(id)
    }

    pub async fn get_notification_channel(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<NotificationChannel, StorageError> {
        EntityReader::new(ChannelMapper)
            .read(self, &(user_id.to_string(), channel_id.to_string()))
            .await
    }

    /// The user's channels ordered by name then ID.
    pub async fn list_notification_channels_paged(
        &self,
        user_id: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page<NotificationChannel>, StorageError> {
        let cursor: Option<ChannelCursor> = decode_page_token(page_token)?;
        let (page_size, limit) = page_limit(page_size);

        let seek = if cursor.is_some() {
            "AND (Name > @last_name OR (Name = @last_name AND ID > @last_id))"
        } else {
            ""
        };
        let mut stmt = Statement::new(format!(
            "{SELECT_COLUMNS} WHERE UserID = @user_id {seek} ORDER BY Name, ID LIMIT @limit"
        ))
        .bind("user_id", user_id)
        .bind("limit", limit);
        if let Some(cursor) = cursor {
            stmt = stmt
                .bind("last_name", cursor.last_name)
                .bind("last_id", cursor.last_id);
        }

        let items: Vec<NotificationChannel> = self
            .read_only(|txn| txn.query(&stmt))
            .await
            .map_err(|e| e.in_operation("list notification channels"))?;
        Page::from_rows(items, page_size, |last| ChannelCursor {
            last_name: last.name.clone(),
            last_id: last.id.clone(),
        })
    }

    pub async fn delete_notification_channel(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<(), StorageError> {
        EntityWriter::new(ChannelMapper)
            .delete_by_key(self, &(user_id.to_string(), channel_id.to_string()))
            .await
    }
}
