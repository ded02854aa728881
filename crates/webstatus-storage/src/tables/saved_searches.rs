//! Saved searches, the roles users hold on them, and user bookmarks.
//!
//! The creator of a search is its OWNER and gets it bookmarked. Only an
//! owner may update or delete a search, and an owner cannot drop their own
//! bookmark.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webstatus_core::{
    CreateSavedSearchRequest, SavedSearch, SavedSearchRole, SavedSearchScope,
    UpdateSavedSearchRequest,
};

use crate::client::{Client, ReadContext, ReadWriteTxn};
use crate::cursor::{decode_page_token, page_limit, Page};
use crate::error::StorageError;
use crate::mapper::{DeleteMapper, ReadMapper, WriteMapper};
use crate::mutation::Mutation;
use crate::reader::EntityReader;
use crate::value::{get_optional_parsed, get_parsed, get_timestamp, FromRow, Statement};
use crate::writer::EntityWriter;

const TABLE: &str = "SavedSearches";
const ROLES_TABLE: &str = "SavedSearchUserRoles";
const BOOKMARKS_TABLE: &str = "UserSavedSearchBookmarks";

#[derive(Debug, Clone, PartialEq)]
struct StoredSavedSearch {
    id: String,
    name: String,
    query: String,
    description: Option<String>,
    scope: SavedSearchScope,
    author_id: String,
    created_at: DateTime<Utc>,
}

impl FromRow for StoredSavedSearch {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredSavedSearch {
            id: row.get(0)?,
            name: row.get(1)?,
            query: row.get(2)?,
            description: row.get(3)?,
            scope: get_parsed(row, 4)?,
            author_id: row.get(5)?,
            created_at: get_timestamp(row, 6)?,
        })
    }
}

struct SavedSearchMapper;

impl ReadMapper for SavedSearchMapper {
    type Key = String;
    type Internal = StoredSavedSearch;

    fn table(&self) -> &'static str {
        TABLE
    }

    fn select_one(&self, id: &String) -> Statement {
        Statement::new(
            "SELECT ID, Name, Query, Description, Scope, AuthorID, CreatedAt
             FROM SavedSearches WHERE ID = @id",
        )
        .bind("id", id.as_str())
    }
}

impl WriteMapper for SavedSearchMapper {
    type External = UpdateSavedSearchRequest;

    fn key_from_external(&self, external: &UpdateSavedSearchRequest) -> String {
        external.id.clone()
    }

    // Updates never create a search.
    fn new_entity(
        &self,
        _txn: &ReadWriteTxn<'_>,
        _external: &UpdateSavedSearchRequest,
    ) -> Result<StoredSavedSearch, StorageError> {
        Err(StorageError::QueryReturnedNoResults)
    }

    fn merge_and_check_changed(
        &self,
        external: &UpdateSavedSearchRequest,
        mut existing: StoredSavedSearch,
    ) -> (StoredSavedSearch, bool) {
        let mut changed = false;
        if let Some(name) = &external.name {
            changed |= *name != existing.name;
            existing.name = name.clone();
        }
        if let Some(query) = &external.query {
            changed |= *query != existing.query;
            existing.query = query.clone();
        }
        if let Some(description) = &external.description {
            changed |= *description != existing.description;
            existing.description = description.clone();
        }
        (existing, changed)
    }

    fn upsert_mutation(&self, entity: &StoredSavedSearch) -> Mutation {
        Mutation::insert_or_update(TABLE)
            .key("ID", entity.id.as_str())
            .set("Name", entity.name.as_str())
            .set("Query", entity.query.as_str())
            .set("Description", entity.description.clone())
            .set("Scope", entity.scope.as_str())
            .set("AuthorID", entity.author_id.as_str())
            .set("CreatedAt", entity.created_at)
            .set_commit_timestamp("UpdatedAt")
    }
}

impl DeleteMapper for SavedSearchMapper {
    fn delete_mutation(&self, entity: &StoredSavedSearch) -> Mutation {
        Mutation::delete(TABLE).key("ID", entity.id.as_str())
    }

    fn child_delete_mutations(
        &self,
        _txn: &ReadWriteTxn<'_>,
        entity: &StoredSavedSearch,
    ) -> Result<Vec<Mutation>, StorageError> {
        Ok(vec![
            Mutation::delete_matching(ROLES_TABLE).key("SavedSearchID", entity.id.as_str()),
            Mutation::delete_matching(BOOKMARKS_TABLE).key("SavedSearchID", entity.id.as_str()),
        ])
    }
}

struct UserRole(SavedSearchRole);

impl FromRow for UserRole {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(UserRole(get_parsed(row, 0)?))
    }
}

fn user_role(
    ctx: &impl ReadContext,
    search_id: &str,
    user_id: &str,
) -> Result<Option<SavedSearchRole>, StorageError> {
    let stmt = Statement::new(
        "SELECT UserRole FROM SavedSearchUserRoles WHERE SavedSearchID = @id AND UserID = @user_id",
    )
    .bind("id", search_id)
    .bind("user_id", user_id);
    Ok(ctx.query_optional::<UserRole>(&stmt)?.map(|role| role.0))
}

/// Fails with not-found for a missing search and
/// [`StorageError::MissingRequiredRole`] when `user_id` is not its owner.
fn require_owner(
    ctx: &impl ReadContext,
    search_id: &str,
    user_id: &str,
) -> Result<StoredSavedSearch, StorageError> {
    let search = EntityReader::new(SavedSearchMapper).read_by_key(ctx, &search_id.to_string())?;
    if user_role(ctx, search_id, user_id)? != Some(SavedSearchRole::Owner) {
        return Err(StorageError::MissingRequiredRole {
            user_id: user_id.to_string(),
            role: SavedSearchRole::Owner.to_string(),
        });
    }
    Ok(search)
}

/// Saved search columns plus the viewing user's role and bookmark. Expects
/// `@user_id` to be bound (NULL for an anonymous viewer).
const VIEW_SELECT: &str = "SELECT s.ID, s.Name, s.Query, s.Description, s.Scope, s.AuthorID,
            s.CreatedAt, s.UpdatedAt, r.UserRole, b.UserID IS NOT NULL
     FROM SavedSearches s
     LEFT JOIN SavedSearchUserRoles r ON r.SavedSearchID = s.ID AND r.UserID = @user_id
     LEFT JOIN UserSavedSearchBookmarks b ON b.SavedSearchID = s.ID AND b.UserID = @user_id";

impl FromRow for SavedSearch {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(SavedSearch {
            id: row.get(0)?,
            name: row.get(1)?,
            query: row.get(2)?,
            description: row.get(3)?,
            scope: get_parsed(row, 4)?,
            author_id: row.get(5)?,
            created_at: get_timestamp(row, 6)?,
            updated_at: get_timestamp(row, 7)?,
            role: get_optional_parsed(row, 8)?,
            is_bookmarked: row.get(9)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SavedSearchCursor {
    last_name: String,
    last_id: String,
}

impl Client {
    /// Creates a search owned and bookmarked by `request.owner_user_id`.
    /// Returns the new search's ID.
    pub async fn create_saved_search(
        &self,
        request: &CreateSavedSearchRequest,
    ) -> Result<String, StorageError> {
        let limit = self.config().max_saved_searches_per_user;
        let id = Uuid::new_v4().to_string();
        let owner = request.owner_user_id.as_str();

        self.read_write(|txn| {
            let owned: i64 = txn.query_one(
                &Statement::new("SELECT COUNT(*) FROM SavedSearches WHERE AuthorID = @owner")
                    .bind("owner", owner),
            )?;
            if usize::try_from(owned).unwrap_or(usize::MAX) >= limit {
                return Err(StorageError::SavedSearchQuotaExceeded { limit });
            }

            txn.buffer(
                Mutation::insert(TABLE)
                    .key("ID", id.as_str())
                    .set("Name", request.name.as_str())
                    .set("Query", request.query.as_str())
                    .set("Description", request.description.clone())
                    .set("Scope", SavedSearchScope::UserPublic.as_str())
                    .set("AuthorID", owner)
                    .set_commit_timestamp("CreatedAt")
                    .set_commit_timestamp("UpdatedAt"),
            );
            txn.buffer(
                Mutation::insert(ROLES_TABLE)
                    .key("SavedSearchID", id.as_str())
                    .key("UserID", owner)
                    .set("UserRole", SavedSearchRole::Owner.as_str()),
            );
            txn.buffer(
                Mutation::insert(BOOKMARKS_TABLE)
                    .key("UserID", owner)
                    .key("SavedSearchID", id.as_str()),
            );
            Ok(())
        })
        .await?;

        tracing::debug!(id = %id, owner, "created saved search");
        Ok(id)
    }

    /// Reads a search, with `role` and `is_bookmarked` filled in for
    /// `user_id` when given.
    pub async fn get_saved_search(
        &self,
        search_id: &str,
        user_id: Option<&str>,
    ) -> Result<SavedSearch, StorageError> {
        let stmt = Statement::new(format!("{VIEW_SELECT} WHERE s.ID = @id"))
            .bind("user_id", user_id)
            .bind("id", search_id);
        self.read_only(|txn| txn.query_one(&stmt)).await
    }

    /// Applies the fields set on `request`. `request.author_id` must own
    /// the search.
    pub async fn update_saved_search(
        &self,
        request: &UpdateSavedSearchRequest,
    ) -> Result<(), StorageError> {
        let writer = EntityWriter::new(SavedSearchMapper);
        self.read_write(|txn| {
            require_owner(txn, &request.id, &request.author_id)?;
            writer.upsert_in(txn, request).map(|_| ())
        })
        .await
    }

    /// Deletes a search with its roles and bookmarks. `user_id` must own it.
    pub async fn delete_saved_search(
        &self,
        search_id: &str,
        user_id: &str,
    ) -> Result<(), StorageError> {
        let writer = EntityWriter::new(SavedSearchMapper);
        self.read_write(|txn| {
            require_owner(txn, search_id, user_id)?;
            writer
                .delete_by_key_in(txn, &search_id.to_string())
                .map(|_| ())
        })
        .await
    }

    /// Searches bookmarked by `user_id`, ordered by name then ID.
    pub async fn list_user_saved_searches_paged(
        &self,
        user_id: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page<SavedSearch>, StorageError> {
        let cursor: Option<SavedSearchCursor> = decode_page_token(page_token)?;
        let (page_size, limit) = page_limit(page_size);

        let seek = if cursor.is_some() {
            "AND (s.Name > @last_name OR (s.Name = @last_name AND s.ID > @last_id))"
        } else {
            ""
        };
        let mut stmt = Statement::new(format!(
            "{VIEW_SELECT}
             WHERE b.UserID IS NOT NULL {seek}
             ORDER BY s.Name, s.ID
             LIMIT @limit"
        ))
        .bind("user_id", user_id)
        .bind("limit", limit);
        if let Some(cursor) = cursor {
            stmt = stmt
                .bind("last_name", cursor.last_name)
                .bind("last_id", cursor.last_id);
        }

        let items: Vec<SavedSearch> = self
            .read_only(|txn| txn.query(&stmt))
            .await
            .map_err(|e| e.in_operation("list user saved searches"))?;
        Page::from_rows(items, page_size, |last| SavedSearchCursor {
            last_name: last.name.clone(),
            last_id: last.id.clone(),
        })
    }

    pub async fn add_user_search_bookmark(
        &self,
        user_id: &str,
        search_id: &str,
    ) -> Result<(), StorageError> {
        self.read_write(|txn| {
            EntityReader::new(SavedSearchMapper).read_by_key(txn, &search_id.to_string())?;
            txn.buffer(
                Mutation::insert_or_update(BOOKMARKS_TABLE)
                    .key("UserID", user_id)
                    .key("SavedSearchID", search_id),
            );
            Ok(())
        })
        .await
    }

    /// Drops a bookmark. Owners keep theirs; removing an absent bookmark is
    /// a no-op.
    pub async fn remove_user_search_bookmark(
        &self,
        user_id: &str,
        search_id: &str,
    ) -> Result<(), StorageError> {
        self.read_write(|txn| {
            if user_role(txn, search_id, user_id)? == Some(SavedSearchRole::Owner) {
                return Err(StorageError::InvalidArgument(format!(
                    "owner cannot remove bookmark on saved search {search_id}"
                )));
            }
            txn.buffer(
                Mutation::delete(BOOKMARKS_TABLE)
                    .key("UserID", user_id)
                    .key("SavedSearchID", search_id),
            );
            Ok(())
        })
        .await
    }
}
