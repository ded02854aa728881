//! Upsert-by-merge and delete-by-key over the mapper traits.
//!
//! One upsert is one read-modify-write inside a single read-write
//! transaction: read by key, then either build a fresh row or merge into
//! the stored one. An unchanged merge stages nothing, so audit columns such
//! as `UpdatedAt` are not bumped by a no-op write.

use crate::client::{Client, ReadContext, ReadWriteTxn};
use crate::error::StorageError;
use crate::mapper::{delete_group, DeleteMapper, IdentifiedEntity, ReadMapper, WriteMapper};

/// What an upsert staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome<I> {
    /// The row as it will be stored after commit.
    pub entity: I,
    pub action: WriteAction,
}

pub struct EntityWriter<M> {
    mapper: M,
}

impl<M> EntityWriter<M> {
    pub fn new(mapper: M) -> Self {
        EntityWriter { mapper }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }
}

impl<M: WriteMapper> EntityWriter<M> {
    /// Stages the upsert of `external` on an open transaction.
    pub fn upsert_in(
        &self,
        txn: &mut ReadWriteTxn<'_>,
        external: &M::External,
    ) -> Result<UpsertOutcome<M::Internal>, StorageError> {
        let table = self.mapper.table();
        let key = self.mapper.key_from_external(external);
        let existing: Option<M::Internal> = txn
            .query_optional(&self.mapper.select_one(&key))
            .map_err(|e| e.in_operation(format!("read {table} for upsert")))?;

        let outcome = match existing {
            None => {
                let entity = self.mapper.new_entity(txn, external)?;
                txn.buffer(self.mapper.upsert_mutation(&entity));
                UpsertOutcome {
                    entity,
                    action: WriteAction::Inserted,
                }
            }
            Some(existing) => {
                let (entity, changed) = self.mapper.merge_and_check_changed(external, existing);
                if changed {
                    self.mapper.resolve_references(txn, external)?;
                    txn.buffer(self.mapper.upsert_mutation(&entity));
                    UpsertOutcome {
                        entity,
                        action: WriteAction::Updated,
                    }
                } else {
                    UpsertOutcome {
                        entity,
                        action: WriteAction::Unchanged,
                    }
                }
            }
        };
        tracing::debug!(table, ?key, action = ?outcome.action, "staged upsert");
        Ok(outcome)
    }

    /// Upserts `external` in its own read-write transaction.
    pub async fn upsert(
        &self,
        client: &Client,
        external: &M::External,
    ) -> Result<UpsertOutcome<M::Internal>, StorageError> {
        client.read_write(|txn| self.upsert_in(txn, external)).await
    }
}

impl<M> EntityWriter<M>
where
    M: WriteMapper,
    M::Internal: IdentifiedEntity,
{
    /// Upserts and returns the internal identifier of the stored row.
    pub async fn upsert_returning_id(
        &self,
        client: &Client,
        external: &M::External,
    ) -> Result<String, StorageError> {
        let outcome = self.upsert(client, external).await?;
        Ok(outcome.entity.internal_id().to_string())
    }
}

impl<M: DeleteMapper> EntityWriter<M> {
    /// Stages the delete of the row for `key`, with its dependents.
    ///
    /// A missing row is [`StorageError::QueryReturnedNoResults`].
    pub fn delete_by_key_in(
        &self,
        txn: &mut ReadWriteTxn<'_>,
        key: &M::Key,
    ) -> Result<M::Internal, StorageError> {
        let table = self.mapper.table();
        let entity: M::Internal = txn
            .query_one(&self.mapper.select_one(key))
            .map_err(|e| e.in_operation(format!("read {table} for delete")))?;
        let group = delete_group(&self.mapper, txn, &entity)?;
        tracing::debug!(table, ?key, mutations = group.len(), "staged delete");
        txn.buffer_all(group);
        Ok(entity)
    }

    pub async fn delete_by_key(&self, client: &Client, key: &M::Key) -> Result<(), StorageError> {
        client
            .read_write(|txn| self.delete_by_key_in(txn, key).map(|_| ()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::Mutation;
    use crate::value::{FromRow, Statement};

    /// Locks-table mapper where an empty worker keeps the stored one.
    struct LockOwnerMapper;

    #[derive(Debug, Clone, PartialEq)]
    struct LockOwner {
        id: String,
        worker: String,
    }

    impl FromRow for LockOwner {
        fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
            Ok(LockOwner {
                id: row.get(0)?,
                worker: row.get(1)?,
            })
        }
    }

    impl IdentifiedEntity for LockOwner {
        fn internal_id(&self) -> &str {
            &self.id
        }
    }

    impl ReadMapper for LockOwnerMapper {
        type Key = String;
        type Internal = LockOwner;

        fn table(&self) -> &'static str {
            "Locks"
        }

        fn select_one(&self, key: &String) -> Statement {
            Statement::new("SELECT ID, WorkerID FROM Locks WHERE ID = @id").bind("id", key.as_str())
        }
    }

    impl WriteMapper for LockOwnerMapper {
        type External = LockOwner;

        fn key_from_external(&self, external: &LockOwner) -> String {
            external.id.clone()
        }

        fn new_entity(
            &self,
            _txn: &ReadWriteTxn<'_>,
            external: &LockOwner,
        ) -> Result<LockOwner, StorageError> {
            Ok(external.clone())
        }

        fn merge_and_check_changed(&self, external: &LockOwner, existing: LockOwner) -> (LockOwner, bool) {
            if external.worker.is_empty() || external.worker == existing.worker {
                (existing, false)
            } else {
                (external.clone(), true)
            }
        }

        fn upsert_mutation(&self, entity: &LockOwner) -> Mutation {
            Mutation::insert_or_update("Locks")
                .key("ID", entity.id.as_str())
                .set("WorkerID", entity.worker.as_str())
                .set_commit_timestamp("UpdatedAt")
        }
    }

    impl DeleteMapper for LockOwnerMapper {
        fn delete_mutation(&self, entity: &LockOwner) -> Mutation {
            Mutation::delete("Locks").key("ID", entity.id.as_str())
        }
    }

    fn owner(id: &str, worker: &str) -> LockOwner {
        LockOwner {
            id: id.into(),
            worker: worker.into(),
        }
    }

    #[tokio::test]
    async fn upsert_walks_insert_update_unchanged() {
        let client = Client::in_memory().unwrap();
        let writer = EntityWriter::new(LockOwnerMapper);

        let first = writer.upsert(&client, &owner("r", "a")).await.unwrap();
        assert_eq!(first.action, WriteAction::Inserted);

        let same = writer.upsert(&client, &owner("r", "a")).await.unwrap();
        assert_eq!(same.action, WriteAction::Unchanged);

        let empty = writer.upsert(&client, &owner("r", "")).await.unwrap();
        assert_eq!(empty.action, WriteAction::Unchanged);
        assert_eq!(empty.entity.worker, "a");

        let changed = writer.upsert(&client, &owner("r", "b")).await.unwrap();
        assert_eq!(changed.action, WriteAction::Updated);

        let id = writer.upsert_returning_id(&client, &owner("r", "b")).await.unwrap();
        assert_eq!(id, "r");
    }

    #[tokio::test]
    async fn unchanged_upsert_stages_nothing() {
        let client = Client::in_memory().unwrap();
        let writer = EntityWriter::new(LockOwnerMapper);
        writer.upsert(&client, &owner("r", "a")).await.unwrap();

        let staged = client
            .read_write(|txn| {
                writer.upsert_in(txn, &owner("r", "a"))?;
                Ok(txn.buffered().len())
            })
            .await
            .unwrap();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn delete_by_key_removes_row_and_reports_missing() {
        let client = Client::in_memory().unwrap();
        let writer = EntityWriter::new(LockOwnerMapper);
        writer.upsert(&client, &owner("r", "a")).await.unwrap();

        writer.delete_by_key(&client, &"r".to_string()).await.unwrap();
        let err = writer
            .delete_by_key(&client, &"r".to_string())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
