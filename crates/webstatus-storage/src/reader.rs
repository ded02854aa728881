//! Read-one-by-key over a [`ReadMapper`].

use crate::client::{Client, ReadContext};
use crate::error::StorageError;
use crate::mapper::ReadMapper;

pub struct EntityReader<M> {
    mapper: M,
}

impl<M: ReadMapper> EntityReader<M> {
    pub fn new(mapper: M) -> Self {
        EntityReader { mapper }
    }

    /// Reads the row for `key` inside an open transaction of either kind.
    ///
    /// Zero rows is [`StorageError::QueryReturnedNoResults`].
    pub fn read_by_key(
        &self,
        ctx: &impl ReadContext,
        key: &M::Key,
    ) -> Result<M::Internal, StorageError> {
        tracing::debug!(table = self.mapper.table(), ?key, "reading entity by key");
        ctx.query_one(&self.mapper.select_one(key))
            .map_err(|e| e.in_operation(format!("read {} by key", self.mapper.table())))
    }

    /// Reads the row for `key` in a fresh read-only transaction.
    pub async fn read(&self, client: &Client, key: &M::Key) -> Result<M::Internal, StorageError> {
        client.read_only(|txn| self.read_by_key(txn, key)).await
    }
}
