//! Per-table strategy traits consumed by the generic primitives.
//!
//! A table supplies one small mapper type implementing whichever of these
//! traits its operations need:
//!
//! - [`ReadMapper`]: key type, stored row type and the by-key query. Enough
//!   for [`EntityReader`](crate::reader::EntityReader).
//! - [`WriteMapper`]: how a caller-supplied entity becomes a stored row and
//!   how it merges into an existing one. Drives
//!   [`EntityWriter`](crate::writer::EntityWriter).
//! - [`DeleteMapper`]: the primary delete plus any dependent-row cleanup the
//!   schema does not cascade.
//! - [`SyncMapper`]: full-table read and key projection of stored rows, for
//!   [`EntitySynchronizer`](crate::sync::EntitySynchronizer).

use std::fmt::Debug;
use std::hash::Hash;

use crate::client::ReadWriteTxn;
use crate::error::StorageError;
use crate::mutation::Mutation;
use crate::value::{FromRow, Statement};

pub trait ReadMapper {
    /// Business key. Never a storage-internal identifier.
    type Key: Debug + Clone + Eq + Hash;
    /// The row shape as stored.
    type Internal: FromRow;

    fn table(&self) -> &'static str;

    /// Selects at most one row for `key`.
    fn select_one(&self, key: &Self::Key) -> Statement;
}

pub trait WriteMapper: ReadMapper {
    /// The caller-facing entity.
    type External;

    fn key_from_external(&self, external: &Self::External) -> Self::Key;

    /// Builds a fresh stored row, generating internal identifiers and
    /// resolving foreign business keys. A key that cannot be resolved is an
    /// error and aborts the enclosing write.
    fn new_entity(
        &self,
        txn: &ReadWriteTxn<'_>,
        external: &Self::External,
    ) -> Result<Self::Internal, StorageError>;

    /// Checks that every foreign business key `external` carries still
    /// resolves. Called before an update is staged; `new_entity` covers
    /// inserts.
    fn resolve_references(
        &self,
        _txn: &ReadWriteTxn<'_>,
        _external: &Self::External,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    /// Merges `external` into `existing`, returning the merged row and
    /// whether anything changed. Merging an entity into its own stored
    /// projection must report no change.
    fn merge_and_check_changed(
        &self,
        external: &Self::External,
        existing: Self::Internal,
    ) -> (Self::Internal, bool);

    /// The insert-or-update that persists `entity`.
    fn upsert_mutation(&self, entity: &Self::Internal) -> Mutation;
}

pub trait DeleteMapper: ReadMapper {
    fn delete_mutation(&self, entity: &Self::Internal) -> Mutation;

    /// Mutations that must run before any dependent row is removed, such as
    /// clearing pointer rows that reference the dependents.
    fn pre_delete_hook(
        &self,
        _txn: &ReadWriteTxn<'_>,
        _entity: &Self::Internal,
    ) -> Result<Vec<Mutation>, StorageError> {
        Ok(Vec::new())
    }

    /// Deletes of dependent rows the schema does not cascade.
    fn child_delete_mutations(
        &self,
        _txn: &ReadWriteTxn<'_>,
        _entity: &Self::Internal,
    ) -> Result<Vec<Mutation>, StorageError> {
        Ok(Vec::new())
    }
}

pub trait SyncMapper: WriteMapper + DeleteMapper {
    fn key_from_internal(&self, internal: &Self::Internal) -> Self::Key;

    /// Selects every stored row of the logical table, in a stable order.
    fn select_all(&self) -> Statement;
}

/// Stored rows that carry a generated internal identifier.
pub trait IdentifiedEntity {
    fn internal_id(&self) -> &str;
}

/// Everything staged to delete one entity, in apply order: hook mutations,
/// child deletes, then the entity's own delete.
pub(crate) fn delete_group<M: DeleteMapper>(
    mapper: &M,
    txn: &ReadWriteTxn<'_>,
    entity: &M::Internal,
) -> Result<Vec<Mutation>, StorageError> {
    let mut group = mapper.pre_delete_hook(txn, entity)?;
    group.extend(mapper.child_delete_mutations(txn, entity)?);
    group.push(mapper.delete_mutation(entity));
    Ok(group)
}
