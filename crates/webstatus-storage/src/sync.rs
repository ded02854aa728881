//! Reconciles a stored table against an authoritative desired list.
//!
//! [`EntitySynchronizer`] reads every stored row, matches rows to desired
//! entities by business key and stages the minimal writes:
//!
//! - desired key not stored: insert a fresh row
//! - desired key stored: merge, and write only if the merge changed it
//! - stored key not desired: delete it together with its dependents
//!
//! The whole plan is computed, including every foreign-key resolution,
//! before anything is staged, so a failed resolution leaves the table as it
//! was. A desired list that matches storage stages zero mutations.

use std::collections::{HashMap, HashSet};

use crate::client::{Client, ReadContext, ReadWriteTxn};
use crate::error::StorageError;
use crate::mapper::{delete_group, SyncMapper};
use crate::mutation::Mutation;

/// Counts of what a sync did. Every desired or stored key lands in exactly
/// one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl SyncSummary {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

#[derive(Debug, Default)]
struct SyncPlan {
    /// Each group deletes one stored entity; groups are never split.
    delete_groups: Vec<Vec<Mutation>>,
    upserts: Vec<Mutation>,
    summary: SyncSummary,
}

impl SyncPlan {
    fn mutation_count(&self) -> usize {
        self.delete_groups.iter().map(Vec::len).sum::<usize>() + self.upserts.len()
    }

    /// Deletes first so unique secondary keys freed by a delete can be
    /// reused by an insert in the same pass.
    fn into_mutations(self) -> impl Iterator<Item = Mutation> {
        self.delete_groups.into_iter().flatten().chain(self.upserts)
    }

    /// Splits the plan into transactions of at most `limit` mutations. A
    /// delete group larger than `limit` gets a chunk of its own.
    fn into_chunks(self, limit: usize) -> Vec<Vec<Mutation>> {
        let limit = limit.max(1);
        let mut chunks = Vec::new();
        let mut current: Vec<Mutation> = Vec::new();

        for group in self.delete_groups {
            if !current.is_empty() && current.len() + group.len() > limit {
                chunks.push(std::mem::take(&mut current));
            }
            current.extend(group);
        }
        for mutation in self.upserts {
            if current.len() >= limit {
                chunks.push(std::mem::take(&mut current));
            }
            current.push(mutation);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

pub struct EntitySynchronizer<M> {
    mapper: M,
}

impl<M: SyncMapper> EntitySynchronizer<M> {
    pub fn new(mapper: M) -> Self {
        EntitySynchronizer { mapper }
    }

    fn plan(
        &self,
        txn: &ReadWriteTxn<'_>,
        desired: &[M::External],
    ) -> Result<SyncPlan, StorageError> {
        let table = self.mapper.table();

        let mut desired_keys = HashSet::with_capacity(desired.len());
        for external in desired {
            let key = self.mapper.key_from_external(external);
            if !desired_keys.insert(key.clone()) {
                return Err(StorageError::DuplicateSyncKey {
                    table,
                    key: format!("{key:?}"),
                });
            }
        }

        let stored: Vec<M::Internal> = txn
            .query(&self.mapper.select_all())
            .map_err(|e| e.in_operation(format!("read all {table} for sync")))?;
        let mut stored_by_key: HashMap<M::Key, M::Internal> = HashMap::with_capacity(stored.len());
        let mut stored_order = Vec::with_capacity(stored.len());
        for entity in stored {
            let key = self.mapper.key_from_internal(&entity);
            stored_order.push(key.clone());
            stored_by_key.insert(key, entity);
        }

        let mut plan = SyncPlan::default();
        for external in desired {
            let key = self.mapper.key_from_external(external);
            match stored_by_key.remove(&key) {
                None => {
                    let entity = self.mapper.new_entity(txn, external)?;
                    plan.upserts.push(self.mapper.upsert_mutation(&entity));
                    plan.summary.inserted += 1;
                }
                Some(existing) => {
                    let (merged, changed) =
                        self.mapper.merge_and_check_changed(external, existing);
                    if changed {
                        self.mapper.resolve_references(txn, external)?;
                        plan.upserts.push(self.mapper.upsert_mutation(&merged));
                        plan.summary.updated += 1;
                    } else {
                        plan.summary.unchanged += 1;
                    }
                }
            }
        }

        // Whatever is left in the stored map is absent from the desired list.
        for key in stored_order {
            if let Some(entity) = stored_by_key.remove(&key) {
                plan.delete_groups.push(delete_group(&self.mapper, txn, &entity)?);
                plan.summary.deleted += 1;
            }
        }

        Ok(plan)
    }

    /// Stages the whole sync on an open transaction.
    pub fn sync_in(
        &self,
        txn: &mut ReadWriteTxn<'_>,
        desired: &[M::External],
    ) -> Result<SyncSummary, StorageError> {
        let plan = self.plan(txn, desired)?;
        let summary = plan.summary;
        txn.buffer_all(plan.into_mutations());
        Ok(summary)
    }

    /// Makes the stored table match `desired`.
    ///
    /// Plans that fit within
    /// [`max_mutations_per_transaction`](crate::config::StorageConfig::max_mutations_per_transaction)
    /// commit atomically with the read that produced them. Larger plans are
    /// applied in several transactions; each entity's delete group stays in
    /// one of them.
    pub async fn sync(
        &self,
        client: &Client,
        desired: &[M::External],
    ) -> Result<SyncSummary, StorageError> {
        let table = self.mapper.table();
        let limit = client.config().max_mutations_per_transaction.max(1);

        let (summary, deferred) = client
            .read_write(|txn| {
                let plan = self.plan(txn, desired)?;
                let summary = plan.summary;
                if plan.mutation_count() <= limit {
                    txn.buffer_all(plan.into_mutations());
                    Ok((summary, Vec::new()))
                } else {
                    Ok((summary, plan.into_chunks(limit)))
                }
            })
            .await?;

        let chunks = deferred.len();
        for (index, chunk) in deferred.into_iter().enumerate() {
            tracing::debug!(table, chunk = index + 1, of = chunks, size = chunk.len(), "applying sync chunk");
            client
                .read_write(|txn| {
                    txn.buffer_all(chunk.iter().cloned());
                    Ok(())
                })
                .await?;
        }

        tracing::info!(
            table,
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            "sync complete"
        );
        Ok(summary)
    }
}
