//! In-memory record store
//!
//! Records live in a `BTreeMap` per study behind `Arc<RwLock>`, which keeps
//! each partition ordered by identifier the way a range-keyed store would.
//! Conditional writes evaluate the expectation and apply the write under one
//! write lock, so they are linearizable per key.

use async_trait::async_trait;
use extid_core::{
    BatchFailure, Condition, ExternalIdRecord, PutOutcome, RecordKey, RecordQuery, RecordStore,
    Result,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Bound;
use std::sync::Arc;

pub(crate) type Partition = BTreeMap<String, ExternalIdRecord>;

/// In-memory record store for tests and embedding
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    /// study_id -> identifier -> record
    partitions: Arc<RwLock<BTreeMap<String, Partition>>>,
}

impl Debug for MemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let partitions = self.partitions.read();
        let record_count: usize = partitions.values().map(BTreeMap::len).sum();
        f.debug_struct("MemoryRecordStore")
            .field("study_count", &partitions.len())
            .field("record_count", &record_count)
            .finish()
    }
}

impl MemoryRecordStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a study (test helper)
    pub fn len(&self, study_id: &str) -> usize {
        self.partitions.read().get(study_id).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, study_id: &str) -> bool {
        self.len(study_id) == 0
    }

    fn insert(partitions: &mut BTreeMap<String, Partition>, record: &ExternalIdRecord) {
        partitions
            .entry(record.study_id.clone())
            .or_default()
            .insert(record.identifier.clone(), record.clone());
    }

    fn remove(partitions: &mut BTreeMap<String, Partition>, key: &RecordKey) {
        if let Some(partition) = partitions.get_mut(&key.study_id) {
            partition.remove(&key.identifier);
            if partition.is_empty() {
                partitions.remove(&key.study_id);
            }
        }
    }
}

/// Records of one partition admitted by `query`, in identifier order,
/// resuming after the exclusive start key. Shared with the file store.
pub(crate) fn scan<'a>(
    partition: &'a Partition,
    query: &'a RecordQuery,
) -> impl Iterator<Item = &'a ExternalIdRecord> + 'a {
    let lower = match query.exclusive_start.as_deref() {
        Some(start) => Bound::Excluded(start),
        None => Bound::Unbounded,
    };
    partition
        .range::<str, _>((lower, Bound::Unbounded))
        .map(|(_, record)| record)
        .filter(move |record| query.admits(record))
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<ExternalIdRecord>> {
        Ok(self
            .partitions
            .read()
            .get(&key.study_id)
            .and_then(|p| p.get(&key.identifier))
            .cloned())
    }

    async fn put_if(&self, record: &ExternalIdRecord, expected: &Condition) -> Result<PutOutcome> {
        let mut partitions = self.partitions.write();
        let current = partitions
            .get(&record.study_id)
            .and_then(|p| p.get(&record.identifier));

        if !expected.matches(current) {
            return Ok(PutOutcome::ConditionFailed);
        }
        Self::insert(&mut partitions, record);
        Ok(PutOutcome::Written)
    }

    async fn put(&self, record: &ExternalIdRecord) -> Result<()> {
        Self::insert(&mut self.partitions.write(), record);
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        Self::remove(&mut self.partitions.write(), key);
        Ok(())
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<ExternalIdRecord>> {
        let partitions = self.partitions.read();
        let Some(partition) = partitions.get(&query.study_id) else {
            return Ok(Vec::new());
        };
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(scan(partition, query).take(limit).cloned().collect())
    }

    async fn count(&self, query: &RecordQuery) -> Result<usize> {
        let partitions = self.partitions.read();
        Ok(partitions
            .get(&query.study_id)
            .map_or(0, |p| p.values().filter(|r| query.admits(r)).count()))
    }

    async fn batch_put(&self, records: &[ExternalIdRecord]) -> Result<Vec<BatchFailure>> {
        let mut partitions = self.partitions.write();
        for record in records {
            Self::insert(&mut partitions, record);
        }
        Ok(Vec::new())
    }

    async fn batch_delete(&self, keys: &[RecordKey]) -> Result<Vec<BatchFailure>> {
        let mut partitions = self.partitions.write();
        for key in keys {
            Self::remove(&mut partitions, key);
        }
        Ok(Vec::new())
    }
}
