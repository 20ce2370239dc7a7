//! Record store adapter trait
//!
//! [`RecordStore`] is the minimal contract the registry needs from a keyed,
//! horizontally-partitioned store:
//!
//! - point reads by [`RecordKey`]
//! - single-record conditional writes (compare-and-swap against a [`Condition`])
//! - unconditional put/delete
//! - ordered range queries within a study partition, with an identifier
//!   prefix, a filter, an exclusive start key and a limit
//! - counts over the same prefix/filter
//! - batch put/delete that report per-item failures instead of failing whole
//!
//! Query and count results may be served from an eventually-consistent read
//! path. Conditional writes must be linearizable per key.

use crate::condition::Condition;
use crate::error::Result;
use crate::record::{ExternalIdRecord, RecordKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Result of a conditional write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The condition held and the record was written
    Written,
    /// The stored record did not satisfy the condition; nothing was written
    ConditionFailed,
}

/// One item of a batch operation the store could not process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub key: RecordKey,
    pub message: String,
}

impl BatchFailure {
    pub fn new(key: RecordKey, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// A range query within one study partition
///
/// Results are ordered by identifier. `exclusive_start` and `limit` apply to
/// queries only; counts consider every record admitted by the prefix and filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordQuery {
    pub study_id: String,
    /// Only identifiers starting with this prefix (store-side range condition)
    pub id_prefix: Option<String>,
    /// Only records satisfying this condition (store-side filter)
    pub filter: Option<Condition>,
    /// Resume after this identifier
    pub exclusive_start: Option<String>,
    /// Return at most this many records (after filtering)
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new(study_id: impl Into<String>) -> Self {
        Self {
            study_id: study_id.into(),
            id_prefix: None,
            filter: None,
            exclusive_start: None,
            limit: None,
        }
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.id_prefix = prefix;
        self
    }

    pub fn with_filter(mut self, filter: Option<Condition>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_exclusive_start(mut self, start: Option<String>) -> Self {
        self.exclusive_start = start;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check the prefix and filter against a record of this study.
    ///
    /// Start key and limit are positional and left to the caller.
    pub fn admits(&self, record: &ExternalIdRecord) -> bool {
        let prefix_ok = self
            .id_prefix
            .as_deref()
            .map_or(true, |p| record.identifier.starts_with(p));
        let filter_ok = self
            .filter
            .as_ref()
            .map_or(true, |f| f.matches(Some(record)));
        prefix_ok && filter_ok
    }
}

/// Keyed store with single-record conditional writes
#[async_trait]
pub trait RecordStore: Debug + Send + Sync {
    /// Read one record. Returns `None` if it does not exist.
    async fn get(&self, key: &RecordKey) -> Result<Option<ExternalIdRecord>>;

    /// Write `record` only if the stored record (or its absence) satisfies `expected`.
    async fn put_if(&self, record: &ExternalIdRecord, expected: &Condition) -> Result<PutOutcome>;

    /// Write `record` unconditionally, replacing any stored version
    async fn put(&self, record: &ExternalIdRecord) -> Result<()>;

    /// Delete one record. Deleting a missing record is not an error.
    async fn delete(&self, key: &RecordKey) -> Result<()>;

    /// Run a range query; see [`RecordQuery`]
    async fn query(&self, query: &RecordQuery) -> Result<Vec<ExternalIdRecord>>;

    /// Count records admitted by the query's prefix and filter
    async fn count(&self, query: &RecordQuery) -> Result<usize>;

    /// Write many records. Returns the items that could not be written.
    async fn batch_put(&self, records: &[ExternalIdRecord]) -> Result<Vec<BatchFailure>>;

    /// Delete many records. Returns the items that could not be deleted.
    async fn batch_delete(&self, keys: &[RecordKey]) -> Result<Vec<BatchFailure>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Predicate;

    #[test]
    fn test_query_admits_prefix_and_filter() {
        let query = RecordQuery::new("study")
            .with_prefix(Some("AB".to_string()))
            .with_filter(Some(Condition::all([Predicate::HealthCodeAbsent])));

        assert!(query.admits(&ExternalIdRecord::new("study", "ABC")));
        assert!(!query.admits(&ExternalIdRecord::new("study", "ACB")));
        assert!(!query.admits(&ExternalIdRecord::new("study", "ABD").with_health_code("hc")));
    }

    #[test]
    fn test_query_without_constraints_admits_everything() {
        let query = RecordQuery::new("study");
        assert!(query.admits(&ExternalIdRecord::new("study", "anything").with_health_code("hc")));
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_batch_failure_display() {
        let failure = BatchFailure::new(RecordKey::new("study", "AAA"), "throttled");
        assert_eq!(failure.to_string(), "study/AAA: throttled");
    }
}
