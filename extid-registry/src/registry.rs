//! The external identifier allocation registry
//!
//! A study pre-registers a pool of identifiers; enrolling participants each
//! claim one. Claiming is a two-step protocol built on single-record
//! conditional writes:
//!
//! 1. [`reserve`](AllocationRegistry::reserve) takes a time-bounded lease,
//!    succeeding only if the identifier is unbound and any previous lease has
//!    expired.
//! 2. [`assign`](AllocationRegistry::assign) binds a health code, succeeding
//!    only if no health code is bound yet.
//!
//! Exclusion comes entirely from the store's compare-and-swap; the registry
//! holds no locks. A caller that reserves and then disappears blocks the
//! identifier only until the lease expires.

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::page::{
    BulkRegisterOutcome, ExternalIdInfo, ExternalIdPage, ASSIGNMENT_FILTER, ID_FILTER,
};
use extid_core::record::lease_threshold;
use extid_core::{
    Clock, Condition, ExternalIdRecord, Predicate, PutOutcome, RecordKey, RecordQuery,
    RecordStore, SystemClock,
};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

/// Lease-based external identifier registry over a [`RecordStore`]
#[derive(Clone)]
pub struct AllocationRegistry {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
}

impl Debug for AllocationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationRegistry")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

/// Expectation for taking a lease: unbound, and no lease taken since `threshold`
fn reservable(threshold: i64) -> Condition {
    Condition::all([
        Predicate::Exists,
        Predicate::HealthCodeAbsent,
        Predicate::LeaseTakenBefore(threshold),
    ])
}

/// Expectation for binding a health code
fn assignable() -> Condition {
    Condition::all([Predicate::Exists, Predicate::HealthCodeAbsent])
}

/// Listing filter: `true` selects identifiers that can't be claimed right now
/// (bound, or leased), `false` selects claimable ones.
fn assignment_filter(assigned: bool, threshold: i64) -> Condition {
    if assigned {
        Condition::any([
            Predicate::HealthCodePresent,
            Predicate::LeaseTakenSince(threshold),
        ])
    } else {
        Condition::all([
            Predicate::HealthCodeAbsent,
            Predicate::LeaseTakenBefore(threshold),
        ])
    }
}

fn require_non_blank(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RegistryError::bad_request(format!("{} cannot be blank", name)));
    }
    Ok(())
}

impl AllocationRegistry {
    /// Create a registry reading wall-clock time
    pub fn new(store: Arc<dyn RecordStore>, config: RegistryConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    /// Create a registry with an explicit time source
    pub fn with_clock(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn threshold(&self, now: i64) -> i64 {
        lease_threshold(now, self.config.lease_duration_ms)
    }

    async fn load(&self, study_id: &str, identifier: &str) -> Result<ExternalIdRecord> {
        self.store
            .get(&RecordKey::new(study_id, identifier))
            .await?
            .ok_or_else(|| RegistryError::not_found(study_id, identifier))
    }

    /// Take a lease on an identifier.
    ///
    /// Fails with `NotFound` if the identifier was never registered and with
    /// `Conflict` if it is bound or another lease is still active.
    pub async fn reserve(&self, study_id: &str, identifier: &str) -> Result<()> {
        require_non_blank(study_id, "studyId")?;
        require_non_blank(identifier, "externalId")?;

        let record = self.load(study_id, identifier).await?;
        let now = self.clock.now_millis();
        let leased = record.with_reservation(now);

        match self
            .store
            .put_if(&leased, &reservable(self.threshold(now)))
            .await?
        {
            PutOutcome::Written => {
                tracing::debug!(study_id, identifier, reservation = now, "External ID reserved");
                Ok(())
            }
            PutOutcome::ConditionFailed => {
                tracing::debug!(study_id, identifier, "External ID reservation rejected");
                Err(RegistryError::conflict(study_id, identifier))
            }
        }
    }

    /// Bind an identifier to a participant's health code.
    ///
    /// Re-assigning the same health code is a no-op. A prior reservation is
    /// not required; the conditional write alone keeps bindings exclusive.
    pub async fn assign(&self, study_id: &str, identifier: &str, health_code: &str) -> Result<()> {
        require_non_blank(study_id, "studyId")?;
        require_non_blank(identifier, "externalId")?;
        require_non_blank(health_code, "healthCode")?;

        let record = self.load(study_id, identifier).await?;
        if record.health_code.as_deref() == Some(health_code) {
            return Ok(());
        }

        match self
            .store
            .put_if(&record.with_health_code(health_code), &assignable())
            .await?
        {
            PutOutcome::Written => {
                tracing::debug!(study_id, identifier, "External ID assigned");
                Ok(())
            }
            PutOutcome::ConditionFailed => {
                tracing::debug!(study_id, identifier, "External ID assignment rejected");
                Err(RegistryError::conflict(study_id, identifier))
            }
        }
    }

    /// Release an identifier: clear the binding and any lease.
    ///
    /// Best-effort cleanup: a missing identifier is not an error.
    pub async fn unassign(&self, study_id: &str, identifier: &str) -> Result<()> {
        require_non_blank(study_id, "studyId")?;
        require_non_blank(identifier, "externalId")?;

        let key = RecordKey::new(study_id, identifier);
        if let Some(record) = self.store.get(&key).await? {
            self.store.put(&record.released()).await?;
            tracing::debug!(study_id, identifier, "External ID released");
        }
        Ok(())
    }

    /// Pre-register identifiers as free records, skipping any that exist.
    pub async fn bulk_register(
        &self,
        study_id: &str,
        identifiers: &[String],
    ) -> Result<BulkRegisterOutcome> {
        require_non_blank(study_id, "studyId")?;
        if identifiers.len() > self.config.max_batch_size {
            return Err(RegistryError::bad_request(format!(
                "List of external IDs is too large; size={}, limit={}",
                identifiers.len(),
                self.config.max_batch_size
            )));
        }
        for identifier in identifiers {
            require_non_blank(identifier, "externalId")?;
        }

        let mut seen = HashSet::with_capacity(identifiers.len());
        let mut outcome = BulkRegisterOutcome::default();
        let mut staged = Vec::new();
        for identifier in identifiers {
            if !seen.insert(identifier.as_str()) {
                continue;
            }
            let key = RecordKey::new(study_id, identifier.as_str());
            if self.store.get(&key).await?.is_some() {
                outcome.skipped.push(identifier.clone());
            } else {
                staged.push(ExternalIdRecord::new(study_id, identifier.as_str()));
            }
        }

        if !staged.is_empty() {
            let failures = self.store.batch_put(&staged).await?;
            if !failures.is_empty() {
                tracing::warn!(
                    study_id,
                    failed = failures.len(),
                    staged = staged.len(),
                    "Bulk registration partially failed"
                );
                return Err(RegistryError::PartialBatchFailure(failures));
            }
        }
        outcome.registered = staged.into_iter().map(|r| r.identifier).collect();

        tracing::info!(
            study_id,
            registered = outcome.registered.len(),
            skipped = outcome.skipped.len(),
            "External IDs registered"
        );
        Ok(outcome)
    }

    /// Delete identifiers outright. Administrative/test use only; normal flow
    /// never deletes. Missing identifiers are ignored.
    pub async fn bulk_delete(&self, study_id: &str, identifiers: &[String]) -> Result<()> {
        require_non_blank(study_id, "studyId")?;
        if identifiers.is_empty() {
            return Ok(());
        }
        for identifier in identifiers {
            require_non_blank(identifier, "externalId")?;
        }

        let keys: Vec<RecordKey> = identifiers
            .iter()
            .map(|id| RecordKey::new(study_id, id.as_str()))
            .collect();
        let failures = self.store.batch_delete(&keys).await?;
        if !failures.is_empty() {
            tracing::warn!(study_id, failed = failures.len(), "Bulk delete partially failed");
            return Err(RegistryError::PartialBatchFailure(failures));
        }

        tracing::info!(study_id, deleted = keys.len(), "External IDs deleted");
        Ok(())
    }

    /// List one page of a study's identifiers.
    ///
    /// `id_filter` restricts to a prefix; `assignment_filter` selects
    /// unavailable (`true`) or claimable (`false`) identifiers. An
    /// `offset_key` outside the prefix restarts from the first page.
    pub async fn list(
        &self,
        study_id: &str,
        offset_key: Option<&str>,
        page_size: usize,
        id_filter: Option<&str>,
        assignment: Option<bool>,
    ) -> Result<ExternalIdPage> {
        require_non_blank(study_id, "studyId")?;
        if !(self.config.min_page_size..=self.config.max_page_size).contains(&page_size) {
            return Err(RegistryError::bad_request(self.config.page_size_error()));
        }

        let _span = tracing::debug_span!("list_external_ids", study_id, page_size).entered();

        // Blank query params mean "not given"; DynamoDB rejects empty key values
        let offset_key = offset_key.filter(|k| !k.trim().is_empty());
        let id_filter = id_filter.filter(|p| !p.trim().is_empty());

        // The store can't start a prefix range from a key outside the prefix
        let offset_key = match (offset_key, id_filter) {
            (Some(offset), Some(prefix)) if !offset.starts_with(prefix) => None,
            (offset, _) => offset,
        };

        // One "now" for the filters and every item's flag
        let now = self.clock.now_millis();
        let threshold = self.threshold(now);

        let count_query = RecordQuery::new(study_id)
            .with_prefix(id_filter.map(str::to_string))
            .with_filter(assignment.map(|a| assignment_filter(a, threshold)));
        let page_query = count_query
            .clone()
            .with_exclusive_start(offset_key.map(str::to_string))
            .with_limit(page_size + 1);

        let records = self.store.query(&page_query).await?;
        let total = self.store.count(&count_query).await?;

        let items: Vec<ExternalIdInfo> = records
            .iter()
            .take(page_size)
            .map(|r| ExternalIdInfo::new(r.identifier.clone(), r.is_unavailable(threshold)))
            .collect();
        // Only offered when the lookahead record exists
        let next_offset_key = if records.len() > page_size {
            items.last().map(|item| item.identifier.clone())
        } else {
            None
        };

        let mut filters = BTreeMap::new();
        if let Some(prefix) = id_filter {
            filters.insert(ID_FILTER.to_string(), prefix.to_string());
        }
        if let Some(assigned) = assignment {
            filters.insert(ASSIGNMENT_FILTER.to_string(), assigned.to_string());
        }

        tracing::debug!(returned = items.len(), total, "Listed external IDs");
        Ok(ExternalIdPage {
            items,
            offset_key: next_offset_key,
            page_size,
            total,
            filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;
    use async_trait::async_trait;
    use extid_core::{BatchFailure, ManualClock};
    use std::time::Duration;

    const STUDY: &str = "study";
    const START: i64 = 1_700_000_000_000;
    const LEASE: Duration = Duration::from_secs(60);

    fn setup() -> (AllocationRegistry, Arc<MemoryRecordStore>, ManualClock) {
        let store = Arc::new(MemoryRecordStore::new());
        let clock = ManualClock::new(START);
        let config = RegistryConfig::default().with_lease_duration(LEASE);
        let registry = AllocationRegistry::with_clock(store.clone(), Arc::new(clock.clone()), config);
        (registry, store, clock)
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn page_ids(page: &ExternalIdPage) -> Vec<&str> {
        page.items.iter().map(|i| i.identifier.as_str()).collect()
    }

    async fn stored(store: &MemoryRecordStore, id: &str) -> ExternalIdRecord {
        store.get(&RecordKey::new(STUDY, id)).await.unwrap().unwrap()
    }

    // ------------------------------------------------------------------
    // reserve
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_reserve_sets_lease() {
        let (registry, store, _clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();

        registry.reserve(STUDY, "AAA").await.unwrap();
        assert_eq!(stored(&store, "AAA").await.reservation, Some(START));
    }

    #[tokio::test]
    async fn test_reserve_unknown_identifier_is_not_found() {
        let (registry, _store, _clock) = setup();
        let err = registry.reserve(STUDY, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_reserve_blank_identifier_is_bad_request() {
        let (registry, _store, _clock) = setup();
        let err = registry.reserve(STUDY, "  ").await.unwrap_err();
        assert!(matches!(err, RegistryError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_reserve_twice_conflicts_while_lease_active() {
        let (registry, _store, clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();

        registry.reserve(STUDY, "AAA").await.unwrap();
        clock.advance(Duration::from_secs(59));
        let err = registry.reserve(STUDY, "AAA").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_reserve_succeeds_after_lease_expires() {
        let (registry, store, clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();
        registry.reserve(STUDY, "AAA").await.unwrap();

        // Exactly at the boundary the lease is still held
        clock.advance(LEASE);
        assert!(registry.reserve(STUDY, "AAA").await.unwrap_err().is_conflict());

        clock.advance(Duration::from_millis(1));
        registry.reserve(STUDY, "AAA").await.unwrap();
        assert_eq!(
            stored(&store, "AAA").await.reservation,
            Some(START + 60_001)
        );
    }

    #[tokio::test]
    async fn test_reserve_assigned_identifier_conflicts() {
        let (registry, _store, clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();
        registry.assign(STUDY, "AAA", "hc1").await.unwrap();

        // Even long after any lease would have expired
        clock.advance(Duration::from_secs(3600));
        assert!(registry.reserve(STUDY, "AAA").await.unwrap_err().is_conflict());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserves_have_one_winner() {
        let (registry, _store, _clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.reserve(STUDY, "AAA").await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => wins += 1,
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 15);
    }

    #[tokio::test]
    async fn test_two_reserves_one_success_one_conflict() {
        let (registry, _store, _clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();

        let (a, b) = tokio::join!(registry.reserve(STUDY, "AAA"), registry.reserve(STUDY, "AAA"));
        assert!(a.is_ok() != b.is_ok());
        let loser = a.err().or(b.err()).unwrap();
        assert!(loser.is_conflict());
    }

    // ------------------------------------------------------------------
    // assign / unassign
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_assign_binds_and_clears_lease() {
        let (registry, store, _clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();
        registry.reserve(STUDY, "AAA").await.unwrap();

        registry.assign(STUDY, "AAA", "hc1").await.unwrap();
        let record = stored(&store, "AAA").await;
        assert_eq!(record.health_code.as_deref(), Some("hc1"));
        assert_eq!(record.reservation, None);
    }

    #[tokio::test]
    async fn test_assign_is_idempotent() {
        let (registry, store, _clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();

        registry.assign(STUDY, "AAA", "hc1").await.unwrap();
        registry.assign(STUDY, "AAA", "hc1").await.unwrap();
        assert_eq!(stored(&store, "AAA").await.health_code.as_deref(), Some("hc1"));
    }

    #[tokio::test]
    async fn test_assign_different_code_conflicts() {
        let (registry, store, _clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();

        registry.assign(STUDY, "AAA", "hcA").await.unwrap();
        let err = registry.assign(STUDY, "AAA", "hcB").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(stored(&store, "AAA").await.health_code.as_deref(), Some("hcA"));
    }

    #[tokio::test]
    async fn test_assign_without_reserve_is_allowed() {
        let (registry, store, _clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();
        registry.assign(STUDY, "AAA", "hc1").await.unwrap();
        assert!(stored(&store, "AAA").await.is_assigned());
    }

    #[tokio::test]
    async fn test_assign_unknown_and_blank() {
        let (registry, _store, _clock) = setup();
        assert!(registry
            .assign(STUDY, "nope", "hc1")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            registry.assign(STUDY, "AAA", "").await.unwrap_err(),
            RegistryError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_unassign_releases_identifier() {
        let (registry, store, _clock) = setup();
        registry.bulk_register(STUDY, &ids(&["AAA"])).await.unwrap();
        registry.reserve(STUDY, "AAA").await.unwrap();
        registry.assign(STUDY, "AAA", "hc1").await.unwrap();

        registry.unassign(STUDY, "AAA").await.unwrap();
        assert_eq!(stored(&store, "AAA").await, ExternalIdRecord::new(STUDY, "AAA"));

        // Free again: a new participant can claim it right away
        registry.reserve(STUDY, "AAA").await.unwrap();
        registry.assign(STUDY, "AAA", "hc2").await.unwrap();
    }

    #[tokio::test]
    async fn test_unassign_missing_identifier_is_ok() {
        let (registry, store, _clock) = setup();
        registry.unassign(STUDY, "never-registered").await.unwrap();
        registry.unassign(STUDY, "never-registered").await.unwrap();
        assert!(store.is_empty(STUDY));
    }

    // ------------------------------------------------------------------
    // bulk register / delete
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_bulk_register_is_idempotent() {
        let (registry, store, _clock) = setup();
        let first = registry.bulk_register(STUDY, &ids(&["A", "B"])).await.unwrap();
        assert_eq!(first.registered, ids(&["A", "B"]));

        registry.assign(STUDY, "A", "hc1").await.unwrap();
        let second = registry.bulk_register(STUDY, &ids(&["A", "B"])).await.unwrap();
        assert!(second.registered.is_empty());
        assert_eq!(second.skipped, ids(&["A", "B"]));

        assert_eq!(store.len(STUDY), 2);
        // Existing records are not overwritten
        assert!(stored(&store, "A").await.is_assigned());
    }

    #[tokio::test]
    async fn test_bulk_register_collapses_duplicates() {
        let (registry, store, _clock) = setup();
        let outcome = registry
            .bulk_register(STUDY, &ids(&["A", "B", "A"]))
            .await
            .unwrap();
        assert_eq!(outcome.registered, ids(&["A", "B"]));
        assert_eq!(store.len(STUDY), 2);
    }

    #[tokio::test]
    async fn test_bulk_register_enforces_batch_limit() {
        let store = Arc::new(MemoryRecordStore::new());
        let registry = AllocationRegistry::new(
            store.clone(),
            RegistryConfig::default().with_max_batch_size(2),
        );
        let err = registry
            .bulk_register(STUDY, &ids(&["A", "B", "C"]))
            .await
            .unwrap_err();
        match err {
            RegistryError::BadRequest(msg) => {
                assert_eq!(msg, "List of external IDs is too large; size=3, limit=2")
            }
            other => panic!("expected bad request, got {other}"),
        }
        assert!(store.is_empty(STUDY));
    }

    #[tokio::test]
    async fn test_bulk_register_rejects_blank_entries() {
        let (registry, store, _clock) = setup();
        let err = registry
            .bulk_register(STUDY, &ids(&["A", " "]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BadRequest(_)));
        assert!(store.is_empty(STUDY));
    }

    /// Store that refuses batch items whose identifier starts with "bad",
    /// and empty key values in queries the way DynamoDB does
    #[derive(Debug, Default)]
    struct FlakyBatchStore {
        inner: MemoryRecordStore,
    }

    #[async_trait]
    impl RecordStore for FlakyBatchStore {
        async fn get(&self, key: &RecordKey) -> extid_core::Result<Option<ExternalIdRecord>> {
            self.inner.get(key).await
        }
        async fn put_if(
            &self,
            record: &ExternalIdRecord,
            expected: &Condition,
        ) -> extid_core::Result<PutOutcome> {
            self.inner.put_if(record, expected).await
        }
        async fn put(&self, record: &ExternalIdRecord) -> extid_core::Result<()> {
            self.inner.put(record).await
        }
        async fn delete(&self, key: &RecordKey) -> extid_core::Result<()> {
            self.inner.delete(key).await
        }
        async fn query(&self, query: &RecordQuery) -> extid_core::Result<Vec<ExternalIdRecord>> {
            reject_empty_key_values(query)?;
            self.inner.query(query).await
        }
        async fn count(&self, query: &RecordQuery) -> extid_core::Result<usize> {
            reject_empty_key_values(query)?;
            self.inner.count(query).await
        }
        async fn batch_put(
            &self,
            records: &[ExternalIdRecord],
        ) -> extid_core::Result<Vec<BatchFailure>> {
            let (bad, good): (Vec<_>, Vec<_>) = records
                .iter()
                .cloned()
                .partition(|r| r.identifier.starts_with("bad"));
            self.inner.batch_put(&good).await?;
            Ok(bad
                .into_iter()
                .map(|r| BatchFailure::new(r.key(), "throughput exceeded"))
                .collect())
        }
        async fn batch_delete(&self, keys: &[RecordKey]) -> extid_core::Result<Vec<BatchFailure>> {
            let (bad, good): (Vec<_>, Vec<_>) = keys
                .iter()
                .cloned()
                .partition(|k| k.identifier.starts_with("bad"));
            self.inner.batch_delete(&good).await?;
            Ok(bad
                .into_iter()
                .map(|k| BatchFailure::new(k, "throughput exceeded"))
                .collect())
        }
    }

    fn reject_empty_key_values(query: &RecordQuery) -> extid_core::Result<()> {
        let empty = [&query.id_prefix, &query.exclusive_start]
            .into_iter()
            .any(|v| v.as_deref() == Some(""));
        if empty {
            return Err(extid_core::StoreError::backend(
                "ValidationException: key value is an empty string",
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_register_aggregates_batch_failures() {
        let registry = AllocationRegistry::new(
            Arc::new(FlakyBatchStore::default()),
            RegistryConfig::default(),
        );
        let err = registry
            .bulk_register(STUDY, &ids(&["ok1", "bad1", "ok2", "bad2"]))
            .await
            .unwrap_err();
        match err {
            RegistryError::PartialBatchFailure(failures) => {
                let failed: Vec<_> = failures.iter().map(|f| f.key.identifier.as_str()).collect();
                assert_eq!(failed, vec!["bad1", "bad2"]);
                assert!(failures.iter().all(|f| f.message == "throughput exceeded"));
            }
            other => panic!("expected partial batch failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_bulk_delete() {
        let (registry, store, _clock) = setup();
        registry
            .bulk_register(STUDY, &ids(&["A", "B", "C"]))
            .await
            .unwrap();

        registry
            .bulk_delete(STUDY, &ids(&["A", "C", "never-registered"]))
            .await
            .unwrap();
        assert_eq!(store.len(STUDY), 1);
        registry.bulk_delete(STUDY, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_bulk_delete_aggregates_batch_failures() {
        let store = Arc::new(FlakyBatchStore::default());
        store.inner.put(&ExternalIdRecord::new(STUDY, "bad1")).await.unwrap();
        let registry = AllocationRegistry::new(store, RegistryConfig::default());

        let err = registry
            .bulk_delete(STUDY, &ids(&["ok", "bad1"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("study/bad1: throughput exceeded"));
    }

    // ------------------------------------------------------------------
    // list
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_pages_through_identifiers() {
        let (registry, _store, _clock) = setup();
        registry
            .bulk_register(STUDY, &ids(&["A", "B", "C", "D", "E"]))
            .await
            .unwrap();

        let first = registry.list(STUDY, None, 2, None, None).await.unwrap();
        assert_eq!(page_ids(&first), vec!["A", "B"]);
        assert_eq!(first.offset_key.as_deref(), Some("B"));
        assert_eq!(first.total, 5);

        let second = registry
            .list(STUDY, first.offset_key.as_deref(), 2, None, None)
            .await
            .unwrap();
        assert_eq!(page_ids(&second), vec!["C", "D"]);
        assert_eq!(second.offset_key.as_deref(), Some("D"));

        let third = registry
            .list(STUDY, second.offset_key.as_deref(), 2, None, None)
            .await
            .unwrap();
        assert_eq!(page_ids(&third), vec!["E"]);
        assert_eq!(third.offset_key, None);
        assert_eq!(third.total, 5);
    }

    #[tokio::test]
    async fn test_list_exact_page_has_no_next_key() {
        let (registry, _store, _clock) = setup();
        registry.bulk_register(STUDY, &ids(&["A", "B"])).await.unwrap();
        let page = registry.list(STUDY, None, 2, None, None).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_more());
    }

    #[tokio::test]
    async fn test_list_rejects_bad_page_size() {
        let (registry, _store, _clock) = setup();
        for size in [0, 101] {
            let err = registry.list(STUDY, None, size, None, None).await.unwrap_err();
            match err {
                RegistryError::BadRequest(msg) => {
                    assert_eq!(msg, "pageSize must be from 1-100 records")
                }
                other => panic!("expected bad request, got {other}"),
            }
        }
    }

    #[tokio::test]
    async fn test_list_id_filter() {
        let (registry, _store, _clock) = setup();
        registry
            .bulk_register(STUDY, &ids(&["A1", "B1", "C1", "C2", "D1"]))
            .await
            .unwrap();

        let page = registry.list(STUDY, None, 10, Some("C"), None).await.unwrap();
        assert_eq!(page_ids(&page), vec!["C1", "C2"]);
        assert_eq!(page.total, 2);
        assert_eq!(page.filters.get(ID_FILTER).map(String::as_str), Some("C"));
        assert!(!page.filters.contains_key(ASSIGNMENT_FILTER));
    }

    #[tokio::test]
    async fn test_list_discards_offset_outside_prefix() {
        let (registry, _store, _clock) = setup();
        registry
            .bulk_register(STUDY, &ids(&["A", "B", "C1", "C2", "C3"]))
            .await
            .unwrap();

        let page = registry
            .list(STUDY, Some("B"), 10, Some("C"), None)
            .await
            .unwrap();
        assert_eq!(page_ids(&page), vec!["C1", "C2", "C3"]);

        // An offset inside the prefix is honored
        let page = registry
            .list(STUDY, Some("C1"), 10, Some("C"), None)
            .await
            .unwrap();
        assert_eq!(page_ids(&page), vec!["C2", "C3"]);
    }

    #[tokio::test]
    async fn test_list_blank_offset_and_prefix_are_ignored() {
        let store = Arc::new(FlakyBatchStore::default());
        let registry = AllocationRegistry::new(store, RegistryConfig::default());
        registry
            .bulk_register(STUDY, &ids(&["A", "B", "C"]))
            .await
            .unwrap();

        let page = registry
            .list(STUDY, Some(""), 10, Some(""), None)
            .await
            .unwrap();
        assert_eq!(page_ids(&page), vec!["A", "B", "C"]);
        assert_eq!(page.total, 3);
        assert!(!page.filters.contains_key(ID_FILTER));

        let page = registry
            .list(STUDY, Some("  "), 2, Some(" "), Some(false))
            .await
            .unwrap();
        assert_eq!(page_ids(&page), vec!["A", "B"]);
        assert_eq!(page.offset_key.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_list_assignment_filter_scenario() {
        let (registry, _store, clock) = setup();
        registry
            .bulk_register(STUDY, &ids(&["A", "B", "C"]))
            .await
            .unwrap();
        registry.assign(STUDY, "B", "hc1").await.unwrap();
        registry.reserve(STUDY, "C").await.unwrap();
        clock.advance(Duration::from_secs(10));

        let assigned = registry
            .list(STUDY, None, 10, None, Some(true))
            .await
            .unwrap();
        assert_eq!(page_ids(&assigned), vec!["B", "C"]);
        assert!(assigned.items.iter().all(|i| i.assigned));
        assert_eq!(assigned.total, 2);
        assert_eq!(
            assigned.filters.get(ASSIGNMENT_FILTER).map(String::as_str),
            Some("true")
        );

        let unassigned = registry
            .list(STUDY, None, 10, None, Some(false))
            .await
            .unwrap();
        assert_eq!(page_ids(&unassigned), vec!["A"]);
        assert!(!unassigned.items[0].assigned);
        assert_eq!(unassigned.total, 1);

        let everything = registry.list(STUDY, None, 10, None, None).await.unwrap();
        let flags: Vec<_> = everything.items.iter().map(|i| i.assigned).collect();
        assert_eq!(flags, vec![false, true, true]);
    }

    #[tokio::test]
    async fn test_list_expired_lease_reads_as_free() {
        let (registry, _store, clock) = setup();
        registry.bulk_register(STUDY, &ids(&["A"])).await.unwrap();
        registry.reserve(STUDY, "A").await.unwrap();
        clock.advance(LEASE + Duration::from_millis(1));

        let page = registry
            .list(STUDY, None, 10, None, Some(false))
            .await
            .unwrap();
        assert_eq!(page_ids(&page), vec!["A"]);
        assert!(!page.items[0].assigned);
    }

    #[tokio::test]
    async fn test_list_filtered_pagination() {
        let (registry, _store, _clock) = setup();
        registry
            .bulk_register(STUDY, &ids(&["A", "B", "C", "D", "E"]))
            .await
            .unwrap();
        registry.assign(STUDY, "B", "hc1").await.unwrap();
        registry.assign(STUDY, "D", "hc2").await.unwrap();

        let first = registry
            .list(STUDY, None, 2, None, Some(false))
            .await
            .unwrap();
        assert_eq!(page_ids(&first), vec!["A", "C"]);
        assert_eq!(first.offset_key.as_deref(), Some("C"));

        let second = registry
            .list(STUDY, first.offset_key.as_deref(), 2, None, Some(false))
            .await
            .unwrap();
        assert_eq!(page_ids(&second), vec!["E"]);
        assert_eq!(second.offset_key, None);
        assert_eq!(second.total, 3);
    }

    #[tokio::test]
    async fn test_studies_are_isolated() {
        let (registry, _store, _clock) = setup();
        registry.bulk_register("s1", &ids(&["A"])).await.unwrap();
        registry.bulk_register("s2", &ids(&["A"])).await.unwrap();
        registry.assign("s1", "A", "hc1").await.unwrap();

        // Same identifier in another study is untouched
        registry.assign("s2", "A", "hc2").await.unwrap();
        let page = registry.list("s2", None, 10, None, None).await.unwrap();
        assert_eq!(page.total, 1);
    }
}
