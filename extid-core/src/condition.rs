//! Condition values for conditional writes and query filters
//!
//! A [`Condition`] is a flat boolean combination (all-of / any-of) over a
//! small set of [`Predicate`]s on the mutable attributes of an
//! [`ExternalIdRecord`]. The same value type serves two purposes:
//!
//! - As the expectation of [`RecordStore::put_if`](crate::RecordStore::put_if):
//!   the write only happens if the *stored* record satisfies the condition.
//! - As the filter of a [`RecordQuery`](crate::RecordQuery): only records
//!   satisfying the condition are returned or counted.
//!
//! In-process stores evaluate conditions with [`Condition::matches`]; remote
//! stores translate them into their native expression syntax.
//!
//! Evaluation against a missing record follows attribute-existence semantics:
//! an absent record has no health code and no lease, but fails [`Predicate::Exists`].

use crate::record::ExternalIdRecord;
use serde::{Deserialize, Serialize};

/// A single test against a stored record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    /// The record exists
    Exists,
    /// No health code is bound
    HealthCodeAbsent,
    /// A health code is bound
    HealthCodePresent,
    /// No lease, or the lease was taken strictly before the threshold (expired)
    LeaseTakenBefore(i64),
    /// A lease exists and was taken at or after the threshold (still active)
    LeaseTakenSince(i64),
}

impl Predicate {
    /// Evaluate this predicate against a possibly-missing record
    pub fn matches(&self, record: Option<&ExternalIdRecord>) -> bool {
        let health_code = record.and_then(|r| r.health_code.as_ref());
        let reservation = record.and_then(|r| r.reservation);
        match *self {
            Predicate::Exists => record.is_some(),
            Predicate::HealthCodeAbsent => health_code.is_none(),
            Predicate::HealthCodePresent => health_code.is_some(),
            Predicate::LeaseTakenBefore(threshold) => reservation.map_or(true, |at| at < threshold),
            Predicate::LeaseTakenSince(threshold) => reservation.is_some_and(|at| at >= threshold),
        }
    }
}

/// A boolean combination of predicates
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// Every predicate must hold (AND). An empty list always holds.
    All(Vec<Predicate>),
    /// At least one predicate must hold (OR). An empty list never holds.
    Any(Vec<Predicate>),
}

impl Condition {
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Condition::All(predicates.into_iter().collect())
    }

    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Condition::Any(predicates.into_iter().collect())
    }

    /// The predicates being combined
    pub fn predicates(&self) -> &[Predicate] {
        match self {
            Condition::All(p) | Condition::Any(p) => p,
        }
    }

    /// Evaluate this condition against a possibly-missing record
    pub fn matches(&self, record: Option<&ExternalIdRecord>) -> bool {
        match self {
            Condition::All(p) => p.iter().all(|pred| pred.matches(record)),
            Condition::Any(p) => p.iter().any(|pred| pred.matches(record)),
        }
    }
}
