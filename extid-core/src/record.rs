//! External identifier records
//!
//! One record exists per `(study_id, identifier)` pair. The record carries two
//! pieces of mutable state:
//!
//! - `health_code`: the participant the identifier is permanently bound to.
//!   Presence is the sole source of truth for "assigned".
//! - `reservation`: the epoch-millisecond instant a lease was taken, if any.
//!
//! A lease is *active* while its timestamp is at or after the lease threshold
//! (`now - lease_duration_ms`). Once a health code is bound the lease is
//! cleared and never consulted again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute the lease threshold for `now`.
///
/// Reservations taken at or after the returned instant are still active.
pub fn lease_threshold(now_ms: i64, lease_duration_ms: u64) -> i64 {
    let duration = i64::try_from(lease_duration_ms).unwrap_or(i64::MAX);
    now_ms.saturating_sub(duration)
}

/// Primary key of an external identifier record
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    /// Partition key: the owning study
    pub study_id: String,
    /// Sort key: the identifier itself
    pub identifier: String,
}

impl RecordKey {
    pub fn new(study_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            study_id: study_id.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.study_id, self.identifier)
    }
}

/// A registered external identifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdRecord {
    /// Owning study (partition key)
    pub study_id: String,

    /// The external identifier (sort key)
    pub identifier: String,

    /// Participant this identifier is bound to, once assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_code: Option<String>,

    /// Epoch millis at which the current lease was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<i64>,
}

impl ExternalIdRecord {
    /// Create a free record: no health code, no lease.
    pub fn new(study_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            study_id: study_id.into(),
            identifier: identifier.into(),
            health_code: None,
            reservation: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.study_id.clone(), self.identifier.clone())
    }

    /// Check if this identifier is permanently bound to a participant
    pub fn is_assigned(&self) -> bool {
        self.health_code.is_some()
    }

    /// Check if an unassigned record holds a lease taken at or after `threshold`
    pub fn has_active_lease(&self, threshold: i64) -> bool {
        self.health_code.is_none() && self.reservation.is_some_and(|at| at >= threshold)
    }

    /// Check if this identifier can't be claimed right now: either assigned,
    /// or leased to someone else.
    ///
    /// This is the operational notion of "assigned" used by listing.
    pub fn is_unavailable(&self, threshold: i64) -> bool {
        self.is_assigned() || self.has_active_lease(threshold)
    }

    /// Return a copy of this record with a lease taken at `now_ms`
    pub fn with_reservation(&self, now_ms: i64) -> Self {
        Self {
            reservation: Some(now_ms),
            ..self.clone()
        }
    }

    /// Return a copy of this record bound to `health_code`, with the lease cleared
    pub fn with_health_code(&self, health_code: impl Into<String>) -> Self {
        Self {
            health_code: Some(health_code.into()),
            reservation: None,
            ..self.clone()
        }
    }

    /// Return a copy of this record with both the binding and the lease cleared
    pub fn released(&self) -> Self {
        Self::new(self.study_id.clone(), self.identifier.clone())
    }
}
