//! Error types for the registry crate

use extid_core::{BatchFailure, StoreError};
use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur in registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No record exists for the identifier
    #[error("External ID not found: {study_id}/{identifier}")]
    NotFound { study_id: String, identifier: String },

    /// A conditional write was rejected: the identifier is leased or assigned
    #[error("External ID is already taken: {study_id}/{identifier}")]
    Conflict { study_id: String, identifier: String },

    /// Invalid arguments (page size, batch size, blank values)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// One or more items of a batch write could not be processed
    #[error("Batch operation failed for {} item(s): {}", .0.len(), join_failures(.0))]
    PartialBatchFailure(Vec<BatchFailure>),

    /// Store adapter error
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn join_failures(failures: &[BatchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RegistryError {
    /// Create a not found error
    pub fn not_found(study_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            study_id: study_id.into(),
            identifier: identifier.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(study_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::Conflict {
            study_id: study_id.into(),
            identifier: identifier.into(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Whether the identifier is simply unavailable, so the caller should pick another one
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
