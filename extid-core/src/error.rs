//! Error types for store adapters

use thiserror::Error;

/// Result type for store adapter operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a [`RecordStore`](crate::RecordStore) implementation.
///
/// A rejected conditional write is *not* an error; it is reported through
/// [`PutOutcome::ConditionFailed`](crate::PutOutcome::ConditionFailed).
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Throttled - the backend asked us to slow down
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create an I/O error
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create a throttled error
    pub fn throttled(msg: impl Into<String>) -> Self {
        Self::Throttled(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_constructors() {
        assert!(matches!(StoreError::io("x"), StoreError::Io(_)));
        assert!(matches!(StoreError::throttled("x"), StoreError::Throttled(_)));
        assert!(matches!(StoreError::backend("x"), StoreError::Backend(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let err: StoreError = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert_eq!(err.to_string(), "I/O error: disk gone");
    }
}
