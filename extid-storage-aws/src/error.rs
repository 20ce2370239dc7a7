//! Error types for AWS storage backends

use extid_core::StoreError;
use thiserror::Error;

/// Errors from AWS storage operations
#[derive(Debug, Error)]
pub enum AwsStorageError {
    /// I/O or network error
    #[error("I/O error: {0}")]
    Io(String),

    /// Throttled - provisioned throughput or request rate exceeded
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An item in the table doesn't have the expected shape
    #[error("Malformed item: {0}")]
    MalformedItem(String),

    /// DynamoDB SDK error
    #[cfg(feature = "dynamodb")]
    #[error("DynamoDB error: {0}")]
    DynamoDB(String),
}

impl AwsStorageError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn throttled(msg: impl Into<String>) -> Self {
        Self::Throttled(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn malformed_item(msg: impl Into<String>) -> Self {
        Self::MalformedItem(msg.into())
    }

    #[cfg(feature = "dynamodb")]
    pub fn dynamodb(msg: impl Into<String>) -> Self {
        Self::DynamoDB(msg.into())
    }
}

/// Result type for AWS storage operations
pub type Result<T> = std::result::Result<T, AwsStorageError>;

// Surface as store adapter errors
impl From<AwsStorageError> for StoreError {
    fn from(err: AwsStorageError) -> Self {
        match err {
            AwsStorageError::Io(msg) => StoreError::io(msg),
            AwsStorageError::Throttled(msg) => StoreError::throttled(msg),
            _ => StoreError::backend(err.to_string()),
        }
    }
}
