//! AWS storage backends for the external identifier registry
//!
//! - **DynamoDB record store** (`dynamodb` feature): one item per identifier,
//!   partitioned by study, with conditional writes for leases and bindings
//!
//! ## Usage
//!
//! ```ignore
//! use extid_storage_aws::dynamodb::{DynamoDbConfig, DynamoDbRecordStore};
//!
//! let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
//! let store = DynamoDbRecordStore::new(
//!     &sdk_config,
//!     DynamoDbConfig {
//!         table_name: "external-ids".to_string(),
//!         ..Default::default()
//!     },
//! )
//! .await?;
//! let registry = AllocationRegistry::new(Arc::new(store), RegistryConfig::default());
//! ```

pub mod error;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

pub use error::{AwsStorageError, Result};

#[cfg(feature = "dynamodb")]
pub use dynamodb::{BatchRetryConfig, DynamoDbConfig, DynamoDbRecordStore};
