//! # External ID Registry
//!
//! Allocates study-scoped external identifiers to enrolling participants
//! without double-booking, using leases and single-record conditional writes.
//!
//! ## Lifecycle of an identifier
//!
//! ```text
//! bulk_register            reserve                  assign
//!   ──────────► [free] ──────────► [leased] ──────────► [bound]
//!                 ▲                    │ lease expires     │
//!                 └────────────────────┘                   │
//!                 ▲             unassign                   │
//!                 └────────────────────────────────────────┘
//! ```
//!
//! ## Store backends
//!
//! - [`MemoryRecordStore`]: in-process, for tests and embedding
//! - [`FileRecordStore`]: one JSON document per study, `flock`-serialized
//!   writes (`native` feature)
//! - DynamoDB lives in the `extid-storage-aws` crate
//!
//! ## Example
//!
//! ```ignore
//! let registry = AllocationRegistry::new(Arc::new(MemoryRecordStore::new()), RegistryConfig::default());
//! registry.bulk_register("study", &["AAA".to_string()]).await?;
//! registry.reserve("study", "AAA").await?;
//! registry.assign("study", "AAA", "health-code").await?;
//! ```

pub mod config;
pub mod error;
#[cfg(feature = "native")]
pub mod file;
pub mod memory;
pub mod page;
pub mod registry;
pub mod service;

pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
#[cfg(feature = "native")]
pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use page::{BulkRegisterOutcome, ExternalIdInfo, ExternalIdPage, ListOptions};
pub use registry::AllocationRegistry;
pub use service::{EnrollmentError, ExternalIdService, StudyPolicy, MAX_IDENTIFIER_LENGTH};
