//! Capacity and validation policy for the registry

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lease duration: 30 seconds
pub const DEFAULT_LEASE_DURATION_MS: u64 = 30_000;
/// Default maximum number of identifiers per bulk registration
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_MIN_PAGE_SIZE: usize = 1;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Registry configuration
///
/// Every field has a default, so a partial `[registry]` TOML section (or none
/// at all) deserializes into a usable config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long a reservation excludes other callers
    pub lease_duration_ms: u64,
    /// Maximum identifiers accepted by one bulk registration
    pub max_batch_size: usize,
    pub min_page_size: usize,
    pub max_page_size: usize,
    /// Page size used by the service layer when the caller gives none
    pub default_page_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lease_duration_ms: DEFAULT_LEASE_DURATION_MS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            min_page_size: DEFAULT_MIN_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RegistryConfig {
    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration_ms = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_page_size_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_page_size = min;
        self.max_page_size = max;
        self
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    /// Message used when a page size is out of bounds
    pub fn page_size_error(&self) -> String {
        format!(
            "pageSize must be from {}-{} records",
            self.min_page_size, self.max_page_size
        )
    }

    /// Validate configuration at startup
    pub fn validate(&self) -> Result<()> {
        if self.lease_duration_ms == 0 {
            return Err(RegistryError::bad_request(
                "lease_duration_ms must be greater than zero",
            ));
        }
        if self.max_batch_size == 0 {
            return Err(RegistryError::bad_request(
                "max_batch_size must be greater than zero",
            ));
        }
        if self.min_page_size == 0 || self.min_page_size > self.max_page_size {
            return Err(RegistryError::bad_request(format!(
                "invalid page size bounds: min={}, max={}",
                self.min_page_size, self.max_page_size
            )));
        }
        if !(self.min_page_size..=self.max_page_size).contains(&self.default_page_size) {
            return Err(RegistryError::bad_request(format!(
                "default_page_size {} is outside {}-{}",
                self.default_page_size, self.min_page_size, self.max_page_size
            )));
        }
        Ok(())
    }
}
