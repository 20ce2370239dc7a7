//! Study-facing external ID operations
//!
//! [`ExternalIdService`] sits between request handlers and the
//! [`AllocationRegistry`]: it validates administrative input, fills in the
//! default page size, and applies each study's [`StudyPolicy`] to the
//! reserve/assign/unassign steps of participant enrollment.

use crate::error::{RegistryError, Result};
use crate::page::{BulkRegisterOutcome, ExternalIdPage, ListOptions};
use crate::registry::AllocationRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;

/// Longest identifier accepted by [`ExternalIdService::add_external_ids`]
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// How a study uses external identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyPolicy {
    /// Identifiers must come from the registered pool. When off, an external
    /// ID is a free-form participant attribute and the registry is bypassed.
    pub external_id_validation_enabled: bool,
    /// Sign-up without an external ID is rejected
    pub external_id_required_on_signup: bool,
}

impl Default for StudyPolicy {
    fn default() -> Self {
        Self {
            external_id_validation_enabled: true,
            external_id_required_on_signup: false,
        }
    }
}

/// Enrollment failed either in the registry or in the caller's create step
#[derive(Error, Debug)]
pub enum EnrollmentError<E> {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Participant creation failed: {0}")]
    Create(E),
}

/// External ID operations with per-study policy applied
#[derive(Debug, Clone)]
pub struct ExternalIdService {
    registry: AllocationRegistry,
    policies: HashMap<String, StudyPolicy>,
    default_policy: StudyPolicy,
}

impl ExternalIdService {
    pub fn new(registry: AllocationRegistry) -> Self {
        Self {
            registry,
            policies: HashMap::new(),
            default_policy: StudyPolicy::default(),
        }
    }

    /// Set the policy for one study
    pub fn with_policy(mut self, study_id: impl Into<String>, policy: StudyPolicy) -> Self {
        self.policies.insert(study_id.into(), policy);
        self
    }

    /// Set the policy applied to studies without their own
    pub fn with_default_policy(mut self, policy: StudyPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn registry(&self) -> &AllocationRegistry {
        &self.registry
    }

    pub fn policy(&self, study_id: &str) -> StudyPolicy {
        self.policies
            .get(study_id)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// List a page of identifiers, using the configured default page size
    /// when `options` has none
    pub async fn list(&self, study_id: &str, options: &ListOptions) -> Result<ExternalIdPage> {
        let page_size = options
            .page_size
            .unwrap_or(self.registry.config().default_page_size);
        self.registry
            .list(
                study_id,
                options.offset_key.as_deref(),
                page_size,
                options.id_filter.as_deref(),
                options.assignment_filter,
            )
            .await
    }

    /// Validate and register a batch of identifiers
    pub async fn add_external_ids(
        &self,
        study_id: &str,
        identifiers: &[String],
    ) -> Result<BulkRegisterOutcome> {
        if identifiers.is_empty() {
            return Err(RegistryError::bad_request("No external IDs provided"));
        }
        for identifier in identifiers {
            if identifier.trim().is_empty() {
                return Err(RegistryError::bad_request("External ID cannot be blank"));
            }
            if identifier.chars().count() > MAX_IDENTIFIER_LENGTH {
                return Err(RegistryError::bad_request(format!(
                    "External ID is longer than {} characters: {}",
                    MAX_IDENTIFIER_LENGTH, identifier
                )));
            }
        }
        self.registry.bulk_register(study_id, identifiers).await
    }

    pub async fn delete_external_ids(&self, study_id: &str, identifiers: &[String]) -> Result<()> {
        if identifiers.is_empty() {
            return Err(RegistryError::bad_request("No external IDs provided"));
        }
        self.registry.bulk_delete(study_id, identifiers).await
    }

    /// Resolve which identifier the registry should act on, if any
    fn managed<'a>(&self, study_id: &str, external_id: Option<&'a str>) -> Result<Option<&'a str>> {
        let policy = self.policy(study_id);
        if !policy.external_id_validation_enabled {
            return Ok(None);
        }
        match external_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Ok(Some(id)),
            None if policy.external_id_required_on_signup => Err(RegistryError::bad_request(
                "External ID is required for this study",
            )),
            None => Ok(None),
        }
    }

    pub async fn reserve_external_id(&self, study_id: &str, external_id: Option<&str>) -> Result<()> {
        match self.managed(study_id, external_id)? {
            Some(id) => self.registry.reserve(study_id, id).await,
            None => Ok(()),
        }
    }

    pub async fn assign_external_id(
        &self,
        study_id: &str,
        external_id: Option<&str>,
        health_code: &str,
    ) -> Result<()> {
        match self.managed(study_id, external_id)? {
            Some(id) => self.registry.assign(study_id, id, health_code).await,
            None => Ok(()),
        }
    }

    pub async fn unassign_external_id(&self, study_id: &str, external_id: Option<&str>) -> Result<()> {
        match self.managed(study_id, external_id)? {
            Some(id) => self.registry.unassign(study_id, id).await,
            None => Ok(()),
        }
    }

    /// Enroll a participant under an external ID.
    ///
    /// Reserves the identifier, runs `create` (which builds the participant
    /// account), then binds the identifier to `health_code`. If `create`
    /// fails the lease is released right away instead of waiting for expiry.
    pub async fn enroll<T, E, F, Fut>(
        &self,
        study_id: &str,
        external_id: Option<&str>,
        health_code: &str,
        create: F,
    ) -> std::result::Result<T, EnrollmentError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.reserve_external_id(study_id, external_id).await?;

        let created = match create().await {
            Ok(created) => created,
            Err(e) => {
                if let Err(release) = self.unassign_external_id(study_id, external_id).await {
                    tracing::warn!(
                        study_id,
                        error = %release,
                        "Failed to release external ID after enrollment failure"
                    );
                }
                return Err(EnrollmentError::Create(e));
            }
        };

        self.assign_external_id(study_id, external_id, health_code)
            .await?;
        tracing::info!(study_id, "Participant enrolled");
        Ok(created)
    }
}
