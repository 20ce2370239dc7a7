//! Request and result types for listing and bulk registration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filter name reported when an identifier prefix was applied
pub const ID_FILTER: &str = "idFilter";
/// Filter name reported when an assignment filter was applied
pub const ASSIGNMENT_FILTER: &str = "assignmentFilter";

/// One listed identifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdInfo {
    pub identifier: String,
    /// Bound to a participant, or leased and not yet expired
    pub assigned: bool,
}

impl ExternalIdInfo {
    pub fn new(identifier: impl Into<String>, assigned: bool) -> Self {
        Self {
            identifier: identifier.into(),
            assigned,
        }
    }
}

/// Parameters of a paginated listing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Identifier of the last item of the previous page
    pub offset_key: Option<String>,
    /// Page size; the service layer substitutes its default when `None`
    pub page_size: Option<usize>,
    /// Identifier prefix
    pub id_filter: Option<String>,
    /// `Some(true)` lists unavailable identifiers, `Some(false)` claimable ones
    pub assignment_filter: Option<bool>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_offset_key(mut self, offset_key: impl Into<String>) -> Self {
        self.offset_key = Some(offset_key.into());
        self
    }

    pub fn with_id_filter(mut self, id_filter: impl Into<String>) -> Self {
        self.id_filter = Some(id_filter.into());
        self
    }

    pub fn with_assignment_filter(mut self, assigned: bool) -> Self {
        self.assignment_filter = Some(assigned);
        self
    }
}

/// One page of identifiers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdPage {
    pub items: Vec<ExternalIdInfo>,
    /// Offset key for the next page; `None` on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_key: Option<String>,
    pub page_size: usize,
    /// Count of all matching identifiers. Approximate: served from an
    /// eventually-consistent read path.
    pub total: usize,
    /// Filters that shaped this page, by name
    pub filters: BTreeMap<String, String>,
}

impl ExternalIdPage {
    pub fn has_more(&self) -> bool {
        self.offset_key.is_some()
    }
}

/// What a bulk registration did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRegisterOutcome {
    /// Identifiers newly written
    pub registered: Vec<String>,
    /// Identifiers that already existed and were left untouched
    pub skipped: Vec<String>,
}
