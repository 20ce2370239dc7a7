//! DynamoDB table schema constants
//!
//! ## Table Schema
//!
//! ```text
//! Table: external-ids (configurable)
//!
//! Primary Key:
//!   - studyId (String, Partition Key)
//!   - identifier (String, Sort Key)
//!
//! Attributes:
//!   - healthCode: String (optional) - bound participant; absent while unassigned
//!   - reservation: Number (optional) - epoch millis the current lease was taken
//! ```
//!
//! A `reservation` of `0` written by older clients means "no lease".

/// Partition key: the owning study
pub const ATTR_STUDY_ID: &str = "studyId";

/// Sort key: the external identifier
pub const ATTR_IDENTIFIER: &str = "identifier";

/// Bound participant's health code
pub const ATTR_HEALTH_CODE: &str = "healthCode";

/// Lease timestamp (epoch milliseconds)
pub const ATTR_RESERVATION: &str = "reservation";

/// Maximum write requests per BatchWriteItem call
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;
