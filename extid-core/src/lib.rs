//! # External ID Core
//!
//! Store-agnostic building blocks for the external identifier registry.
//!
//! This crate provides:
//! - Record types: [`ExternalIdRecord`] and its [`RecordKey`]
//! - Condition values: [`Predicate`] and [`Condition`], used both as
//!   compare-and-swap expectations and as query filters
//! - The [`RecordStore`] adapter trait implemented by concrete backends
//! - An injectable [`Clock`] so lease arithmetic can be driven from tests
//!
//! ## Design Principles
//!
//! 1. **Exclusion lives in the store**: the only mutual exclusion primitive is
//!    a single-record conditional write ([`RecordStore::put_if`])
//! 2. **Conditions are values**: adapters translate [`Condition`] into their
//!    native conditional syntax instead of callers building store expressions
//! 3. **Time is injected**: nothing in the registry reads the wall clock directly

pub mod clock;
pub mod condition;
pub mod error;
pub mod record;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use condition::{Condition, Predicate};
pub use error::{Result, StoreError};
pub use record::{ExternalIdRecord, RecordKey};
pub use store::{BatchFailure, PutOutcome, RecordQuery, RecordStore};
