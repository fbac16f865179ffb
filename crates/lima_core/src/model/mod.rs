//! Domain model for the address registry core.
//!
//! # Responsibility
//! - Define canonical data structures used by permission, workflow and audit
//!   logic.
//! - Own field-level validation shared by direct edits and suggestions.
//!
//! # Invariants
//! - Address records are identified by a stable integer id and a unique code.
//! - Removal of an address is a soft-delete tombstone; only a purge deletes.
//! - Suggestions, change events, annotations and search log entries carry
//!   stable `Uuid` ids.

pub mod address;
pub mod annotation;
pub mod change_event;
pub mod principal;
pub mod registry;
pub mod search_log;
pub mod suggestion;
pub mod validation;
