//! Principal and access level model.
//!
//! # Invariants
//! - Access levels are totally ordered by rank: basic < intermediate < super.
//! - A principal is resolved upstream and never changes within a request.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable identifier of an authenticated actor.
pub type PrincipalId = i64;

/// Hierarchical access tier of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// May read shared data and manage only their own resources.
    Basic,
    /// May edit any record and decide suggestions.
    Intermediate,
    /// May additionally delete foreign resources and purge records.
    Super,
}

impl AccessLevel {
    /// Numeric rank used for "at least this level" comparisons.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Basic => 1,
            Self::Intermediate => 2,
            Self::Super => 3,
        }
    }

    /// Returns whether this level is `required` or higher.
    pub const fn at_least(self, required: AccessLevel) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Intermediate => "intermediate",
            Self::Super => "super",
        }
    }
}

impl Display for AccessLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses an access level from its stable string form.
pub fn parse_access_level(value: &str) -> Option<AccessLevel> {
    match value.trim() {
        "basic" => Some(AccessLevel::Basic),
        "intermediate" => Some(AccessLevel::Intermediate),
        "super" => Some(AccessLevel::Super),
        _ => None,
    }
}

/// Authenticated actor passed explicitly into every core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub access_level: AccessLevel,
}

impl Principal {
    pub fn new(id: PrincipalId, access_level: AccessLevel) -> Self {
        Self { id, access_level }
    }

    pub fn basic(id: PrincipalId) -> Self {
        Self::new(id, AccessLevel::Basic)
    }

    pub fn intermediate(id: PrincipalId) -> Self {
        Self::new(id, AccessLevel::Intermediate)
    }

    pub fn super_user(id: PrincipalId) -> Self {
        Self::new(id, AccessLevel::Super)
    }

    /// Shorthand for `self.access_level.at_least(required)`.
    pub fn has_level(&self, required: AccessLevel) -> bool {
        self.access_level.at_least(required)
    }
}
