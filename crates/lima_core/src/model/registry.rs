//! Holder and operator registries.
//!
//! # Responsibility
//! - Describe the tower owners (`holders`) an address may point at through
//!   `holder_id`.
//! - Describe carriers (`operators`) and their per-site links, each carrying
//!   the code the carrier uses internally for that site.
//!
//! # Invariants
//! - Holder and operator codes are unique, compared case-insensitively.
//! - An address links to a given operator at most once.

use crate::model::address::{validate_code, validate_text, AddressId};
use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};

pub type HolderId = i64;
pub type OperatorId = i64;

/// Tower owner (for example `SBA` or `American Tower`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub id: HolderId,
    pub code: String,
    pub name: String,
    /// Network operations centre contact.
    pub noc_phone: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewHolder {
    pub code: String,
    pub name: String,
    pub noc_phone: String,
}

impl NewHolder {
    pub fn new(code: &str, name: &str, noc_phone: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            noc_phone: noc_phone.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_code("code", &self.code)?;
        validate_text("name", &self.name, true)?;
        validate_text("noc_phone", &self.noc_phone, true)
    }
}

/// Carrier serving one or more sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub code: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewOperator {
    pub code: String,
    pub name: String,
}

impl NewOperator {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_code("code", &self.code)?;
        validate_text("name", &self.name, true)
    }
}

/// One operator present at one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorLink {
    pub address_id: AddressId,
    pub operator: Operator,
    /// Code the operator assigns to this site in its own inventory.
    pub operator_code: String,
    pub linked_at: i64,
}

#[cfg(test)]
mod tests {
    use super::{NewHolder, NewOperator};
    use crate::model::validation::ValidationError;

    #[test]
    fn holder_requires_code_name_and_phone() {
        assert!(NewHolder::new("SBA", "SBA Torres", "+55 84 3000-0000")
            .validate()
            .is_ok());
        assert!(matches!(
            NewHolder::new("SBA", "SBA Torres", " ").validate(),
            Err(ValidationError::InvalidField {
                field: "noc_phone",
                ..
            })
        ));
        assert!(matches!(
            NewHolder::new("no spaces", "x", "1").validate(),
            Err(ValidationError::InvalidField { field: "code", .. })
        ));
    }

    #[test]
    fn operator_rejects_blank_name() {
        assert!(matches!(
            NewOperator::new("TIM", "").validate(),
            Err(ValidationError::InvalidField { field: "name", .. })
        ));
    }
}
