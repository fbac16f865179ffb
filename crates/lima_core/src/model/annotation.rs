//! User-authored annotations attached to address records.

use crate::model::address::AddressId;
use crate::model::principal::PrincipalId;
use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AnnotationId = Uuid;

const MAX_ANNOTATION_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: AnnotationId,
    pub address_id: AddressId,
    pub author_id: PrincipalId,
    pub text: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AnnotationRecord {
    pub fn new(
        address_id: AddressId,
        author_id: PrincipalId,
        text: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            address_id,
            author_id,
            text: text.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Rejects blank or oversized annotation bodies.
pub fn validate_annotation_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::invalid_field("text", "must not be blank"));
    }
    if text.chars().count() > MAX_ANNOTATION_CHARS {
        return Err(ValidationError::invalid_field(
            "text",
            format!("must be at most {MAX_ANNOTATION_CHARS} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_annotation_text;

    #[test]
    fn rejects_blank_and_accepts_plain_text() {
        assert!(validate_annotation_text("  \n").is_err());
        assert!(validate_annotation_text("gate code 1234").is_ok());
        assert!(validate_annotation_text(&"x".repeat(4001)).is_err());
    }
}
