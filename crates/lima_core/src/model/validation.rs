//! Validation errors shared by the model and the workflow.

use crate::model::address::AddressId;
use crate::model::suggestion::SuggestionKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Malformed kind, payload or target reference.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `modify`/`remove` submitted without a target address.
    MissingTarget(SuggestionKind),
    /// `add` submitted with a target address.
    UnexpectedTarget(AddressId),
    /// Target address does not exist or is soft-deleted.
    UnresolvableTarget(AddressId),
    /// `add` payload lacks required address fields.
    IncompletePayload { missing: Vec<&'static str> },
    /// `modify` payload (or direct update) changes nothing.
    EmptyDelta,
    /// One field carries an unusable value.
    InvalidField {
        field: &'static str,
        message: String,
    },
}

impl ValidationError {
    pub(crate) fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTarget(kind) => {
                write!(f, "{} suggestion requires a target address", kind.as_str())
            }
            Self::UnexpectedTarget(id) => {
                write!(f, "add suggestion must not reference address {id}")
            }
            Self::UnresolvableTarget(id) => write!(f, "target address {id} cannot be resolved"),
            Self::IncompletePayload { missing } => {
                write!(f, "address payload is missing: {}", missing.join(", "))
            }
            Self::EmptyDelta => write!(f, "change payload does not modify any field"),
            Self::InvalidField { field, message } => write!(f, "invalid `{field}`: {message}"),
        }
    }
}

impl Error for ValidationError {}
