//! Core error taxonomy returned by every service operation.
//!
//! # Invariants
//! - `Permission` and `Validation` errors surface unchanged to callers.
//! - `Storage` errors mean the transaction rolled back; nothing was applied.

use crate::db::DbError;
use crate::model::address::AddressId;
use crate::model::annotation::AnnotationId;
use crate::model::change_event::ChangeEventId;
use crate::model::registry::{HolderId, OperatorId};
use crate::model::suggestion::{SuggestionId, SuggestionStatus};
use crate::model::validation::ValidationError;
use crate::permission::evaluator::{Action, DenyReason};
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub type CoreResult<T> = Result<T, CoreError>;

/// Identity of a missing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Address(AddressId),
    Suggestion(SuggestionId),
    Annotation(AnnotationId),
    ChangeEvent(ChangeEventId),
    Holder(HolderId),
    OperatorLink {
        address_id: AddressId,
        operator_id: OperatorId,
    },
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address(id) => write!(f, "address {id}"),
            Self::Suggestion(id) => write!(f, "suggestion {id}"),
            Self::Annotation(id) => write!(f, "annotation {id}"),
            Self::ChangeEvent(id) => write!(f, "change event {id}"),
            Self::Holder(id) => write!(f, "holder {id}"),
            Self::OperatorLink {
                address_id,
                operator_id,
            } => write!(f, "operator {operator_id} link on address {address_id}"),
        }
    }
}

/// Transaction failure below the domain layer.
#[derive(Debug)]
pub enum StorageError {
    Repo(RepoError),
    /// Lock wait or transaction exceeded the caller's budget and rolled back.
    Timeout { budget: Duration },
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Timeout { budget } => write!(
                f,
                "storage operation exceeded its {} ms budget and was rolled back",
                budget.as_millis()
            ),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Timeout { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum CoreError {
    /// Insufficient level or ownership.
    Permission { action: Action, reason: DenyReason },
    /// Suggestion is not in the state the operation requires.
    InvalidState {
        suggestion_id: SuggestionId,
        status: SuggestionStatus,
    },
    /// Malformed kind, payload or target reference.
    Validation(ValidationError),
    NotFound(EntityRef),
    /// Unique code clash, stale version or blocked purge.
    Conflict(String),
    Storage(StorageError),
}

impl CoreError {
    /// Stable short code, used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Permission { .. } => "permission",
            Self::InvalidState { .. } => "invalid_state",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Storage(StorageError::Timeout { .. }) => "timeout",
            Self::Storage(StorageError::Repo(_)) => "storage",
        }
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Permission { action, reason } => {
                write!(f, "permission denied for `{action}`: {reason}")
            }
            Self::InvalidState {
                suggestion_id,
                status,
            } => write!(
                f,
                "suggestion {suggestion_id} is {status}; only pending suggestions can be decided"
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for CoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Constraint(message) => Self::Conflict(message),
            other => Self::Storage(StorageError::Repo(other)),
        }
    }
}

impl From<DbError> for CoreError {
    fn from(value: DbError) -> Self {
        Self::Storage(StorageError::Repo(RepoError::Db(value)))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(RepoError::from(value))
    }
}
