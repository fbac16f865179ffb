//! Change event model: the immutable audit record of one applied mutation.

use crate::model::address::{AddressDelta, AddressId};
use crate::model::principal::PrincipalId;
use crate::model::suggestion::{SuggestionId, SuggestionKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ChangeEventId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Modify,
    /// Soft delete.
    Remove,
    /// Undo of a soft delete.
    Restore,
    /// Permanent deletion of the record row.
    Purge,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Remove => "remove",
            Self::Restore => "restore",
            Self::Purge => "purge",
        }
    }
}

impl From<SuggestionKind> for ChangeKind {
    fn from(value: SuggestionKind) -> Self {
        match value {
            SuggestionKind::Add => Self::Add,
            SuggestionKind::Modify => Self::Modify,
            SuggestionKind::Remove => Self::Remove,
        }
    }
}

pub fn parse_change_kind(value: &str) -> Option<ChangeKind> {
    match value {
        "add" => Some(ChangeKind::Add),
        "modify" => Some(ChangeKind::Modify),
        "remove" => Some(ChangeKind::Remove),
        "restore" => Some(ChangeKind::Restore),
        "purge" => Some(ChangeKind::Purge),
        _ => None,
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: ChangeEventId,
    pub target_address_id: AddressId,
    pub actor_id: PrincipalId,
    pub kind: ChangeKind,
    pub delta: AddressDelta,
    /// Set when the change materialized an approved suggestion.
    pub suggestion_id: Option<SuggestionId>,
    /// Epoch milliseconds; equal to the record's `updated_at` for this change.
    pub occurred_at: i64,
}

impl ChangeEvent {
    pub fn new(
        target_address_id: AddressId,
        actor_id: PrincipalId,
        kind: ChangeKind,
        delta: AddressDelta,
        occurred_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_address_id,
            actor_id,
            kind,
            delta,
            suggestion_id: None,
            occurred_at,
        }
    }

    pub fn from_suggestion(mut self, suggestion_id: SuggestionId) -> Self {
        self.suggestion_id = Some(suggestion_id);
        self
    }
}
