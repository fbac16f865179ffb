//! Suggestion model: a proposed address mutation awaiting a decision.
//!
//! # Invariants
//! - `status` starts at `Pending` and moves to `Approved` or `Rejected`
//!   exactly once; terminal states never change again.
//! - `decider_id` and `decided_at` are set iff the status is terminal.
//! - Suggestions are never deleted.

use crate::model::address::{AddressDelta, AddressId};
use crate::model::principal::PrincipalId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type SuggestionId = Uuid;

/// Kind of mutation a suggestion proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Add,
    Modify,
    Remove,
}

impl SuggestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Remove => "remove",
        }
    }

    /// Whether this kind must name an existing target address.
    pub fn requires_target(self) -> bool {
        !matches!(self, Self::Add)
    }
}

pub fn parse_suggestion_kind(value: &str) -> Option<SuggestionKind> {
    match value {
        "add" => Some(SuggestionKind::Add),
        "modify" => Some(SuggestionKind::Modify),
        "remove" => Some(SuggestionKind::Remove),
        _ => None,
    }
}

/// Lifecycle state of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SuggestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl Display for SuggestionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn parse_suggestion_status(value: &str) -> Option<SuggestionStatus> {
    match value {
        "pending" => Some(SuggestionStatus::Pending),
        "approved" => Some(SuggestionStatus::Approved),
        "rejected" => Some(SuggestionStatus::Rejected),
        _ => None,
    }
}

/// Outcome requested by a decider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Approve,
    Reject,
}

impl DecisionOutcome {
    /// Terminal status reached by this outcome.
    pub fn target_status(self) -> SuggestionStatus {
        match self {
            Self::Approve => SuggestionStatus::Approved,
            Self::Reject => SuggestionStatus::Rejected,
        }
    }
}

/// Persisted suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: SuggestionId,
    pub proposer_id: PrincipalId,
    pub kind: SuggestionKind,
    pub status: SuggestionStatus,
    /// For `add`, filled with the created record id once approved.
    pub target_address_id: Option<AddressId>,
    pub payload: AddressDelta,
    /// Free-text justification from the proposer.
    pub detail: Option<String>,
    pub submitted_at: i64,
    pub decider_id: Option<PrincipalId>,
    pub decided_at: Option<i64>,
    pub decision_reason: Option<String>,
}

impl Suggestion {
    /// Builds a fresh pending suggestion with a generated id.
    pub fn pending(
        proposer_id: PrincipalId,
        kind: SuggestionKind,
        payload: AddressDelta,
        target_address_id: Option<AddressId>,
        detail: Option<String>,
        submitted_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            proposer_id,
            kind,
            status: SuggestionStatus::Pending,
            target_address_id,
            payload,
            detail,
            submitted_at,
            decider_id: None,
            decided_at: None,
            decision_reason: None,
        }
    }
}
