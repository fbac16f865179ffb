//! Suggestion workflow: submission, decision and materialization.
//!
//! # Responsibility
//! - Validate and store proposals from any principal.
//! - Decide pending proposals and, on approval, apply them to the address
//!   store together with their change event.
//!
//! # Invariants
//! - Submission validates kind, target and payload before any permission
//!   check.
//! - A suggestion leaves `pending` exactly once. The transition is a
//!   compare-and-set inside an immediate transaction, so of two racing
//!   deciders one wins and the other sees `InvalidState`.
//! - Approval, materialization and the change event commit together or not
//!   at all; a failed or timed-out decision leaves the suggestion pending.

use crate::clock::SharedClock;
use crate::db::{run_immediate, OpOptions};
use crate::error::{CoreError, CoreResult, EntityRef};
use crate::model::address::{AddressDelta, AddressId, AddressRecord};
use crate::model::change_event::ChangeKind;
use crate::model::principal::{AccessLevel, Principal};
use crate::model::suggestion::{
    DecisionOutcome, Suggestion, SuggestionId, SuggestionKind, SuggestionStatus,
};
use crate::model::validation::ValidationError;
use crate::permission::evaluator::{require, Action};
use crate::repo::address_repo::{AddressRepository, SqliteAddressRepository};
use crate::repo::suggestion_repo::{
    SqliteSuggestionRepository, SuggestionFilter, SuggestionRepository, SuggestionTransition,
};
use crate::service::address_service::{insert_with_event, save_with_event};
use crate::service::ServiceSettings;
use log::{info, warn};
use rusqlite::{Connection, Transaction};
use std::time::Duration;

const MAX_DETAIL_CHARS: usize = 2000;
const EXPIRED_REASON_PREFIX: &str = "expired";

/// Proposal as submitted by a principal.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRequest {
    pub kind: SuggestionKind,
    pub payload: AddressDelta,
    pub target_address_id: Option<AddressId>,
    pub detail: Option<String>,
}

impl SuggestionRequest {
    pub fn add(payload: AddressDelta) -> Self {
        Self {
            kind: SuggestionKind::Add,
            payload,
            target_address_id: None,
            detail: None,
        }
    }

    pub fn modify(target_address_id: AddressId, payload: AddressDelta) -> Self {
        Self {
            kind: SuggestionKind::Modify,
            payload,
            target_address_id: Some(target_address_id),
            detail: None,
        }
    }

    pub fn remove(target_address_id: AddressId) -> Self {
        Self {
            kind: SuggestionKind::Remove,
            payload: AddressDelta::default(),
            target_address_id: Some(target_address_id),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Suggestion workflow service.
pub struct SuggestionService<'conn> {
    conn: &'conn Connection,
    clock: SharedClock,
    settings: ServiceSettings,
}

impl<'conn> SuggestionService<'conn> {
    pub fn new(conn: &'conn Connection, clock: SharedClock) -> Self {
        Self::with_settings(conn, clock, ServiceSettings::default())
    }

    pub fn with_settings(
        conn: &'conn Connection,
        clock: SharedClock,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            conn,
            clock,
            settings,
        }
    }

    /// Stores a pending suggestion.
    ///
    /// # Errors
    /// - `Validation` for a malformed kind/target/payload combination, checked
    ///   first.
    /// - `Permission` when the principal may not create resources.
    pub fn submit(
        &self,
        principal: &Principal,
        request: SuggestionRequest,
        options: OpOptions,
    ) -> CoreResult<Suggestion> {
        self.validate_request(&request)?;
        require(principal, Action::CreateOwn, None)?;

        let suggestion = Suggestion::pending(
            principal.id,
            request.kind,
            request.payload,
            request.target_address_id,
            request.detail,
            self.clock.now_ms(),
        );
        run_immediate(self.conn, options, self.settings.busy_timeout, |tx| {
            SqliteSuggestionRepository::new(tx).insert(&suggestion)?;
            Ok(())
        })?;

        info!(
            "event=suggestion_submit module=service status=ok suggestion_id={} proposer_id={} kind={}",
            suggestion.id,
            principal.id,
            suggestion.kind.as_str()
        );
        Ok(suggestion)
    }

    /// Approves or rejects a pending suggestion.
    ///
    /// Approval applies the payload (create, update or soft delete) and
    /// appends one change event whose actor is the decider. Without an
    /// explicit timeout the configured decide timeout applies.
    pub fn decide(
        &self,
        principal: &Principal,
        id: SuggestionId,
        outcome: DecisionOutcome,
        reason: Option<&str>,
        options: OpOptions,
    ) -> CoreResult<Suggestion> {
        require(principal, Action::Approve, None)?;
        let options = options.or_default_timeout(self.settings.decide_timeout);

        let result = run_immediate(self.conn, options, self.settings.busy_timeout, |tx| {
            self.decide_in_tx(tx, principal, id, outcome, reason)
        });

        match &result {
            Ok(decided) => info!(
                "event=suggestion_decide module=service status=ok suggestion_id={} decider_id={} outcome={} target_address_id={}",
                id,
                principal.id,
                decided.status,
                decided
                    .target_address_id
                    .map(|target| target.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ),
            Err(err) => warn!(
                "event=suggestion_decide module=service status=error suggestion_id={} decider_id={} error_code={}",
                id,
                principal.id,
                err.code()
            ),
        }
        result
    }

    /// Rejects a pending suggestion on behalf of the housekeeping scheduler.
    ///
    /// Goes through the same checks as [`Self::decide`]; the stored reason
    /// starts with `expired`.
    pub fn expire(
        &self,
        principal: &Principal,
        id: SuggestionId,
        reason: Option<&str>,
        options: OpOptions,
    ) -> CoreResult<Suggestion> {
        let reason = match reason {
            Some(detail) => format!("{EXPIRED_REASON_PREFIX}: {detail}"),
            None => EXPIRED_REASON_PREFIX.to_string(),
        };
        self.decide(principal, id, DecisionOutcome::Reject, Some(&reason), options)
    }

    /// Pending suggestions submitted more than `older_than` ago, oldest first.
    pub fn list_stale_pending(
        &self,
        principal: &Principal,
        older_than: Duration,
        limit: Option<u32>,
    ) -> CoreResult<Vec<Suggestion>> {
        require(principal, Action::Approve, None)?;
        let age_ms = i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.clock.now_ms().saturating_sub(age_ms);
        Ok(SqliteSuggestionRepository::new(self.conn).list_pending_before(cutoff, limit)?)
    }

    /// Reads one suggestion. Basic principals may only read their own.
    pub fn get(&self, principal: &Principal, id: SuggestionId) -> CoreResult<Suggestion> {
        let suggestion = SqliteSuggestionRepository::new(self.conn)
            .get(id)?
            .ok_or(CoreError::NotFound(EntityRef::Suggestion(id)))?;
        require(principal, Action::Read, Some(suggestion.proposer_id))?;
        Ok(suggestion)
    }

    /// Lists suggestions, newest first. For basic principals the filter is
    /// narrowed to their own proposals.
    pub fn list(&self, principal: &Principal, filter: &SuggestionFilter) -> CoreResult<Vec<Suggestion>> {
        let mut filter = filter.clone();
        if !principal.has_level(AccessLevel::Intermediate) {
            filter.proposer_id = Some(principal.id);
        }
        Ok(SqliteSuggestionRepository::new(self.conn).list(&filter)?)
    }

    fn validate_request(&self, request: &SuggestionRequest) -> CoreResult<()> {
        if let Some(detail) = request.detail.as_deref() {
            if detail.chars().count() > MAX_DETAIL_CHARS {
                return Err(ValidationError::invalid_field(
                    "detail",
                    format!("must be at most {MAX_DETAIL_CHARS} characters"),
                )
                .into());
            }
        }

        match (request.kind, request.target_address_id) {
            (SuggestionKind::Add, Some(target)) => {
                Err(ValidationError::UnexpectedTarget(target).into())
            }
            (SuggestionKind::Add, None) => {
                request.payload.to_new_address()?;
                Ok(())
            }
            (kind, None) => Err(ValidationError::MissingTarget(kind).into()),
            (SuggestionKind::Modify, Some(target)) => {
                if request.payload.is_empty() {
                    return Err(ValidationError::EmptyDelta.into());
                }
                request.payload.validate()?;
                self.resolve_target(self.conn, target)?;
                Ok(())
            }
            (SuggestionKind::Remove, Some(target)) => {
                request.payload.validate()?;
                self.resolve_target(self.conn, target)?;
                Ok(())
            }
        }
    }

    fn resolve_target(&self, conn: &Connection, target: AddressId) -> CoreResult<AddressRecord> {
        SqliteAddressRepository::new(conn)
            .get(target, false)?
            .ok_or_else(|| ValidationError::UnresolvableTarget(target).into())
    }

    fn decide_in_tx(
        &self,
        tx: &Transaction<'_>,
        principal: &Principal,
        id: SuggestionId,
        outcome: DecisionOutcome,
        reason: Option<&str>,
    ) -> CoreResult<Suggestion> {
        let repo = SqliteSuggestionRepository::new(tx);
        let suggestion = repo
            .get(id)?
            .ok_or(CoreError::NotFound(EntityRef::Suggestion(id)))?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(CoreError::InvalidState {
                suggestion_id: id,
                status: suggestion.status,
            });
        }

        let now = self.clock.now_ms();
        let resolved_target = match outcome {
            DecisionOutcome::Approve => Some(self.materialize(tx, principal, &suggestion, now)?),
            DecisionOutcome::Reject => None,
        };

        let transition = SuggestionTransition {
            status: outcome.target_status(),
            decider_id: principal.id,
            decided_at: now,
            reason,
            resolved_target,
        };
        if !repo.transition(id, &transition)? {
            let status = repo
                .get(id)?
                .map(|current| current.status)
                .unwrap_or(suggestion.status);
            return Err(CoreError::InvalidState {
                suggestion_id: id,
                status,
            });
        }

        repo.get(id)?
            .ok_or(CoreError::NotFound(EntityRef::Suggestion(id)))
    }

    /// Applies an approved suggestion and returns the affected address id.
    fn materialize(
        &self,
        tx: &Transaction<'_>,
        principal: &Principal,
        suggestion: &Suggestion,
        now: i64,
    ) -> CoreResult<AddressId> {
        let payload = &suggestion.payload;
        let record = match (suggestion.kind, suggestion.target_address_id) {
            (SuggestionKind::Add, _) => {
                let address = payload.to_new_address()?;
                insert_with_event(tx, &address, principal.id, now, Some(suggestion.id))?
            }
            (kind, None) => return Err(ValidationError::MissingTarget(kind).into()),
            (SuggestionKind::Modify, Some(target)) => {
                payload.validate()?;
                let mut record = self.resolve_target(tx, target)?;
                payload.apply_to(&mut record);
                save_with_event(
                    tx,
                    &record,
                    ChangeKind::Modify,
                    payload,
                    principal.id,
                    now,
                    Some(suggestion.id),
                )?
            }
            (SuggestionKind::Remove, Some(target)) => {
                let mut record = self.resolve_target(tx, target)?;
                record.is_deleted = true;
                save_with_event(
                    tx,
                    &record,
                    ChangeKind::Remove,
                    &AddressDelta::default(),
                    principal.id,
                    now,
                    Some(suggestion.id),
                )?
            }
        };
        Ok(record.id)
    }
}
