//! Permission-aware reads over the audit trail and the search log.

use crate::error::{CoreError, CoreResult, EntityRef};
use crate::model::address::AddressId;
use crate::model::change_event::{ChangeEvent, ChangeEventId};
use crate::model::principal::{AccessLevel, Principal};
use crate::model::search_log::{QueryKind, SearchLogEntry};
use crate::permission::evaluator::{require, require_at_least, Action};
use crate::repo::audit_repo::{AuditQuery, AuditTrail, ChangeEventFilter};
use crate::repo::search_log_repo::{
    SearchLogFilter, SearchLogRepository, SqliteSearchLogRepository,
};
use crate::service::ServiceSettings;
use rusqlite::Connection;
use std::collections::BTreeMap;

/// Audit read service.
pub struct AuditService<'conn> {
    conn: &'conn Connection,
    trail: AuditTrail<'conn>,
}

impl<'conn> AuditService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_settings(conn, ServiceSettings::default())
    }

    pub fn with_settings(conn: &'conn Connection, settings: ServiceSettings) -> Self {
        Self {
            conn,
            trail: AuditTrail::with_page_size(conn, settings.audit_page_size),
        }
    }

    /// Lazy newest-first event stream.
    ///
    /// Principals below intermediate only see events they caused; asking
    /// for another actor's events is a permission error.
    pub fn list_events(
        &self,
        principal: &Principal,
        filter: ChangeEventFilter,
    ) -> CoreResult<AuditQuery<'conn>> {
        Ok(self.trail.query(scope_filter(principal, filter)?))
    }

    pub fn get_event(&self, principal: &Principal, id: ChangeEventId) -> CoreResult<ChangeEvent> {
        let event = self
            .trail
            .get(id)?
            .ok_or(CoreError::NotFound(EntityRef::ChangeEvent(id)))?;
        require(principal, Action::Read, Some(event.actor_id))?;
        Ok(event)
    }

    /// Events of one address, oldest first, for replaying its history.
    pub fn history_for_address(
        &self,
        principal: &Principal,
        address_id: AddressId,
    ) -> CoreResult<Vec<ChangeEvent>> {
        let events = self.trail.history(address_id)?;
        if principal.has_level(AccessLevel::Intermediate) {
            return Ok(events);
        }
        Ok(events
            .into_iter()
            .filter(|event| event.actor_id == principal.id)
            .collect())
    }

    pub fn count_events(&self, principal: &Principal, filter: ChangeEventFilter) -> CoreResult<u64> {
        Ok(self.trail.count(&scope_filter(principal, filter)?)?)
    }

    /// Raw search log entries. Super only.
    pub fn list_search_logs(
        &self,
        principal: &Principal,
        filter: &SearchLogFilter,
    ) -> CoreResult<Vec<SearchLogEntry>> {
        require_at_least(principal, Action::Read, AccessLevel::Super)?;
        Ok(SqliteSearchLogRepository::new(self.conn).list(filter)?)
    }

    /// Lookup counts per query kind, without parameters.
    pub fn search_stats(&self, principal: &Principal) -> CoreResult<BTreeMap<QueryKind, u64>> {
        require_at_least(principal, Action::Read, AccessLevel::Intermediate)?;
        Ok(SqliteSearchLogRepository::new(self.conn).count_by_kind()?)
    }
}

fn scope_filter(
    principal: &Principal,
    mut filter: ChangeEventFilter,
) -> CoreResult<ChangeEventFilter> {
    if principal.has_level(AccessLevel::Intermediate) {
        return Ok(filter);
    }
    if let Some(actor) = filter.actor_id {
        require(principal, Action::Read, Some(actor))?;
    }
    filter.actor_id = Some(principal.id);
    Ok(filter)
}
