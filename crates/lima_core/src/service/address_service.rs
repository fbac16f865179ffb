//! Direct address mutations and lookups.
//!
//! # Responsibility
//! - Create, update, soft-delete, restore and purge address records for
//!   principals allowed to edit directly.
//! - Serve lookups and record them in the search log.
//!
//! # Invariants
//! - Each mutation writes the record and exactly one change event in one
//!   immediate transaction; the event's `occurred_at` equals the record's
//!   new `updated_at`.
//! - Basic principals cannot mutate directly; they go through suggestions.
//! - Purge is super-only and refuses records that still have annotations
//!   or pending suggestions.
//! - A `holder_id` written through any path names a registered holder.

use crate::clock::SharedClock;
use crate::db::{run_immediate, OpOptions};
use crate::error::{CoreError, CoreResult, EntityRef};
use crate::model::address::{AddressDelta, AddressId, AddressRecord, NewAddress};
use crate::model::registry::HolderId;
use crate::model::change_event::{ChangeEvent, ChangeKind};
use crate::model::principal::{AccessLevel, Principal, PrincipalId};
use crate::model::search_log::{QueryKind, SearchParameters};
use crate::model::suggestion::SuggestionId;
use crate::model::validation::ValidationError;
use crate::permission::evaluator::{require, Action};
use crate::repo::address_repo::{AddressQuery, AddressRepository, SqliteAddressRepository};
use crate::repo::audit_repo;
use crate::repo::registry_repo::{RegistryRepository, SqliteRegistryRepository};
use crate::repo::search_log_repo::SqliteSearchLogRepository;
use crate::service::search_log::SearchLogRecorder;
use crate::service::ServiceSettings;
use log::info;
use rusqlite::{Connection, Transaction};

/// Address use-case service.
pub struct AddressService<'conn> {
    conn: &'conn Connection,
    clock: SharedClock,
    settings: ServiceSettings,
    search_log: SearchLogRecorder<SqliteSearchLogRepository<'conn>>,
}

impl<'conn> AddressService<'conn> {
    pub fn new(conn: &'conn Connection, clock: SharedClock) -> Self {
        Self::with_settings(conn, clock, ServiceSettings::default())
    }

    pub fn with_settings(
        conn: &'conn Connection,
        clock: SharedClock,
        settings: ServiceSettings,
    ) -> Self {
        let search_log =
            SearchLogRecorder::new(SqliteSearchLogRepository::new(conn), clock.clone())
                .with_enabled(settings.search_log_enabled);
        Self {
            conn,
            clock,
            settings,
            search_log,
        }
    }

    /// Search log recorder used by lookups.
    pub fn search_log(&self) -> &SearchLogRecorder<SqliteSearchLogRepository<'conn>> {
        &self.search_log
    }

    pub fn create(
        &self,
        principal: &Principal,
        address: &NewAddress,
        options: OpOptions,
    ) -> CoreResult<AddressRecord> {
        address.validate()?;
        require(principal, Action::EditAny, None)?;

        let record = self.write(options, |tx| {
            let now = self.clock.now_ms();
            insert_with_event(tx, address, principal.id, now, None)
        })?;
        info!(
            "event=address_create module=service status=ok actor_id={} address_id={}",
            principal.id, record.id
        );
        Ok(record)
    }

    /// Applies `delta` to an active record. With `expected_version`, a record
    /// changed since that version fails with `Conflict`.
    pub fn update(
        &self,
        principal: &Principal,
        id: AddressId,
        delta: &AddressDelta,
        expected_version: Option<i64>,
        options: OpOptions,
    ) -> CoreResult<AddressRecord> {
        if delta.is_empty() {
            return Err(ValidationError::EmptyDelta.into());
        }
        delta.validate()?;
        require(principal, Action::EditAny, None)?;

        let record = self.write(options, |tx| {
            let mut record = load_active(tx, id)?;
            if let Some(expected) = expected_version {
                if record.version != expected {
                    return Err(CoreError::conflict(format!(
                        "address {id} is at version {}, expected {expected}",
                        record.version
                    )));
                }
            }
            delta.apply_to(&mut record);
            let now = self.clock.now_ms();
            save_with_event(tx, &record, ChangeKind::Modify, delta, principal.id, now, None)
        })?;
        info!(
            "event=address_update module=service status=ok actor_id={} address_id={} version={}",
            principal.id, record.id, record.version
        );
        Ok(record)
    }

    /// Soft-deletes an active record.
    pub fn remove(
        &self,
        principal: &Principal,
        id: AddressId,
        options: OpOptions,
    ) -> CoreResult<AddressRecord> {
        require(principal, Action::EditAny, None)?;

        let record = self.write(options, |tx| {
            let mut record = load_active(tx, id)?;
            record.is_deleted = true;
            let now = self.clock.now_ms();
            save_with_event(
                tx,
                &record,
                ChangeKind::Remove,
                &AddressDelta::default(),
                principal.id,
                now,
                None,
            )
        })?;
        info!(
            "event=address_remove module=service status=ok actor_id={} address_id={}",
            principal.id, record.id
        );
        Ok(record)
    }

    /// Undoes a soft delete.
    pub fn restore(
        &self,
        principal: &Principal,
        id: AddressId,
        options: OpOptions,
    ) -> CoreResult<AddressRecord> {
        require(principal, Action::EditAny, None)?;

        let record = self.write(options, |tx| {
            let mut record = SqliteAddressRepository::new(tx)
                .get(id, true)?
                .ok_or(CoreError::NotFound(EntityRef::Address(id)))?;
            if record.is_active() {
                return Err(CoreError::conflict(format!("address {id} is not deleted")));
            }
            record.is_deleted = false;
            let now = self.clock.now_ms();
            save_with_event(
                tx,
                &record,
                ChangeKind::Restore,
                &AddressDelta::default(),
                principal.id,
                now,
                None,
            )
        })?;
        info!(
            "event=address_restore module=service status=ok actor_id={} address_id={}",
            principal.id, record.id
        );
        Ok(record)
    }

    /// Permanently deletes a record row. Its change events stay.
    pub fn purge(&self, principal: &Principal, id: AddressId, options: OpOptions) -> CoreResult<()> {
        require(principal, Action::DeleteAny, None)?;

        self.write(options, |tx| {
            let repo = SqliteAddressRepository::new(tx);
            let record = repo
                .get(id, true)?
                .ok_or(CoreError::NotFound(EntityRef::Address(id)))?;
            let dependents = repo.dependents(id)?;
            if !dependents.is_empty() {
                return Err(CoreError::conflict(format!(
                    "address {id} still has {} annotation(s) and {} pending suggestion(s)",
                    dependents.annotations, dependents.pending_suggestions
                )));
            }
            if !repo.purge(id)? {
                return Err(CoreError::NotFound(EntityRef::Address(id)));
            }
            let event = ChangeEvent::new(
                id,
                principal.id,
                ChangeKind::Purge,
                AddressDelta {
                    code: Some(record.code),
                    ..AddressDelta::default()
                },
                self.clock.now_ms(),
            );
            audit_repo::append(tx, &event)?;
            Ok(())
        })?;
        info!(
            "event=address_purge module=service status=ok actor_id={} address_id={}",
            principal.id, id
        );
        Ok(())
    }

    /// Returns an active record.
    pub fn get(&self, principal: &Principal, id: AddressId) -> CoreResult<AddressRecord> {
        require(principal, Action::Read, None)?;
        self.search_log.record(
            principal,
            QueryKind::ById,
            SearchParameters::from([("id".to_string(), id.to_string())]),
        );
        SqliteAddressRepository::new(self.conn)
            .get(id, false)?
            .ok_or(CoreError::NotFound(EntityRef::Address(id)))
    }

    /// Returns the active record carrying `code`, if any.
    pub fn get_by_code(&self, principal: &Principal, code: &str) -> CoreResult<Option<AddressRecord>> {
        require(principal, Action::Read, None)?;
        self.search_log.record(
            principal,
            QueryKind::ByCode,
            SearchParameters::from([("code".to_string(), code.to_string())]),
        );
        Ok(SqliteAddressRepository::new(self.conn).get_by_code(code, false)?)
    }

    /// Filtered lookup. Deleted records are only listed for principals who
    /// may edit any record; for others the flag is ignored.
    pub fn search(&self, principal: &Principal, query: &AddressQuery) -> CoreResult<Vec<AddressRecord>> {
        require(principal, Action::Read, None)?;
        if let Some(bounds) = &query.bounds {
            bounds.validate()?;
        }
        let mut query = query.clone();
        if query.include_deleted && !principal.has_level(AccessLevel::Intermediate) {
            query.include_deleted = false;
        }

        let (kind, parameters) = describe_query(&query);
        self.search_log.record(principal, kind, parameters);
        Ok(SqliteAddressRepository::new(self.conn).search(&query)?)
    }

    fn write<T>(
        &self,
        options: OpOptions,
        body: impl FnOnce(&Transaction<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        run_immediate(self.conn, options, self.settings.busy_timeout, body)
    }
}

/// Inserts a record and its `add` event inside `tx`.
pub(crate) fn insert_with_event(
    tx: &Transaction<'_>,
    address: &NewAddress,
    actor_id: PrincipalId,
    now: i64,
    suggestion_id: Option<SuggestionId>,
) -> CoreResult<AddressRecord> {
    let repo = SqliteAddressRepository::new(tx);
    if repo.get_by_code(&address.code, true)?.is_some() {
        return Err(CoreError::conflict(format!(
            "address code `{}` already exists",
            address.code
        )));
    }
    if let Some(holder_id) = address.holder_id {
        ensure_holder(tx, holder_id)?;
    }
    let record = repo.insert(address, now)?;

    let mut event = ChangeEvent::new(
        record.id,
        actor_id,
        ChangeKind::Add,
        AddressDelta::from(address),
        now,
    );
    event.suggestion_id = suggestion_id;
    audit_repo::append(tx, &event)?;
    Ok(record)
}

/// Persists `record` (carrying the version it was read at) and appends one
/// event of `kind` inside `tx`.
pub(crate) fn save_with_event(
    tx: &Transaction<'_>,
    record: &AddressRecord,
    kind: ChangeKind,
    delta: &AddressDelta,
    actor_id: PrincipalId,
    now: i64,
    suggestion_id: Option<SuggestionId>,
) -> CoreResult<AddressRecord> {
    if let Some(holder_id) = delta.holder_id {
        ensure_holder(tx, holder_id)?;
    }
    let saved = SqliteAddressRepository::new(tx)
        .save(record, now)?
        .ok_or_else(|| {
            CoreError::conflict(format!(
                "address {} changed after version {}",
                record.id, record.version
            ))
        })?;

    let mut event = ChangeEvent::new(saved.id, actor_id, kind, delta.clone(), now);
    event.suggestion_id = suggestion_id;
    audit_repo::append(tx, &event)?;
    Ok(saved)
}

fn load_active(conn: &Connection, id: AddressId) -> CoreResult<AddressRecord> {
    SqliteAddressRepository::new(conn)
        .get(id, false)?
        .ok_or(CoreError::NotFound(EntityRef::Address(id)))
}

fn ensure_holder(conn: &Connection, holder_id: HolderId) -> CoreResult<()> {
    if SqliteRegistryRepository::new(conn)
        .get_holder(holder_id)?
        .is_none()
    {
        return Err(ValidationError::invalid_field(
            "holder_id",
            format!("holder {holder_id} is not registered"),
        )
        .into());
    }
    Ok(())
}

fn describe_query(query: &AddressQuery) -> (QueryKind, SearchParameters) {
    let mut parameters = SearchParameters::new();
    let text_fields = [
        ("code", &query.code),
        ("operator_code", &query.operator_code),
        ("holder_code", &query.holder_code),
        ("uf", &query.uf),
        ("municipality", &query.municipality),
        ("district", &query.district),
        ("street", &query.street),
        ("postal_code", &query.postal_code),
    ];
    for (name, value) in text_fields {
        if let Some(value) = value {
            parameters.insert(name.to_string(), value.clone());
        }
    }
    if let Some(holder_id) = query.holder_id {
        parameters.insert("holder_id".to_string(), holder_id.to_string());
    }
    if let Some(bounds) = query.bounds {
        parameters.insert(
            "bounds".to_string(),
            format!(
                "{},{},{},{}",
                bounds.south, bounds.west, bounds.north, bounds.east
            ),
        );
    }

    let kind = if query.code.is_some() {
        QueryKind::ByCode
    } else if query.operator_code.is_some() {
        QueryKind::ByOperator
    } else if query.holder_id.is_some() || query.holder_code.is_some() {
        QueryKind::ByHolder
    } else if query.postal_code.is_some() {
        QueryKind::ByPostalCode
    } else if query.bounds.is_some() {
        QueryKind::ByCoordinates
    } else if query.street.is_some() {
        QueryKind::ByStreet
    } else if query.district.is_some() {
        QueryKind::ByDistrict
    } else if query.municipality.is_some() || query.uf.is_some() {
        QueryKind::ByMunicipality
    } else {
        QueryKind::Listing
    };
    (kind, parameters)
}
