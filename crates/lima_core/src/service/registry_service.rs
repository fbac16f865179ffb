//! Holder and operator registry use cases.
//!
//! # Invariants
//! - Registering holders and operators is super-only.
//! - Linking or unlinking an operator requires direct edit rights and an
//!   active address.
//! - Links are site metadata; they do not bump the address version or
//!   append change events.

use crate::clock::SharedClock;
use crate::db::{run_immediate, OpOptions};
use crate::error::{CoreError, CoreResult, EntityRef};
use crate::model::address::{validate_code, AddressId};
use crate::model::principal::{AccessLevel, Principal};
use crate::model::registry::{
    Holder, HolderId, NewHolder, NewOperator, Operator, OperatorLink,
};
use crate::model::validation::ValidationError;
use crate::permission::evaluator::{require, require_at_least, Action};
use crate::repo::address_repo::{AddressRepository, SqliteAddressRepository};
use crate::repo::registry_repo::{RegistryRepository, SqliteRegistryRepository};
use crate::service::ServiceSettings;
use log::info;
use rusqlite::{Connection, Transaction};

/// Registry service facade.
pub struct RegistryService<'conn> {
    conn: &'conn Connection,
    clock: SharedClock,
    settings: ServiceSettings,
}

impl<'conn> RegistryService<'conn> {
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

    fn repo(&self) -> SqliteRegistryRepository<'conn> {
        SqliteRegistryRepository::new(self.conn)
    }

    pub fn create_holder(&self, principal: &Principal, holder: &NewHolder) -> CoreResult<Holder> {
        holder.validate()?;
        require_at_least(principal, Action::EditAny, AccessLevel::Super)?;

        let created = self.repo().insert_holder(holder, self.clock.now_ms())?;
        info!(
            "event=holder_create module=service status=ok actor_id={} holder_id={}",
            principal.id, created.id
        );
        Ok(created)
    }

    pub fn get_holder(&self, principal: &Principal, id: HolderId) -> CoreResult<Holder> {
        require(principal, Action::Read, None)?;
        self.repo()
            .get_holder(id)?
            .ok_or(CoreError::NotFound(EntityRef::Holder(id)))
    }

    pub fn get_holder_by_code(&self, principal: &Principal, code: &str) -> CoreResult<Option<Holder>> {
        require(principal, Action::Read, None)?;
        Ok(self.repo().get_holder_by_code(code)?)
    }

    pub fn list_holders(&self, principal: &Principal, limit: Option<u32>) -> CoreResult<Vec<Holder>> {
        require(principal, Action::Read, None)?;
        Ok(self.repo().list_holders(limit)?)
    }

    pub fn create_operator(
        &self,
        principal: &Principal,
        operator: &NewOperator,
    ) -> CoreResult<Operator> {
        operator.validate()?;
        require_at_least(principal, Action::EditAny, AccessLevel::Super)?;

        let created = self.repo().insert_operator(operator, self.clock.now_ms())?;
        info!(
            "event=operator_create module=service status=ok actor_id={} operator_id={}",
            principal.id, created.id
        );
        Ok(created)
    }

    pub fn list_operators(
        &self,
        principal: &Principal,
        limit: Option<u32>,
    ) -> CoreResult<Vec<Operator>> {
        require(principal, Action::Read, None)?;
        Ok(self.repo().list_operators(limit)?)
    }

    /// Records that `operator` (by code) serves the address under the
    /// site code `operator_code`.
    ///
    /// # Errors
    /// - `Validation` for a malformed site code or an unknown operator.
    /// - `NotFound` when the address is missing or deleted.
    /// - `Conflict` when the address already links to that operator.
    pub fn link_operator(
        &self,
        principal: &Principal,
        address_id: AddressId,
        operator: &str,
        operator_code: &str,
        options: OpOptions,
    ) -> CoreResult<OperatorLink> {
        validate_code("operator_code", operator_code)?;
        require(principal, Action::EditAny, None)?;

        let link = self.write(options, |tx| {
            ensure_active(tx, address_id)?;
            let repo = SqliteRegistryRepository::new(tx);
            let operator = find_operator(&repo, operator)?;
            let now = self.clock.now_ms();
            repo.link(address_id, operator.id, operator_code, now)
                .map_err(|err| match CoreError::from(err) {
                    CoreError::Conflict(_) => CoreError::conflict(format!(
                        "address {address_id} already links to operator `{}`",
                        operator.code
                    )),
                    other => other,
                })?;
            Ok(OperatorLink {
                address_id,
                operator,
                operator_code: operator_code.to_string(),
                linked_at: now,
            })
        })?;
        info!(
            "event=operator_link module=service status=ok actor_id={} address_id={} operator_id={}",
            principal.id, address_id, link.operator.id
        );
        Ok(link)
    }

    pub fn unlink_operator(
        &self,
        principal: &Principal,
        address_id: AddressId,
        operator: &str,
        options: OpOptions,
    ) -> CoreResult<()> {
        require(principal, Action::EditAny, None)?;

        let operator_id = self.write(options, |tx| {
            ensure_active(tx, address_id)?;
            let repo = SqliteRegistryRepository::new(tx);
            let operator = find_operator(&repo, operator)?;
            if !repo.unlink(address_id, operator.id)? {
                return Err(CoreError::NotFound(EntityRef::OperatorLink {
                    address_id,
                    operator_id: operator.id,
                }));
            }
            Ok(operator.id)
        })?;
        info!(
            "event=operator_unlink module=service status=ok actor_id={} address_id={} operator_id={}",
            principal.id, address_id, operator_id
        );
        Ok(())
    }

    /// Operators serving an address, ordered by operator code.
    pub fn operators_for_address(
        &self,
        principal: &Principal,
        address_id: AddressId,
    ) -> CoreResult<Vec<OperatorLink>> {
        require(principal, Action::Read, None)?;
        ensure_active(self.conn, address_id)?;
        Ok(self.repo().links_for_address(address_id)?)
    }

    fn write<T>(
        &self,
        options: OpOptions,
        body: impl FnOnce(&Transaction<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        run_immediate(self.conn, options, self.settings.busy_timeout, body)
    }
}

fn ensure_active(conn: &Connection, address_id: AddressId) -> CoreResult<()> {
    if SqliteAddressRepository::new(conn)
        .get(address_id, false)?
        .is_none()
    {
        return Err(CoreError::NotFound(EntityRef::Address(address_id)));
    }
    Ok(())
}

fn find_operator(repo: &SqliteRegistryRepository<'_>, code: &str) -> CoreResult<Operator> {
    repo.get_operator_by_code(code)?.ok_or_else(|| {
        ValidationError::invalid_field("operator", format!("operator `{code}` is not registered"))
            .into()
    })
}
