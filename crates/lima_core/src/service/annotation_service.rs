//! Annotation use-case service.
//!
//! # Invariants
//! - Every read passes through the annotation visibility guard.
//! - Edits and deletes go through the evaluator with the author as owner.
//! - Annotation bodies never reach log lines.

use crate::clock::SharedClock;
use crate::error::{CoreError, CoreResult, EntityRef};
use crate::model::address::AddressId;
use crate::model::annotation::{validate_annotation_text, AnnotationId, AnnotationRecord};
use crate::model::principal::Principal;
use crate::permission::annotation_guard::{author_scope, can_delete, can_edit, filter_visible};
use crate::permission::evaluator::{require, Action};
use crate::repo::address_repo::{AddressRepository, SqliteAddressRepository};
use crate::repo::annotation_repo::{AnnotationRepository, SqliteAnnotationRepository};
use log::info;
use rusqlite::Connection;

/// Annotation service facade.
pub struct AnnotationService<'conn> {
    conn: &'conn Connection,
    clock: SharedClock,
}

impl<'conn> AnnotationService<'conn> {
    pub fn new(conn: &'conn Connection, clock: SharedClock) -> Self {
        Self { conn, clock }
    }

    fn repo(&self) -> SqliteAnnotationRepository<'conn> {
        SqliteAnnotationRepository::new(self.conn)
    }

    /// Attaches a new annotation, authored by `principal`, to an active
    /// address.
    pub fn create(
        &self,
        principal: &Principal,
        address_id: AddressId,
        text: &str,
    ) -> CoreResult<AnnotationRecord> {
        validate_annotation_text(text)?;
        require(principal, Action::CreateOwn, None)?;
        if SqliteAddressRepository::new(self.conn)
            .get(address_id, false)?
            .is_none()
        {
            return Err(CoreError::NotFound(EntityRef::Address(address_id)));
        }

        let annotation = AnnotationRecord::new(address_id, principal.id, text, self.clock.now_ms());
        self.repo().insert(&annotation)?;
        info!(
            "event=annotation_create module=service status=ok annotation_id={} address_id={} author_id={}",
            annotation.id, address_id, principal.id
        );
        Ok(annotation)
    }

    pub fn update_text(
        &self,
        principal: &Principal,
        id: AnnotationId,
        text: &str,
    ) -> CoreResult<AnnotationRecord> {
        validate_annotation_text(text)?;
        let mut annotation = self.load(id)?;
        if !can_edit(&annotation, principal) {
            require(principal, Action::EditAny, Some(annotation.author_id))?;
        }

        let now = self.clock.now_ms();
        if !self.repo().update_text(id, text, now)? {
            return Err(CoreError::NotFound(EntityRef::Annotation(id)));
        }
        annotation.text = text.to_string();
        annotation.updated_at = now;
        info!(
            "event=annotation_update module=service status=ok annotation_id={} actor_id={}",
            id, principal.id
        );
        Ok(annotation)
    }

    pub fn delete(&self, principal: &Principal, id: AnnotationId) -> CoreResult<()> {
        let annotation = self.load(id)?;
        if !can_delete(&annotation, principal) {
            require(principal, Action::DeleteAny, Some(annotation.author_id))?;
        }

        if !self.repo().delete(id)? {
            return Err(CoreError::NotFound(EntityRef::Annotation(id)));
        }
        info!(
            "event=annotation_delete module=service status=ok annotation_id={} actor_id={}",
            id, principal.id
        );
        Ok(())
    }

    /// Annotations on one address that `principal` may see, newest first.
    pub fn list_for_address(
        &self,
        principal: &Principal,
        address_id: AddressId,
        limit: Option<u32>,
    ) -> CoreResult<Vec<AnnotationRecord>> {
        let rows = self
            .repo()
            .list_for_address(address_id, author_scope(principal), limit)?;
        Ok(filter_visible(rows, principal))
    }

    /// Annotations authored by `principal`, newest first.
    pub fn list_mine(
        &self,
        principal: &Principal,
        limit: Option<u32>,
    ) -> CoreResult<Vec<AnnotationRecord>> {
        Ok(self.repo().list_by_author(principal.id, limit)?)
    }

    /// Substring search over the bodies visible to `principal`.
    pub fn search_text(
        &self,
        principal: &Principal,
        needle: &str,
        limit: Option<u32>,
    ) -> CoreResult<Vec<AnnotationRecord>> {
        let needle = needle.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .repo()
            .search_text(needle, author_scope(principal), limit)?;
        Ok(filter_visible(rows, principal))
    }

    fn load(&self, id: AnnotationId) -> CoreResult<AnnotationRecord> {
        self.repo()
            .get(id)?
            .ok_or(CoreError::NotFound(EntityRef::Annotation(id)))
    }
}
