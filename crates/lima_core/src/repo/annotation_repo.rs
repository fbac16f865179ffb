//! Annotation repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Annotations reference live address rows; purging an address with
//!   annotations fails on the foreign key.
//! - Listings are newest first by `created_at`.

use crate::model::address::AddressId;
use crate::model::annotation::{AnnotationId, AnnotationRecord};
use crate::model::principal::PrincipalId;
use crate::repo::{like_contains, normalize_limit, parse_uuid, RepoResult};
use rusqlite::{params, Connection, Row};

const ANNOTATION_SELECT_SQL: &str = "SELECT
    id,
    address_id,
    author_id,
    text,
    created_at,
    updated_at
FROM annotations";

/// Repository interface for annotation storage.
pub trait AnnotationRepository {
    fn insert(&self, annotation: &AnnotationRecord) -> RepoResult<()>;
    fn get(&self, id: AnnotationId) -> RepoResult<Option<AnnotationRecord>>;
    /// Replaces the body. Returns `false` when the row does not exist.
    fn update_text(&self, id: AnnotationId, text: &str, now: i64) -> RepoResult<bool>;
    fn delete(&self, id: AnnotationId) -> RepoResult<bool>;
    /// Newest first. `author_id` restricts the rows to one author.
    fn list_for_address(
        &self,
        address_id: AddressId,
        author_id: Option<PrincipalId>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<AnnotationRecord>>;
    fn list_by_author(
        &self,
        author_id: PrincipalId,
        limit: Option<u32>,
    ) -> RepoResult<Vec<AnnotationRecord>>;
    /// Case-insensitive substring search over annotation bodies, optionally
    /// restricted to one author.
    fn search_text(
        &self,
        needle: &str,
        author_id: Option<PrincipalId>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<AnnotationRecord>>;
}

/// SQLite-backed annotation repository.
pub struct SqliteAnnotationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAnnotationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn collect(&self, sql: &str, bind: impl rusqlite::Params) -> RepoResult<Vec<AnnotationRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(bind)?;
        let mut annotations = Vec::new();
        while let Some(row) = rows.next()? {
            annotations.push(parse_annotation_row(row)?);
        }
        Ok(annotations)
    }
}

impl AnnotationRepository for SqliteAnnotationRepository<'_> {
    fn insert(&self, annotation: &AnnotationRecord) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO annotations (id, address_id, author_id, text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                annotation.id.to_string(),
                annotation.address_id,
                annotation.author_id,
                annotation.text.as_str(),
                annotation.created_at,
                annotation.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: AnnotationId) -> RepoResult<Option<AnnotationRecord>> {
        let mut annotations = self.collect(
            &format!("{ANNOTATION_SELECT_SQL} WHERE id = ?1;"),
            [id.to_string()],
        )?;
        Ok(annotations.pop())
    }

    fn update_text(&self, id: AnnotationId, text: &str, now: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE annotations SET text = ?1, updated_at = ?2 WHERE id = ?3;",
            params![text, now, id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn delete(&self, id: AnnotationId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM annotations WHERE id = ?1;", [id.to_string()])?;
        Ok(changed == 1)
    }

    fn list_for_address(
        &self,
        address_id: AddressId,
        author_id: Option<PrincipalId>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<AnnotationRecord>> {
        self.collect(
            &format!(
                "{ANNOTATION_SELECT_SQL}
                 WHERE address_id = ?1
                   AND (?2 IS NULL OR author_id = ?2)
                 ORDER BY created_at DESC, id ASC
                 LIMIT ?3;"
            ),
            params![address_id, author_id, i64::from(normalize_limit(limit))],
        )
    }

    fn list_by_author(
        &self,
        author_id: PrincipalId,
        limit: Option<u32>,
    ) -> RepoResult<Vec<AnnotationRecord>> {
        self.collect(
            &format!(
                "{ANNOTATION_SELECT_SQL}
                 WHERE author_id = ?1
                 ORDER BY created_at DESC, id ASC
                 LIMIT ?2;"
            ),
            params![author_id, i64::from(normalize_limit(limit))],
        )
    }

    fn search_text(
        &self,
        needle: &str,
        author_id: Option<PrincipalId>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<AnnotationRecord>> {
        self.collect(
            &format!(
                "{ANNOTATION_SELECT_SQL}
                 WHERE text LIKE ?1 ESCAPE '\\'
                   AND (?2 IS NULL OR author_id = ?2)
                 ORDER BY created_at DESC, id ASC
                 LIMIT ?3;"
            ),
            params![like_contains(needle), author_id, i64::from(normalize_limit(limit))],
        )
    }
}

fn parse_annotation_row(row: &Row<'_>) -> RepoResult<AnnotationRecord> {
    let id_text: String = row.get("id")?;
    Ok(AnnotationRecord {
        id: parse_uuid(&id_text, "annotations.id")?,
        address_id: row.get("address_id")?,
        author_id: row.get("author_id")?,
        text: row.get("text")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
