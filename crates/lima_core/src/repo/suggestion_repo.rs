//! Suggestion repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist submitted suggestions and their single terminal transition.
//! - Serialize payloads as JSON `AddressDelta` documents.
//!
//! # Invariants
//! - `transition` only moves rows out of `pending`; a second attempt on
//!   the same row changes nothing and reports `false`.
//! - Rows are never deleted.

use crate::model::address::{AddressDelta, AddressId};
use crate::model::principal::PrincipalId;
use crate::model::suggestion::{
    parse_suggestion_kind, parse_suggestion_status, Suggestion, SuggestionId, SuggestionKind,
    SuggestionStatus,
};
use crate::repo::address_repo::count_to_u64;
use crate::repo::{normalize_limit, parse_uuid, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const SUGGESTION_SELECT_SQL: &str = "SELECT
    id,
    proposer_id,
    kind,
    status,
    target_address_id,
    payload,
    detail,
    submitted_at,
    decider_id,
    decided_at,
    decision_reason
FROM suggestions";

/// Filter options for suggestion listings. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionFilter {
    pub status: Option<SuggestionStatus>,
    pub proposer_id: Option<PrincipalId>,
    pub target_address_id: Option<AddressId>,
    pub kind: Option<SuggestionKind>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Terminal transition applied by a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionTransition<'a> {
    pub status: SuggestionStatus,
    pub decider_id: PrincipalId,
    pub decided_at: i64,
    pub reason: Option<&'a str>,
    /// Created record id for approved `add` suggestions.
    pub resolved_target: Option<AddressId>,
}

/// Per-status counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuggestionCounts {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

/// Repository interface for suggestion storage.
pub trait SuggestionRepository {
    fn insert(&self, suggestion: &Suggestion) -> RepoResult<()>;
    fn get(&self, id: SuggestionId) -> RepoResult<Option<Suggestion>>;
    fn list(&self, filter: &SuggestionFilter) -> RepoResult<Vec<Suggestion>>;
    /// Moves a pending row to a terminal status. Returns `false` when the row
    /// was not pending.
    fn transition(&self, id: SuggestionId, transition: &SuggestionTransition<'_>)
        -> RepoResult<bool>;
    /// Pending suggestions submitted strictly before `cutoff`, oldest first.
    fn list_pending_before(&self, cutoff: i64, limit: Option<u32>) -> RepoResult<Vec<Suggestion>>;
    fn counts(&self) -> RepoResult<SuggestionCounts>;
}

/// SQLite-backed suggestion repository.
pub struct SqliteSuggestionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSuggestionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SuggestionRepository for SqliteSuggestionRepository<'_> {
    fn insert(&self, suggestion: &Suggestion) -> RepoResult<()> {
        let payload = encode_payload(&suggestion.payload)?;
        self.conn.execute(
            "INSERT INTO suggestions (
                id,
                proposer_id,
                kind,
                status,
                target_address_id,
                payload,
                detail,
                submitted_at,
                decider_id,
                decided_at,
                decision_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                suggestion.id.to_string(),
                suggestion.proposer_id,
                suggestion.kind.as_str(),
                suggestion.status.as_str(),
                suggestion.target_address_id,
                payload,
                suggestion.detail.as_deref(),
                suggestion.submitted_at,
                suggestion.decider_id,
                suggestion.decided_at,
                suggestion.decision_reason.as_deref(),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: SuggestionId) -> RepoResult<Option<Suggestion>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SUGGESTION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_suggestion_row(row)?));
        }
        Ok(None)
    }

    fn list(&self, filter: &SuggestionFilter) -> RepoResult<Vec<Suggestion>> {
        let mut sql = format!("{SUGGESTION_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(proposer_id) = filter.proposer_id {
            sql.push_str(" AND proposer_id = ?");
            bind_values.push(Value::Integer(proposer_id));
        }
        if let Some(target) = filter.target_address_id {
            sql.push_str(" AND target_address_id = ?");
            bind_values.push(Value::Integer(target));
        }
        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }

        sql.push_str(" ORDER BY submitted_at DESC, id ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_limit(filter.limit))));
        if filter.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(filter.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut suggestions = Vec::new();
        while let Some(row) = rows.next()? {
            suggestions.push(parse_suggestion_row(row)?);
        }
        Ok(suggestions)
    }

    fn transition(
        &self,
        id: SuggestionId,
        transition: &SuggestionTransition<'_>,
    ) -> RepoResult<bool> {
        if !transition.status.is_terminal() {
            return Err(RepoError::InvalidData(format!(
                "suggestion {id} cannot transition to `{}`",
                transition.status
            )));
        }

        let changed = self.conn.execute(
            "UPDATE suggestions
             SET
                status = ?1,
                decider_id = ?2,
                decided_at = ?3,
                decision_reason = ?4,
                target_address_id = COALESCE(?5, target_address_id)
             WHERE id = ?6
               AND status = 'pending';",
            params![
                transition.status.as_str(),
                transition.decider_id,
                transition.decided_at,
                transition.reason,
                transition.resolved_target,
                id.to_string(),
            ],
        )?;
        Ok(changed == 1)
    }

    fn list_pending_before(&self, cutoff: i64, limit: Option<u32>) -> RepoResult<Vec<Suggestion>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SUGGESTION_SELECT_SQL}
             WHERE status = 'pending'
               AND submitted_at < ?1
             ORDER BY submitted_at ASC, id ASC
             LIMIT ?2;"
        ))?;
        let mut rows = stmt.query(params![cutoff, i64::from(normalize_limit(limit))])?;
        let mut suggestions = Vec::new();
        while let Some(row) = rows.next()? {
            suggestions.push(parse_suggestion_row(row)?);
        }
        Ok(suggestions)
    }

    fn counts(&self) -> RepoResult<SuggestionCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM suggestions GROUP BY status;")?;
        let mut rows = stmt.query([])?;
        let mut counts = SuggestionCounts::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count = count_to_u64(row.get(1)?)?;
            match parse_status(&status)? {
                SuggestionStatus::Pending => counts.pending = count,
                SuggestionStatus::Approved => counts.approved = count,
                SuggestionStatus::Rejected => counts.rejected = count,
            }
        }
        Ok(counts)
    }
}

pub(crate) fn encode_payload(delta: &AddressDelta) -> RepoResult<String> {
    serde_json::to_string(delta)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode address delta: {err}")))
}

pub(crate) fn decode_payload(value: &str, column: &str) -> RepoResult<AddressDelta> {
    serde_json::from_str(value)
        .map_err(|err| RepoError::InvalidData(format!("invalid address delta in {column}: {err}")))
}

fn parse_status(value: &str) -> RepoResult<SuggestionStatus> {
    parse_suggestion_status(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{value}` in suggestions.status"))
    })
}

fn parse_suggestion_row(row: &Row<'_>) -> RepoResult<Suggestion> {
    let id_text: String = row.get("id")?;
    let kind_text: String = row.get("kind")?;
    let status_text: String = row.get("status")?;
    let payload_text: String = row.get("payload")?;

    let kind = parse_suggestion_kind(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid kind `{kind_text}` in suggestions.kind"))
    })?;

    Ok(Suggestion {
        id: parse_uuid(&id_text, "suggestions.id")?,
        proposer_id: row.get("proposer_id")?,
        kind,
        status: parse_status(&status_text)?,
        target_address_id: row.get("target_address_id")?,
        payload: decode_payload(&payload_text, "suggestions.payload")?,
        detail: row.get("detail")?,
        submitted_at: row.get("submitted_at")?,
        decider_id: row.get("decider_id")?,
        decided_at: row.get("decided_at")?,
        decision_reason: row.get("decision_reason")?,
    })
}
