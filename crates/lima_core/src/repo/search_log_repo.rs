//! Search log repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `append` never waits for a lock: while another connection holds the
//!   write lock it fails with busy at once, and the connection's busy
//!   timeout is restored afterwards.

use crate::model::principal::PrincipalId;
use crate::model::search_log::{parse_query_kind, QueryKind, SearchLogEntry, SearchParameters};
use crate::repo::address_repo::count_to_u64;
use crate::repo::{normalize_limit, parse_uuid, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::BTreeMap;
use std::time::Duration;

/// Filter for search log listings. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchLogFilter {
    pub actor_id: Option<PrincipalId>,
    pub query_kind: Option<QueryKind>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for search log storage.
pub trait SearchLogRepository {
    fn append(&self, entry: &SearchLogEntry) -> RepoResult<()>;
    fn list(&self, filter: &SearchLogFilter) -> RepoResult<Vec<SearchLogEntry>>;
    /// Number of logged lookups per query kind.
    fn count_by_kind(&self) -> RepoResult<BTreeMap<QueryKind, u64>>;
}

/// SQLite-backed search log repository.
pub struct SqliteSearchLogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSearchLogRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SearchLogRepository for SqliteSearchLogRepository<'_> {
    fn append(&self, entry: &SearchLogEntry) -> RepoResult<()> {
        let parameters = serde_json::to_string(&entry.parameters).map_err(|err| {
            RepoError::InvalidData(format!("cannot encode search parameters: {err}"))
        })?;
        let previous_ms: i64 = self
            .conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))?;
        self.conn.busy_timeout(Duration::ZERO)?;
        let inserted = self.conn.execute(
            "INSERT INTO search_logs (id, actor_id, query_kind, parameters, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                entry.id.to_string(),
                entry.actor_id,
                entry.query_kind.as_str(),
                parameters,
                entry.logged_at,
            ],
        );
        self.conn
            .busy_timeout(Duration::from_millis(u64::try_from(previous_ms).unwrap_or(0)))?;
        inserted?;
        Ok(())
    }

    fn list(&self, filter: &SearchLogFilter) -> RepoResult<Vec<SearchLogEntry>> {
        let mut sql = String::from(
            "SELECT id, actor_id, query_kind, parameters, logged_at
             FROM search_logs
             WHERE 1 = 1",
        );
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(actor_id) = filter.actor_id {
            sql.push_str(" AND actor_id = ?");
            bind_values.push(Value::Integer(actor_id));
        }
        if let Some(kind) = filter.query_kind {
            sql.push_str(" AND query_kind = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
        sql.push_str(" ORDER BY logged_at DESC, seq DESC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_limit(filter.limit))));
        if filter.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(filter.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_search_log_row(row)?);
        }
        Ok(entries)
    }

    fn count_by_kind(&self) -> RepoResult<BTreeMap<QueryKind, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT query_kind, COUNT(*) FROM search_logs GROUP BY query_kind;")?;
        let mut rows = stmt.query([])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let kind_text: String = row.get(0)?;
            counts.insert(parse_kind(&kind_text)?, count_to_u64(row.get(1)?)?);
        }
        Ok(counts)
    }
}

fn parse_kind(value: &str) -> RepoResult<QueryKind> {
    parse_query_kind(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid query kind `{value}` in search_logs.query_kind"))
    })
}

fn parse_search_log_row(row: &Row<'_>) -> RepoResult<SearchLogEntry> {
    let id_text: String = row.get("id")?;
    let kind_text: String = row.get("query_kind")?;
    let parameters_text: String = row.get("parameters")?;
    let parameters: SearchParameters = serde_json::from_str(&parameters_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid parameters in search_logs.parameters: {err}"))
    })?;

    Ok(SearchLogEntry {
        id: parse_uuid(&id_text, "search_logs.id")?,
        actor_id: row.get("actor_id")?,
        query_kind: parse_kind(&kind_text)?,
        parameters,
        logged_at: row.get("logged_at")?,
    })
}
