//! Append-only change event storage and lazy audit queries.
//!
//! # Responsibility
//! - Append one change event inside the mutating transaction.
//! - Serve filtered, newest-first event streams without loading whole
//!   result sets.
//!
//! # Invariants
//! - `append` takes a `Transaction`, so an event can never be written
//!   outside the transaction of the mutation it records.
//! - The table rejects UPDATE and DELETE through triggers.
//! - Query order is `(occurred_at DESC, seq DESC)`; `seq` breaks ties so
//!   pagination never skips or repeats rows.

use crate::model::address::AddressId;
use crate::model::change_event::{parse_change_kind, ChangeEvent, ChangeEventId, ChangeKind};
use crate::model::principal::PrincipalId;
use crate::repo::address_repo::count_to_u64;
use crate::repo::suggestion_repo::{decode_payload, encode_payload};
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction};
use std::collections::VecDeque;

const EVENT_SELECT_SQL: &str = "SELECT
    seq,
    id,
    target_address_id,
    actor_id,
    kind,
    delta,
    suggestion_id,
    occurred_at
FROM change_events";

/// Rows fetched per page when the caller gives no page size.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Half-open time window in epoch milliseconds: `from_ms <= t < to_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from_ms: i64,
    pub to_ms: i64,
}

impl TimeRange {
    pub fn new(from_ms: i64, to_ms: i64) -> Self {
        Self { from_ms, to_ms }
    }

    pub fn contains(&self, at_ms: i64) -> bool {
        self.from_ms <= at_ms && at_ms < self.to_ms
    }
}

/// Conjunctive filter over change events. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEventFilter {
    pub target_address_id: Option<AddressId>,
    pub actor_id: Option<PrincipalId>,
    pub range: Option<TimeRange>,
    pub kind: Option<ChangeKind>,
}

impl ChangeEventFilter {
    pub fn for_address(target_address_id: AddressId) -> Self {
        Self {
            target_address_id: Some(target_address_id),
            ..Self::default()
        }
    }

    pub fn by_actor(actor_id: PrincipalId) -> Self {
        Self {
            actor_id: Some(actor_id),
            ..Self::default()
        }
    }

    fn push_conditions(&self, sql: &mut String, bind_values: &mut Vec<Value>) {
        if let Some(target) = self.target_address_id {
            sql.push_str(" AND target_address_id = ?");
            bind_values.push(Value::Integer(target));
        }
        if let Some(actor) = self.actor_id {
            sql.push_str(" AND actor_id = ?");
            bind_values.push(Value::Integer(actor));
        }
        if let Some(range) = self.range {
            sql.push_str(" AND occurred_at >= ? AND occurred_at < ?");
            bind_values.push(Value::Integer(range.from_ms));
            bind_values.push(Value::Integer(range.to_ms));
        }
        if let Some(kind) = self.kind {
            sql.push_str(" AND kind = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
    }
}

/// Appends one event inside `tx`.
pub fn append(tx: &Transaction<'_>, event: &ChangeEvent) -> RepoResult<()> {
    let delta = encode_payload(&event.delta)?;
    tx.execute(
        "INSERT INTO change_events (
            id,
            target_address_id,
            actor_id,
            kind,
            delta,
            suggestion_id,
            occurred_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            event.id.to_string(),
            event.target_address_id,
            event.actor_id,
            event.kind.as_str(),
            delta,
            event.suggestion_id.map(|id| id.to_string()),
            event.occurred_at,
        ],
    )?;
    Ok(())
}

/// Read side of the audit log.
pub struct AuditTrail<'conn> {
    conn: &'conn Connection,
    page_size: u32,
}

impl<'conn> AuditTrail<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_page_size(conn, DEFAULT_PAGE_SIZE)
    }

    /// `page_size` of zero falls back to the default.
    pub fn with_page_size(conn: &'conn Connection, page_size: u32) -> Self {
        let page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        Self { conn, page_size }
    }

    /// Builds a restartable query. Nothing is read until iteration.
    pub fn query(&self, filter: ChangeEventFilter) -> AuditQuery<'conn> {
        AuditQuery {
            conn: self.conn,
            filter,
            page_size: self.page_size,
        }
    }

    pub fn get(&self, id: ChangeEventId) -> RepoResult<Option<ChangeEvent>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EVENT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            let (_, event) = parse_event_row(row)?;
            return Ok(Some(event));
        }
        Ok(None)
    }

    pub fn count(&self, filter: &ChangeEventFilter) -> RepoResult<u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM change_events WHERE 1 = 1");
        let mut bind_values = Vec::new();
        filter.push_conditions(&mut sql, &mut bind_values);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(bind_values), |row| row.get(0))?;
        count_to_u64(count)
    }

    /// Every event of one address, oldest first, for replay.
    pub fn history(&self, target_address_id: AddressId) -> RepoResult<Vec<ChangeEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EVENT_SELECT_SQL}
             WHERE target_address_id = ?1
             ORDER BY occurred_at ASC, seq ASC;"
        ))?;
        let mut rows = stmt.query([target_address_id])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            let (_, event) = parse_event_row(row)?;
            events.push(event);
        }
        Ok(events)
    }
}

/// Filtered event query. Each `iter()` call starts again from the newest
/// matching event.
#[derive(Clone)]
pub struct AuditQuery<'conn> {
    conn: &'conn Connection,
    filter: ChangeEventFilter,
    page_size: u32,
}

impl<'conn> AuditQuery<'conn> {
    pub fn filter(&self) -> &ChangeEventFilter {
        &self.filter
    }

    pub fn iter(&self) -> AuditIter<'conn> {
        AuditIter {
            conn: self.conn,
            filter: self.filter.clone(),
            page_size: self.page_size,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    /// Reads at most `limit` events from the start of the stream.
    pub fn first(&self, limit: usize) -> RepoResult<Vec<ChangeEvent>> {
        self.iter().take(limit).collect()
    }
}

impl<'conn> IntoIterator for &AuditQuery<'conn> {
    type Item = RepoResult<ChangeEvent>;
    type IntoIter = AuditIter<'conn>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Page-fetching iterator over change events.
///
/// Yields at most one error, after which it is exhausted.
pub struct AuditIter<'conn> {
    conn: &'conn Connection,
    filter: ChangeEventFilter,
    page_size: u32,
    buffer: VecDeque<ChangeEvent>,
    /// `(occurred_at, seq)` of the last row handed out.
    cursor: Option<(i64, i64)>,
    exhausted: bool,
}

impl AuditIter<'_> {
    fn fetch_page(&mut self) -> RepoResult<()> {
        let mut sql = format!("{EVENT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values = Vec::new();
        self.filter.push_conditions(&mut sql, &mut bind_values);

        if let Some((occurred_at, seq)) = self.cursor {
            sql.push_str(" AND (occurred_at < ? OR (occurred_at = ? AND seq < ?))");
            bind_values.push(Value::Integer(occurred_at));
            bind_values.push(Value::Integer(occurred_at));
            bind_values.push(Value::Integer(seq));
        }
        sql.push_str(" ORDER BY occurred_at DESC, seq DESC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(self.page_size)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut fetched = 0_u32;
        while let Some(row) = rows.next()? {
            let (seq, event) = parse_event_row(row)?;
            self.cursor = Some((event.occurred_at, seq));
            self.buffer.push_back(event);
            fetched += 1;
        }
        if fetched < self.page_size {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for AuditIter<'_> {
    type Item = RepoResult<ChangeEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_page() {
                self.exhausted = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<(i64, ChangeEvent)> {
    let id_text: String = row.get("id")?;
    let kind_text: String = row.get("kind")?;
    let delta_text: String = row.get("delta")?;
    let suggestion_text: Option<String> = row.get("suggestion_id")?;

    let kind = parse_change_kind(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid kind `{kind_text}` in change_events.kind"))
    })?;
    let suggestion_id = match suggestion_text {
        Some(value) => Some(parse_uuid(&value, "change_events.suggestion_id")?),
        None => None,
    };

    let event = ChangeEvent {
        id: parse_uuid(&id_text, "change_events.id")?,
        target_address_id: row.get("target_address_id")?,
        actor_id: row.get("actor_id")?,
        kind,
        delta: decode_payload(&delta_text, "change_events.delta")?,
        suggestion_id,
        occurred_at: row.get("occurred_at")?,
    };
    Ok((row.get("seq")?, event))
}
