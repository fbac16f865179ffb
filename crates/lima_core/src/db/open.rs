//! Connection bootstrap for the address store.
//!
//! # Invariants
//! - Returned connections enforce foreign keys (annotations, suggestions and
//!   events point at address rows).
//! - Returned connections carry the configured busy timeout and a fully
//!   migrated schema.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Busy timeout applied when the caller does not configure one.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum Target<'a> {
    File(&'a Path),
    Memory,
}

impl Target<'_> {
    fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        match self {
            Self::File(path) => Connection::open(path),
            Self::Memory => Connection::open_in_memory(),
        }
    }
}

/// Opens (or creates) the database file with the default lock wait budget.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
}

/// Opens the database file with an explicit lock wait budget.
///
/// `busy_timeout` is the connection default; mutating operations may narrow
/// it per call through [`crate::db::OpOptions`].
pub fn open_db_with_timeout(
    path: impl AsRef<Path>,
    busy_timeout: Duration,
) -> DbResult<Connection> {
    open_target(Target::File(path.as_ref()), busy_timeout)
}

/// Private in-memory database, migrated. Used by tests and the CLI fallback.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_target(Target::Memory, DEFAULT_BUSY_TIMEOUT)
}

fn open_target(target: Target<'_>, busy_timeout: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = target.mode();
    info!(
        "event=db_open module=db status=start mode={mode} busy_timeout_ms={}",
        busy_timeout.as_millis()
    );

    let opened = target
        .connect()
        .map_err(Into::into)
        .and_then(|mut conn| configure(&mut conn, busy_timeout).map(|version| (conn, version)));

    match opened {
        Ok((conn, schema_version)) => {
            info!(
                "event=db_open module=db status=ok mode={mode} schema_version={schema_version} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn configure(conn: &mut Connection, busy_timeout: Duration) -> DbResult<u32> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(busy_timeout)?;
    apply_migrations(conn)
}
