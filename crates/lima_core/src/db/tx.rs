//! Write-locking transaction runner with caller-supplied time budgets.
//!
//! # Invariants
//! - The body runs inside `BEGIN IMMEDIATE`; concurrent writers serialize.
//! - Any body error, lock timeout or budget overrun drops the transaction,
//!   which rolls it back. Nothing is retried here.
//! - The connection busy timeout is restored after a narrowed attempt.

use crate::error::{CoreError, CoreResult, StorageError};
use crate::db::DbError;
use log::warn;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::{Duration, Instant};

/// Per-call options for mutating operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpOptions {
    /// Upper bound for lock wait plus transaction body. `None` uses the
    /// service default.
    pub timeout: Option<Duration>,
}

impl OpOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// Returns these options, falling back to `default` when unset.
    pub fn or_default_timeout(self, default: Option<Duration>) -> Self {
        Self {
            timeout: self.timeout.or(default),
        }
    }
}

/// Runs `body` in one immediate transaction and commits it.
///
/// `connection_busy_timeout` is the value restored on the connection after
/// a call that narrowed it.
pub fn run_immediate<T>(
    conn: &Connection,
    options: OpOptions,
    connection_busy_timeout: Duration,
    body: impl FnOnce(&Transaction<'_>) -> CoreResult<T>,
) -> CoreResult<T> {
    let started_at = Instant::now();
    if let Some(budget) = options.timeout {
        conn.busy_timeout(budget)?;
    }

    let result = run_in_transaction(conn, options, started_at, body);

    if options.timeout.is_some() {
        if let Err(err) = conn.busy_timeout(connection_busy_timeout) {
            warn!(
                "event=busy_timeout_restore module=db status=error error={}",
                err
            );
        }
    }

    result
}

fn run_in_transaction<T>(
    conn: &Connection,
    options: OpOptions,
    started_at: Instant,
    body: impl FnOnce(&Transaction<'_>) -> CoreResult<T>,
) -> CoreResult<T> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|err| map_lock_error(err, options))?;

    let value = body(&tx)?;

    if let Some(budget) = options.timeout {
        if started_at.elapsed() > budget {
            return Err(CoreError::Storage(StorageError::Timeout { budget }));
        }
    }

    tx.commit().map_err(|err| map_lock_error(err, options))?;
    Ok(value)
}

fn map_lock_error(err: rusqlite::Error, options: OpOptions) -> CoreError {
    let err = DbError::from(err);
    match options.timeout {
        Some(budget) if err.is_busy() => CoreError::Storage(StorageError::Timeout { budget }),
        _ => CoreError::from(err),
    }
}

#[cfg(test)]
mod tests {
    use super::{run_immediate, OpOptions};
    use crate::db::open_db_in_memory;
    use crate::error::CoreError;
    use std::time::Duration;

    #[test]
    fn body_error_rolls_back_writes() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE scratch (v INTEGER);").unwrap();

        let result: Result<(), CoreError> = run_immediate(
            &conn,
            OpOptions::default(),
            Duration::from_secs(5),
            |tx| {
                tx.execute("INSERT INTO scratch (v) VALUES (1);", [])?;
                Err(CoreError::conflict("forced"))
            },
        );
        assert!(matches!(result, Err(CoreError::Conflict(_))));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scratch;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn successful_body_commits() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE scratch (v INTEGER);").unwrap();

        run_immediate(
            &conn,
            OpOptions::with_timeout(Duration::from_secs(1)),
            Duration::from_secs(5),
            |tx| {
                tx.execute("INSERT INTO scratch (v) VALUES (1);", [])?;
                Ok(())
            },
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scratch;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
