//! Best-effort recorder for address lookups.
//!
//! # Invariants
//! - `record` never returns an error and never retries.
//! - Failures are counted and logged without the query parameters.

use crate::clock::SharedClock;
use crate::model::principal::Principal;
use crate::model::search_log::{QueryKind, SearchLogEntry, SearchParameters};
use crate::repo::search_log_repo::SearchLogRepository;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};

/// Appends one search log entry per lookup, swallowing failures.
pub struct SearchLogRecorder<R: SearchLogRepository> {
    repo: R,
    clock: SharedClock,
    enabled: bool,
    failures: AtomicU64,
}

impl<R: SearchLogRepository> SearchLogRecorder<R> {
    pub fn new(repo: R, clock: SharedClock) -> Self {
        Self {
            repo,
            clock,
            enabled: true,
            failures: AtomicU64::new(0),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records a lookup. Errors are reported through logging and
    /// [`Self::failure_count`] only.
    pub fn record(&self, principal: &Principal, kind: QueryKind, parameters: SearchParameters) {
        if !self.enabled {
            return;
        }

        let entry = SearchLogEntry::new(principal.id, kind, parameters, self.clock.now_ms());
        match self.repo.append(&entry) {
            Ok(()) => debug!(
                "event=search_log_record module=service status=ok actor_id={} query_kind={}",
                principal.id,
                kind.as_str()
            ),
            Err(err) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "event=search_log_record module=service status=error actor_id={} query_kind={} failures={} error={}",
                    principal.id,
                    kind.as_str(),
                    failures,
                    err
                );
            }
        }
    }

    /// Number of entries that could not be stored since construction.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
