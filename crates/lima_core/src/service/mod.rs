//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate permission checks, repository calls and audit appends into
//!   use-case level APIs.
//! - Own transaction boundaries; repositories never open transactions.
//!
//! # Invariants
//! - Every service method takes the acting `Principal` explicitly.
//! - Every address mutation and its change event commit together.

use crate::config::CoreConfig;
use crate::db::DEFAULT_BUSY_TIMEOUT;
use crate::repo::audit_repo::DEFAULT_PAGE_SIZE;
use std::time::Duration;

pub mod address_service;
pub mod annotation_service;
pub mod audit_service;
pub mod registry_service;
pub mod search_log;
pub mod suggestion_service;

/// Runtime knobs shared by services, usually derived from [`CoreConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Busy timeout the connection was opened with; restored after a
    /// narrowed call.
    pub busy_timeout: Duration,
    /// Default budget for `decide` when the caller passes none.
    pub decide_timeout: Option<Duration>,
    pub audit_page_size: u32,
    pub search_log_enabled: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            decide_timeout: None,
            audit_page_size: DEFAULT_PAGE_SIZE,
            search_log_enabled: true,
        }
    }
}

impl From<&CoreConfig> for ServiceSettings {
    fn from(config: &CoreConfig) -> Self {
        Self {
            busy_timeout: config.busy_timeout(),
            decide_timeout: config.decide_timeout(),
            audit_page_size: config.audit.page_size,
            search_log_enabled: config.search_log.enabled,
        }
    }
}
