//! Core domain logic for the Lima address registry.
//!
//! Permission-gated address mutations, the suggestion approval workflow,
//! the append-only audit trail, annotations, the holder and operator
//! registries and the search log. Transport,
//! authentication and scheduling live outside this crate and call in with
//! an already resolved [`Principal`].

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod permission;
pub mod repo;
pub mod service;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_timeout, OpOptions};
pub use error::{CoreError, CoreResult, EntityRef, StorageError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::address::{
    AddressDelta, AddressId, AddressRecord, GeoBounds, NewAddress, SiteType,
};
pub use model::annotation::{AnnotationId, AnnotationRecord};
pub use model::change_event::{ChangeEvent, ChangeEventId, ChangeKind};
pub use model::principal::{AccessLevel, Principal, PrincipalId};
pub use model::registry::{
    Holder, HolderId, NewHolder, NewOperator, Operator, OperatorId, OperatorLink,
};
pub use model::search_log::{QueryKind, SearchLogEntry, SearchParameters};
pub use model::suggestion::{
    DecisionOutcome, Suggestion, SuggestionId, SuggestionKind, SuggestionStatus,
};
pub use model::validation::ValidationError;
pub use permission::evaluator::{evaluate, Action, Decision, DenyReason};
pub use repo::address_repo::AddressQuery;
pub use repo::audit_repo::{AuditQuery, AuditTrail, ChangeEventFilter, TimeRange};
pub use repo::suggestion_repo::SuggestionFilter;
pub use repo::{RepoError, RepoResult};
pub use service::address_service::AddressService;
pub use service::annotation_service::AnnotationService;
pub use service::audit_service::AuditService;
pub use service::registry_service::RegistryService;
pub use service::search_log::SearchLogRecorder;
pub use service::suggestion_service::{SuggestionRequest, SuggestionService};
pub use service::ServiceSettings;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
