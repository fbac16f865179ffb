//! Rank-based permission decision function.
//!
//! # Responsibility
//! - Map `(principal, action, owner)` to `Allow` or `Deny(reason)`.
//!
//! # Invariants
//! - `evaluate` is pure: no storage access, no clock, no logging.
//! - Level checks compare ranks (`at_least`), never identities.
//! - Ownership-scoped actions deny unless the owner is the caller.

use crate::error::CoreError;
use crate::model::principal::{AccessLevel, Principal, PrincipalId};
use log::warn;
use std::fmt::{Display, Formatter};

/// Action a principal attempts on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Read a resource; a foreign owner requires read-all rights.
    Read,
    /// Create a resource owned by the caller.
    CreateOwn,
    /// Edit a resource owned by the caller.
    EditOwn,
    /// Edit any resource regardless of owner.
    EditAny,
    /// Decide (approve or reject) a suggestion.
    Approve,
    /// Delete a resource owned by the caller.
    DeleteOwn,
    /// Delete any resource, including permanent record deletion.
    DeleteAny,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::CreateOwn => "create_own",
            Self::EditOwn => "edit_own",
            Self::EditAny => "edit_any",
            Self::Approve => "approve",
            Self::DeleteOwn => "delete_own",
            Self::DeleteAny => "delete_any",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an action was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Ownership-scoped action on a resource the caller does not own.
    NotOwner,
    /// Caller's access level is below the level the action needs.
    InsufficientLevel { required: AccessLevel },
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotOwner => "not-owner",
            Self::InsufficientLevel { .. } => "insufficient-level",
        }
    }
}

impl Display for DenyReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotOwner => f.write_str("not-owner"),
            Self::InsufficientLevel { required } => {
                write!(f, "insufficient-level (requires {required})")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decides whether `principal` may perform `action` on a resource owned by
/// `owner_id` (`None` for shared or not-yet-created resources).
pub fn evaluate(principal: &Principal, action: Action, owner_id: Option<PrincipalId>) -> Decision {
    match action {
        Action::Read => match owner_id {
            Some(owner) if owner != principal.id => {
                require_level(principal, AccessLevel::Intermediate, DenyReason::NotOwner)
            }
            _ => Decision::Allow,
        },
        Action::CreateOwn => match owner_id {
            None => Decision::Allow,
            Some(owner) => owned_by_caller(principal, owner),
        },
        Action::EditOwn | Action::DeleteOwn => match owner_id {
            Some(owner) => owned_by_caller(principal, owner),
            None => Decision::Deny(DenyReason::NotOwner),
        },
        Action::EditAny | Action::Approve => insufficient_unless(principal, AccessLevel::Intermediate),
        Action::DeleteAny => insufficient_unless(principal, AccessLevel::Super),
    }
}

/// Evaluates and converts a denial into [`CoreError::Permission`].
///
/// Denials are logged as metadata-only `permission_denied` events.
pub fn require(
    principal: &Principal,
    action: Action,
    owner_id: Option<PrincipalId>,
) -> Result<(), CoreError> {
    match evaluate(principal, action, owner_id) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(denied(principal, action, reason)),
    }
}

/// Requires `required` or above for an `action` whose level is fixed by
/// the operation rather than by ownership (for example super-only reads).
pub fn require_at_least(
    principal: &Principal,
    action: Action,
    required: AccessLevel,
) -> Result<(), CoreError> {
    match insufficient_unless(principal, required) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(denied(principal, action, reason)),
    }
}

fn denied(principal: &Principal, action: Action, reason: DenyReason) -> CoreError {
    warn!(
        "event=permission_denied module=permission status=deny principal_id={} level={} action={} reason={}",
        principal.id,
        principal.access_level,
        action,
        reason.as_str()
    );
    CoreError::Permission { action, reason }
}

fn owned_by_caller(principal: &Principal, owner: PrincipalId) -> Decision {
    if owner == principal.id {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::NotOwner)
    }
}

fn insufficient_unless(principal: &Principal, required: AccessLevel) -> Decision {
    require_level(
        principal,
        required,
        DenyReason::InsufficientLevel { required },
    )
}

fn require_level(principal: &Principal, required: AccessLevel, reason: DenyReason) -> Decision {
    if principal.has_level(required) {
        Decision::Allow
    } else {
        Decision::Deny(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate, require, require_at_least, Action, Decision, DenyReason};
    use crate::error::CoreError;
    use crate::model::principal::{AccessLevel, Principal};

    const ALL_ACTIONS: [Action; 7] = [
        Action::Read,
        Action::CreateOwn,
        Action::EditOwn,
        Action::EditAny,
        Action::Approve,
        Action::DeleteOwn,
        Action::DeleteAny,
    ];

    #[test]
    fn basic_never_edits_any() {
        let basic = Principal::basic(1);
        for owner in [None, Some(1), Some(2)] {
            assert_eq!(
                evaluate(&basic, Action::EditAny, owner),
                Decision::Deny(DenyReason::InsufficientLevel {
                    required: AccessLevel::Intermediate
                })
            );
        }
    }

    #[test]
    fn basic_manages_only_own_resources() {
        let basic = Principal::basic(1);
        for action in [Action::CreateOwn, Action::EditOwn, Action::DeleteOwn] {
            assert_eq!(evaluate(&basic, action, Some(1)), Decision::Allow);
            assert_eq!(
                evaluate(&basic, action, Some(2)),
                Decision::Deny(DenyReason::NotOwner)
            );
        }
        assert_eq!(evaluate(&basic, Action::CreateOwn, None), Decision::Allow);
        assert_eq!(
            evaluate(&basic, Action::EditOwn, None),
            Decision::Deny(DenyReason::NotOwner)
        );
    }

    #[test]
    fn basic_reads_own_and_shared_but_not_foreign() {
        let basic = Principal::basic(1);
        assert!(evaluate(&basic, Action::Read, None).is_allowed());
        assert!(evaluate(&basic, Action::Read, Some(1)).is_allowed());
        assert_eq!(
            evaluate(&basic, Action::Read, Some(9)),
            Decision::Deny(DenyReason::NotOwner)
        );
    }

    #[test]
    fn intermediate_edits_own_and_any() {
        let intermediate = Principal::intermediate(5);
        assert_eq!(evaluate(&intermediate, Action::EditOwn, Some(5)), Decision::Allow);
        assert_eq!(evaluate(&intermediate, Action::EditAny, Some(6)), Decision::Allow);
        assert_eq!(evaluate(&intermediate, Action::Approve, None), Decision::Allow);
        assert!(evaluate(&intermediate, Action::Read, Some(6)).is_allowed());
        assert_eq!(
            evaluate(&intermediate, Action::DeleteAny, Some(6)),
            Decision::Deny(DenyReason::InsufficientLevel {
                required: AccessLevel::Super
            })
        );
    }

    #[test]
    fn super_user_is_allowed_every_rank_gated_action() {
        let super_user = Principal::super_user(9);
        for action in [Action::Read, Action::EditAny, Action::Approve, Action::DeleteAny] {
            assert!(evaluate(&super_user, action, Some(1)).is_allowed());
        }
    }

    #[test]
    fn evaluation_is_deterministic() {
        let principals = [
            Principal::basic(1),
            Principal::intermediate(2),
            Principal::super_user(3),
        ];
        for principal in principals {
            for action in ALL_ACTIONS {
                for owner in [None, Some(1), Some(2), Some(3)] {
                    assert_eq!(
                        evaluate(&principal, action, owner),
                        evaluate(&principal, action, owner)
                    );
                }
            }
        }
    }

    #[test]
    fn higher_levels_never_lose_permissions() {
        let levels = [AccessLevel::Basic, AccessLevel::Intermediate, AccessLevel::Super];
        for pair in levels.windows(2) {
            let lower = Principal::new(1, pair[0]);
            let higher = Principal::new(1, pair[1]);
            for action in ALL_ACTIONS {
                for owner in [None, Some(1), Some(2)] {
                    if evaluate(&lower, action, owner).is_allowed() {
                        assert!(evaluate(&higher, action, owner).is_allowed());
                    }
                }
            }
        }
    }

    #[test]
    fn require_maps_denial_to_permission_error() {
        let err = require(&Principal::basic(1), Action::Approve, None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Permission {
                action: Action::Approve,
                reason: DenyReason::InsufficientLevel { .. }
            }
        ));
        require(&Principal::intermediate(2), Action::Approve, None).unwrap();
    }

    #[test]
    fn require_at_least_gates_on_rank_only() {
        let err =
            require_at_least(&Principal::intermediate(2), Action::Read, AccessLevel::Super)
                .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Permission {
                action: Action::Read,
                reason: DenyReason::InsufficientLevel {
                    required: AccessLevel::Super
                }
            }
        ));
        require_at_least(&Principal::super_user(3), Action::Read, AccessLevel::Super).unwrap();
    }
}
