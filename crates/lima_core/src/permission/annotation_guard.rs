//! Visibility and edit/delete rules for user-authored annotations.
//!
//! # Invariants
//! - An author always sees, edits and deletes their own annotations.
//! - Foreign annotations are visible and editable from intermediate upward.
//! - Foreign annotations are deletable by super only.

use crate::model::annotation::AnnotationRecord;
use crate::model::principal::{AccessLevel, Principal, PrincipalId};
use crate::permission::evaluator::{evaluate, Action};

/// Keeps the annotations `principal` may see, preserving order.
pub fn filter_visible(
    annotations: impl IntoIterator<Item = AnnotationRecord>,
    principal: &Principal,
) -> Vec<AnnotationRecord> {
    annotations
        .into_iter()
        .filter(|annotation| is_visible(annotation, principal))
        .collect()
}

/// Author restriction to push into storage queries: `Some(own id)` for
/// principals that may only read their own annotations, `None` otherwise.
///
/// Mirrors the foreign-owner rule of [`Action::Read`]; results are still
/// passed through [`filter_visible`].
pub fn author_scope(principal: &Principal) -> Option<PrincipalId> {
    if principal.has_level(AccessLevel::Intermediate) {
        None
    } else {
        Some(principal.id)
    }
}

pub fn is_visible(annotation: &AnnotationRecord, principal: &Principal) -> bool {
    evaluate(principal, Action::Read, Some(annotation.author_id)).is_allowed()
}

pub fn can_edit(annotation: &AnnotationRecord, principal: &Principal) -> bool {
    evaluate(principal, Action::EditOwn, Some(annotation.author_id)).is_allowed()
        || evaluate(principal, Action::EditAny, Some(annotation.author_id)).is_allowed()
}

pub fn can_delete(annotation: &AnnotationRecord, principal: &Principal) -> bool {
    evaluate(principal, Action::DeleteOwn, Some(annotation.author_id)).is_allowed()
        || evaluate(principal, Action::DeleteAny, Some(annotation.author_id)).is_allowed()
}

#[cfg(test)]
mod tests {
    use super::{author_scope, can_delete, can_edit, filter_visible};
    use crate::model::annotation::AnnotationRecord;
    use crate::model::principal::Principal;

    fn sample() -> Vec<AnnotationRecord> {
        vec![
            AnnotationRecord::new(42, 1, "mine", 10),
            AnnotationRecord::new(42, 2, "theirs", 11),
            AnnotationRecord::new(42, 1, "mine again", 12),
        ]
    }

    #[test]
    fn basic_sees_only_own_annotations() {
        let visible = filter_visible(sample(), &Principal::basic(1));
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|annotation| annotation.author_id == 1));
    }

    #[test]
    fn intermediate_and_super_see_everything() {
        assert_eq!(filter_visible(sample(), &Principal::intermediate(7)).len(), 3);
        assert_eq!(filter_visible(sample(), &Principal::super_user(8)).len(), 3);
    }

    #[test]
    fn author_scope_agrees_with_filter_visible() {
        for principal in [
            Principal::basic(1),
            Principal::intermediate(7),
            Principal::super_user(8),
        ] {
            let scoped: Vec<_> = sample()
                .into_iter()
                .filter(|annotation| {
                    author_scope(&principal).map_or(true, |author| annotation.author_id == author)
                })
                .collect();
            assert_eq!(scoped, filter_visible(sample(), &principal));
        }
    }

    #[test]
    fn edit_rules_follow_authorship_then_level() {
        let foreign = AnnotationRecord::new(42, 2, "theirs", 11);
        assert!(!can_edit(&foreign, &Principal::basic(1)));
        assert!(can_edit(&foreign, &Principal::basic(2)));
        assert!(can_edit(&foreign, &Principal::intermediate(3)));
    }

    #[test]
    fn deleting_foreign_annotations_requires_super() {
        let foreign = AnnotationRecord::new(42, 2, "theirs", 11);
        assert!(can_delete(&foreign, &Principal::basic(2)));
        assert!(!can_delete(&foreign, &Principal::basic(1)));
        assert!(!can_delete(&foreign, &Principal::intermediate(3)));
        assert!(can_delete(&foreign, &Principal::super_user(4)));
    }
}
