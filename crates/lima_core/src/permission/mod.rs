//! Permission model: the pure decision function and the annotation guard.
//!
//! Every mutating core operation calls [`evaluator::require`] before it
//! touches storage. Read paths use [`evaluator::evaluate`] and
//! [`annotation_guard`] to filter results instead of failing.

pub mod annotation_guard;
pub mod evaluator;
