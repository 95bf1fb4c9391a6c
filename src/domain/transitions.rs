//! Content status transition table
//!
//! The workflow graph is plain data: each edge names the least-privileged role
//! allowed to take it. Because roles are ordered, every edge open to a role is
//! also open to all roles above it. Callers persist and audit; nothing here has
//! side effects.

use std::collections::BTreeSet;

use super::actor::Role::{self, Admin, Manager, Staff};
use super::content::ContentStatus::{
    self, Approved, Blocked, Draft, Idea, Published, Review, Scheduled,
};

/// `(from, to, minimum role)`
pub const EDGES: &[(ContentStatus, ContentStatus, Role)] = &[
    (Idea, Draft, Staff),
    (Idea, Blocked, Staff),
    (Draft, Idea, Staff),
    (Draft, Review, Staff),
    (Draft, Blocked, Staff),
    (Review, Draft, Staff),
    (Blocked, Draft, Staff),
    (Review, Approved, Manager),
    (Review, Blocked, Manager),
    (Approved, Review, Manager),
    (Approved, Scheduled, Manager),
    (Approved, Published, Manager),
    (Scheduled, Approved, Manager),
    (Scheduled, Published, Manager),
    (Blocked, Review, Manager),
    (Approved, Blocked, Admin),
    (Scheduled, Blocked, Admin),
    (Scheduled, Draft, Admin),
    (Published, Draft, Admin),
    (Blocked, Idea, Admin),
];

/// Whether `role` may move an item from `from` to `to`
pub fn can_transition(from: ContentStatus, to: ContentStatus, role: Role) -> bool {
    EDGES
        .iter()
        .any(|&(f, t, min_role)| f == from && t == to && role >= min_role)
}

/// Every status `role` may move an item to from `from`
pub fn valid_transitions(from: ContentStatus, role: Role) -> BTreeSet<ContentStatus> {
    EDGES
        .iter()
        .filter(|&&(f, _, min_role)| f == from && role >= min_role)
        .map(|&(_, to, _)| to)
        .collect()
}
