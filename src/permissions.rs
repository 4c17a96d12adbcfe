//! # Permission Resolution
//!
//! Computes the effective permission set of one service identity inside one
//! target. The same physical target can carry different sets for different
//! repositories, so the computation is always per (repository, role) pair.
//!
//! - Primary target, or linked target with `accessLevel: full`: the
//!   repository's declared permissions followed by the provider defaults.
//! - Any other linked target: the linked entry's own permissions followed by
//!   the provider defaults.
//!
//! Defaults are always appended. Duplicates are kept; providers tolerate
//! repeated entries.

use crate::config::{AccessLevel, LinkedAccess};

/// The role a target plays in one repository's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRole<'a> {
    Primary,
    Linked(&'a LinkedAccess),
}

impl TargetRole<'_> {
    /// Whether the repository's own declarations apply in this target.
    pub fn is_full(&self) -> bool {
        match self {
            TargetRole::Primary => true,
            TargetRole::Linked(linked) => linked.access_level == AccessLevel::Full,
        }
    }
}

pub fn effective_permissions(
    declared: &[String],
    role: TargetRole<'_>,
    defaults: &[&str],
) -> Vec<String> {
    let own: &[String] = match role {
        TargetRole::Linked(linked) if !role.is_full() => &linked.iam_permissions,
        _ => declared,
    };
    own.iter()
        .cloned()
        .chain(defaults.iter().map(|p| p.to_string()))
        .collect()
}

/// Services to enable in a target for one repository. Restricted linked
/// targets only receive the defaults.
pub fn resolve_services(
    declared: &[String],
    role: TargetRole<'_>,
    defaults: &[&str],
) -> Vec<String> {
    let own: &[String] = if role.is_full() { declared } else { &[] };
    own.iter()
        .cloned()
        .chain(defaults.iter().map(|s| s.to_string()))
        .collect()
}
