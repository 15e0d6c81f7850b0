//! Prefix-keyed permission table.

use std::collections::BTreeSet;

use super::{PermissionRule, PolicyConfigError};
use crate::auth::Role;

/// A prefix and the roles allowed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPermission {
    prefix: String,
    roles: BTreeSet<Role>,
}

impl PathPermission {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter()
    }

    pub fn allows(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}

/// Immutable mapping from route prefix to allowed roles.
///
/// Lookup selects the longest prefix of the request path. Rules keep their
/// declaration order and prefixes are unique, so the first longest match is
/// the only one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionTable {
    entries: Vec<PathPermission>,
}

impl PermissionTable {
    pub fn new(rules: &[PermissionRule]) -> Result<Self, PolicyConfigError> {
        let mut entries: Vec<PathPermission> = Vec::with_capacity(rules.len());
        for rule in rules {
            if entries.iter().any(|e| e.prefix == rule.prefix) {
                return Err(PolicyConfigError::DuplicatePrefix(rule.prefix.clone()));
            }
            entries.push(PathPermission {
                prefix: rule.prefix.clone(),
                roles: rule.roles.iter().cloned().collect(),
            });
        }
        Ok(Self { entries })
    }

    /// Longest rule prefix that `path` starts with.
    pub fn best_match(&self, path: &str) -> Option<&PathPermission> {
        let mut best: Option<&PathPermission> = None;
        for entry in &self.entries {
            if path.starts_with(entry.prefix.as_str())
                && best.is_none_or(|b| entry.prefix.len() > b.prefix.len())
            {
                best = Some(entry);
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathPermission> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
