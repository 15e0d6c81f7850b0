//! Path-to-decision resolution.

use serde::Serialize;

use super::{PermissionTable, PolicyConfig, PolicyConfigError, PublicPathSet, UnlistedPolicy};
use crate::auth::Role;

/// Result of resolving a path against the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    DenyNoRole,
    DenyForbidden { required_roles: Vec<Role> },
}

/// Maps a request path and role to a [`Decision`].
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    public: PublicPathSet,
    table: PermissionTable,
    unlisted: UnlistedPolicy,
}

impl PermissionResolver {
    pub fn new(public: PublicPathSet, table: PermissionTable, unlisted: UnlistedPolicy) -> Self {
        Self {
            public,
            table,
            unlisted,
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyConfigError> {
        config.validate()?;
        Ok(Self::new(
            PublicPathSet::from_config(config),
            PermissionTable::new(&config.rules)?,
            config.unlisted_policy,
        ))
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public.is_public(path)
    }

    pub fn resolve(&self, path: &str, role: Option<&Role>) -> Decision {
        if self.public.is_public(path) {
            return Decision::Allow;
        }

        let Some(role) = role else {
            return Decision::DenyNoRole;
        };

        match self.table.best_match(path) {
            Some(rule) if rule.allows(role) => Decision::Allow,
            Some(rule) => Decision::DenyForbidden {
                required_roles: rule.roles().cloned().collect(),
            },
            None => match self.unlisted {
                UnlistedPolicy::Allow => Decision::Allow,
                UnlistedPolicy::Deny => Decision::DenyForbidden {
                    required_roles: Vec::new(),
                },
            },
        }
    }

    pub fn public_paths(&self) -> &PublicPathSet {
        &self.public
    }

    pub fn table(&self) -> &PermissionTable {
        &self.table
    }

    pub fn unlisted_policy(&self) -> UnlistedPolicy {
        self.unlisted
    }
}
