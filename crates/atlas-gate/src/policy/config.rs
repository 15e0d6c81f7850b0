//! Route policy configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Role;

/// What happens to an authenticated request whose path matches no rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlistedPolicy {
    /// Unlisted paths are not role-protected.
    #[default]
    Allow,
    /// Unlisted paths are refused.
    Deny,
}

/// One permission rule: a path prefix and the roles allowed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub prefix: String,
    pub roles: Vec<Role>,
}

impl PermissionRule {
    pub fn new(prefix: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            prefix: prefix.into(),
            roles: roles.into_iter().collect(),
        }
    }
}

/// Route policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Behavior for paths with no matching rule.
    pub unlisted_policy: UnlistedPolicy,

    /// Paths served without any credential check (exact match).
    pub public_paths: Vec<String>,

    /// Path prefixes served without any credential check.
    pub public_prefixes: Vec<String>,

    /// Permission rules, in declaration order.
    pub rules: Vec<PermissionRule>,

    /// Path prefixes that bypass the gate entirely (build assets).
    pub excluded_prefixes: Vec<String>,

    /// File extensions that bypass the gate entirely (static assets).
    /// Never applied to paths under a rule prefix. Empty by default.
    pub excluded_extensions: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let staff = [Role::Admin, Role::Annotator, Role::Reader, Role::Validator];
        Self {
            unlisted_policy: UnlistedPolicy::Allow,
            public_paths: [
                "/login",
                "/signup",
                "/",
                "/about",
                "/api/auth/login",
                "/api/auth/refresh",
                "/documentation",
                "/gene-assignment",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            public_prefixes: vec!["/api/auth/".to_string()],
            rules: vec![
                PermissionRule::new("/admin", staff.clone()),
                PermissionRule::new("/dashboard", staff.clone()),
                PermissionRule::new("/editor", [Role::Admin, Role::Writer]),
                PermissionRule::new("/profile", staff),
            ],
            excluded_prefixes: vec![
                "/_next/static".to_string(),
                "/_next/image".to_string(),
                "/favicon.ico".to_string(),
            ],
            excluded_extensions: Vec::new(),
        }
    }
}

impl PolicyConfig {
    /// Validate paths and reject duplicate rule prefixes.
    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        for path in &self.public_paths {
            check_path("public_paths", path)?;
        }
        for prefix in &self.public_prefixes {
            check_path("public_prefixes", prefix)?;
        }
        for prefix in &self.excluded_prefixes {
            check_path("excluded_prefixes", prefix)?;
        }

        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            check_path("rules", &rule.prefix)?;
            if !seen.insert(rule.prefix.as_str()) {
                return Err(PolicyConfigError::DuplicatePrefix(rule.prefix.clone()));
            }
        }

        if let Some(ext) = self
            .excluded_extensions
            .iter()
            .find(|e| e.is_empty() || e.contains(['.', '/']))
        {
            return Err(PolicyConfigError::InvalidExtension(ext.clone()));
        }

        Ok(())
    }
}

fn check_path(field: &'static str, path: &str) -> Result<(), PolicyConfigError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(PolicyConfigError::InvalidPath(field, path.to_string()))
    }
}

/// Policy configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyConfigError {
    #[error("policy.{0} entries must start with '/': {1:?}")]
    InvalidPath(&'static str, String),

    #[error("duplicate permission rule for prefix {0:?}")]
    DuplicatePrefix(String),

    #[error("excluded extension must be a bare extension like \"png\": {0:?}")]
    InvalidExtension(String),
}
