//! Public paths and the gate's request matcher.

use std::collections::HashSet;

use super::PolicyConfig;

const ROOT: &str = "/";

/// Paths exempt from authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicPathSet {
    paths: HashSet<String>,
    prefixes: Vec<String>,
}

impl PublicPathSet {
    pub fn new(
        paths: impl IntoIterator<Item = String>,
        prefixes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            prefixes: prefixes.into_iter().collect(),
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(
            config.public_paths.iter().cloned(),
            config.public_prefixes.iter().cloned(),
        )
    }

    /// Exact member, under a public prefix, or the root path.
    pub fn is_public(&self, path: &str) -> bool {
        path == ROOT
            || self.paths.contains(path)
            || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Exact paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.paths.iter().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

/// Decides which requests the gate sees at all.
///
/// Build assets never reach the evaluation chain. Extension exclusion stops
/// at rule prefixes: a protected route stays protected whatever its suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMatcher {
    excluded_prefixes: Vec<String>,
    excluded_extensions: Vec<String>,
    protected_prefixes: Vec<String>,
}

impl RequestMatcher {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            excluded_prefixes: config.excluded_prefixes.clone(),
            excluded_extensions: config
                .excluded_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            protected_prefixes: config.rules.iter().map(|r| r.prefix.clone()).collect(),
        }
    }

    /// True when the request bypasses the gate.
    pub fn is_excluded(&self, path: &str) -> bool {
        if self
            .excluded_prefixes
            .iter()
            .any(|p| path.starts_with(p.as_str()))
        {
            return true;
        }

        if self.excluded_extensions.is_empty()
            || self
                .protected_prefixes
                .iter()
                .any(|p| path.starts_with(p.as_str()))
        {
            return false;
        }

        let last_segment = path.rsplit('/').next().unwrap_or(path);
        match last_segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .excluded_extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }

    pub fn excluded_prefixes(&self) -> &[String] {
        &self.excluded_prefixes
    }

    pub fn excluded_extensions(&self) -> &[String] {
        &self.excluded_extensions
    }
}
