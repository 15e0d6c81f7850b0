//! Route policy: public paths, the permission table, and path resolution.

mod config;
mod permissions;
mod public;
mod resolver;

pub use config::{PermissionRule, PolicyConfig, PolicyConfigError, UnlistedPolicy};
pub use permissions::{PathPermission, PermissionTable};
pub use public::{PublicPathSet, RequestMatcher};
pub use resolver::{Decision, PermissionResolver};
