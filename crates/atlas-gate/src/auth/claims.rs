//! Access-token claims and user roles.

use serde::{Deserialize, Serialize};

/// User role as issued by the login service.
///
/// Role identifiers are compared case-sensitively. Identifiers outside the
/// known set are kept verbatim in [`Role::Other`] so new roles can be
/// granted through configuration alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Full access.
    Admin,
    /// Annotates genes.
    Annotator,
    /// Read-only access.
    Reader,
    /// Validates submitted annotations.
    Validator,
    /// Edits content.
    Writer,
    /// Any other identifier.
    Other(String),
}

impl Role {
    /// The identifier exactly as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "ADMIN",
            Role::Annotator => "ANNOTATOR",
            Role::Reader => "READER",
            Role::Validator => "VALIDATOR",
            Role::Writer => "WRITER",
            Role::Other(name) => name,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            "ADMIN" => Role::Admin,
            "ANNOTATOR" => Role::Annotator,
            "READER" => Role::Reader,
            "VALIDATOR" => Role::Validator,
            "WRITER" => Role::Writer,
            other => Role::Other(other.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::from(s.as_str())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::from(s))
    }
}

/// User identifier as carried in the `user_id` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{n}"),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

/// Claims read from an access token.
///
/// Only `exp` and a subject are required. The login service issues
/// `user_id`; standard issuers use `sub`. Either satisfies the subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiration time (Unix timestamp, seconds).
    pub exp: i64,

    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,

    /// Numeric or string user identifier.
    #[serde(default)]
    pub user_id: Option<UserId>,

    /// Token type (`access` or `refresh`).
    #[serde(default)]
    pub token_type: Option<String>,

    /// Issued at (Unix timestamp, seconds).
    #[serde(default)]
    pub iat: Option<i64>,

    /// JWT ID.
    #[serde(default)]
    pub jti: Option<String>,
}

impl TokenClaims {
    /// Resolve the subject identifier, preferring `sub` over `user_id`.
    pub fn subject(&self) -> Option<String> {
        self.sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.user_id.as_ref().map(UserId::to_string))
    }

    /// Expiry in milliseconds since the epoch.
    pub fn expires_at_ms(&self) -> i64 {
        self.exp.saturating_mul(1000)
    }
}
