//! Authorization errors.

use thiserror::Error;

use super::Role;

/// Reasons a request is refused.
///
/// The variants stay internal to the gateway. Clients only ever observe one
/// of two redirects; see [`AuthError::denial`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No access token on the request.
    #[error("missing access token")]
    MissingToken,

    /// Access token could not be decoded.
    #[error("malformed access token: {0}")]
    MalformedToken(String),

    /// Access token expiry lies in the past.
    #[error("access token expired")]
    ExpiredToken,

    /// No session-state carrier on the request.
    #[error("missing session state")]
    MissingSession,

    /// Session-state carrier present but not parseable.
    #[error("malformed session state: {0}")]
    MalformedSession(String),

    /// Session carries no role.
    #[error("session has no role")]
    NoRole,

    /// Role is not allowed on the requested path.
    #[error("role {role} not in required roles [{}]", join_roles(.required))]
    InsufficientRole {
        /// Role presented by the session.
        role: Role,
        /// Roles allowed on the matched prefix.
        required: Vec<Role>,
    },
}

/// Which redirect an error collapses to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Credentials are missing or unusable.
    Login,
    /// Credentials are fine but the role is not allowed.
    Forbidden,
}

impl AuthError {
    /// Map the error onto its externally visible outcome.
    pub fn denial(&self) -> Denial {
        match self {
            AuthError::InsufficientRole { .. } => Denial::Forbidden,
            _ => Denial::Login,
        }
    }

    /// Short machine-readable code, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::MissingSession => "missing_session",
            AuthError::MalformedSession(_) => "malformed_session",
            AuthError::NoRole => "no_role",
            AuthError::InsufficientRole { .. } => "insufficient_role",
        }
    }
}

fn join_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
