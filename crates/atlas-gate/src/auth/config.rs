//! Credential-carrier and redirect configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Cookie carrying the access token.
    pub token_cookie: String,

    /// Cookie carrying the URL-encoded session state.
    pub session_cookie: String,

    /// Also accept `Authorization: Bearer <token>` when the cookie is absent.
    pub accept_bearer_header: bool,

    /// Redirect target for unauthenticated requests.
    pub login_path: String,

    /// Redirect target for authenticated requests lacking the role.
    pub forbidden_path: String,

    /// Optional HS256 secret. When set, token signatures are verified.
    /// Supports `env:VAR_NAME` to read the secret from the environment.
    pub verify_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_cookie: "accessToken".to_string(),
            session_cookie: "auth-storage".to_string(),
            accept_bearer_header: true,
            login_path: "/login".to_string(),
            forbidden_path: "/403".to_string(),
            verify_secret: None,
        }
    }
}

impl AuthConfig {
    /// Resolve the verification secret, expanding `env:VAR_NAME` syntax.
    pub fn resolve_verify_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        match &self.verify_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
                    }
                } else if value.is_empty() {
                    Err(ConfigValidationError::EmptyVerifySecret)
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (field, name) in [
            ("token_cookie", &self.token_cookie),
            ("session_cookie", &self.session_cookie),
        ] {
            if name.trim().is_empty() || name.contains([';', '=', ' ']) {
                return Err(ConfigValidationError::InvalidCookieName(field, name.clone()));
            }
        }

        for (field, path) in [
            ("login_path", &self.login_path),
            ("forbidden_path", &self.forbidden_path),
        ] {
            if !path.starts_with('/') || path.starts_with("//") {
                return Err(ConfigValidationError::InvalidRedirectPath(field, path.clone()));
            }
        }

        self.resolve_verify_secret()?;
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// Cookie names must be non-empty tokens.
    #[error("auth.{0} is not a valid cookie name: {1:?}")]
    InvalidCookieName(&'static str, String),

    /// Redirect targets must be local absolute paths.
    #[error("auth.{0} must be a local path starting with '/': {1:?}")]
    InvalidRedirectPath(&'static str, String),

    /// Literal secret is empty.
    #[error("auth.verify_secret is set but empty")]
    EmptyVerifySecret,

    /// Environment variable not found (for `env:VAR_NAME` syntax).
    #[error("environment variable '{0}' not found (referenced via env:{0} in config)")]
    EnvVarNotFound(String),

    /// Environment variable is empty (for `env:VAR_NAME` syntax).
    #[error("environment variable '{0}' is empty (referenced via env:{0} in config)")]
    EnvVarEmpty(String),
}
