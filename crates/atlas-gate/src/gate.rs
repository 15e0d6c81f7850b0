//! Per-request authorization.
//!
//! A request walks public check → token → session → role → path policy and
//! stops at the first failure. Every evaluation ends in exactly one
//! [`Outcome`].

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::auth::{
    AuthConfig, AuthError, ConfigValidationError, Denial, Role, SessionClaims, TokenValidator,
};
use crate::policy::{Decision, PermissionResolver, PolicyConfig, PolicyConfigError, RequestMatcher};

/// Raw credential carriers taken from a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    /// Access token.
    pub token: Option<&'a str>,
    /// URL-encoded session state.
    pub session: Option<&'a str>,
}

/// What the gateway does with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Hand the request to the next handler.
    Proceed,
    /// Send the client to the login page, remembering where it came from.
    RedirectLogin { from: String },
    /// Send the client to the forbidden page.
    RedirectForbidden,
}

/// Why a request was let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Path needs no credentials.
    Public,
    /// Credentials checked and the role is allowed.
    Authorized {
        subject: String,
        role: Role,
        username: Option<String>,
    },
}

/// Errors building a [`Gate`] from configuration.
#[derive(Debug, Error)]
pub enum GateConfigError {
    #[error(transparent)]
    Auth(#[from] ConfigValidationError),
    #[error(transparent)]
    Policy(#[from] PolicyConfigError),
}

/// The authorization gateway. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Gate {
    validator: TokenValidator,
    resolver: PermissionResolver,
    matcher: RequestMatcher,
    login_path: String,
    forbidden_path: String,
}

impl Gate {
    pub fn new(
        validator: TokenValidator,
        resolver: PermissionResolver,
        matcher: RequestMatcher,
        auth: &AuthConfig,
    ) -> Self {
        Self {
            validator,
            resolver,
            matcher,
            login_path: auth.login_path.clone(),
            forbidden_path: auth.forbidden_path.clone(),
        }
    }

    /// Build a gate from validated configuration.
    pub fn from_config(auth: &AuthConfig, policy: &PolicyConfig) -> Result<Self, GateConfigError> {
        auth.validate()?;
        let validator = match auth.resolve_verify_secret()? {
            Some(secret) => TokenValidator::with_secret(&secret),
            None => TokenValidator::structural(),
        };
        let resolver = PermissionResolver::from_config(policy)?;
        let matcher = RequestMatcher::from_config(policy);
        Ok(Self::new(validator, resolver, matcher, auth))
    }

    /// True when the request skips the gate entirely.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.matcher.is_excluded(path)
    }

    /// Run the full chain and report either the grant or the first failure.
    pub fn authorize(
        &self,
        path: &str,
        credentials: Credentials<'_>,
        now_ms: i64,
    ) -> Result<Grant, AuthError> {
        if self.resolver.is_public(path) {
            return Ok(Grant::Public);
        }

        let claims = self.validator.validate(credentials.token, now_ms)?;
        let session = SessionClaims::parse(credentials.session)?;
        let role = session.require_role()?;

        match self.resolver.resolve(path, Some(role)) {
            Decision::Allow => Ok(Grant::Authorized {
                subject: claims.subject().unwrap_or_default(),
                role: role.clone(),
                username: session.username.clone(),
            }),
            Decision::DenyNoRole => Err(AuthError::NoRole),
            Decision::DenyForbidden { required_roles } => Err(AuthError::InsufficientRole {
                role: role.clone(),
                required: required_roles,
            }),
        }
    }

    /// Evaluate a request to its outcome.
    pub fn evaluate(&self, path: &str, credentials: Credentials<'_>, now_ms: i64) -> Outcome {
        match self.authorize(path, credentials, now_ms) {
            Ok(_) => Outcome::Proceed,
            Err(err) => {
                debug!("denied {path}: {} ({err})", err.code());
                Self::outcome_for(&err, path)
            }
        }
    }

    /// Collapse an error onto the redirect the client sees.
    pub fn outcome_for(err: &AuthError, path: &str) -> Outcome {
        match err.denial() {
            Denial::Login => Outcome::RedirectLogin {
                from: path.to_string(),
            },
            Denial::Forbidden => Outcome::RedirectForbidden,
        }
    }

    /// Redirect target for an outcome, `None` for [`Outcome::Proceed`].
    pub fn location(&self, outcome: &Outcome) -> Option<String> {
        match outcome {
            Outcome::Proceed => None,
            Outcome::RedirectLogin { from } => Some(format!(
                "{}?from={}",
                self.login_path,
                encode_query_value(from)
            )),
            Outcome::RedirectForbidden => Some(self.forbidden_path.clone()),
        }
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn matcher(&self) -> &RequestMatcher {
        &self.matcher
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }
}

/// Canonical form of a request path, as the upstream will resolve it.
///
/// Percent-decodes once, treats `\` as `/`, drops empty and `.` segments and
/// resolves `..`. Returns `None` when the decoded path is not UTF-8.
pub fn normalize_path(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw).ok()?;

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Some("/".to_string());
    }
    let mut path = String::with_capacity(decoded.len());
    for segment in segments {
        path.push('/');
        path.push_str(segment);
    }
    Some(path)
}

/// Percent-encode a query value, keeping `/` readable (legal in a query).
fn encode_query_value(value: &str) -> String {
    urlencoding::encode(value).replace("%2F", "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::UnlistedPolicy;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    const NOW_MS: i64 = 1_750_000_000_000;
    const NOW_S: i64 = NOW_MS / 1000;

    fn gate() -> Gate {
        Gate::from_config(&AuthConfig::default(), &PolicyConfig::default()).unwrap()
    }

    fn token(exp: i64) -> String {
        encode(
            &Header::default(),
            &json!({"token_type": "access", "exp": exp, "user_id": 12}),
            &EncodingKey::from_secret(b"issuer"),
        )
        .unwrap()
    }

    fn session(role: &str) -> String {
        urlencoding::encode(
            &json!({"state": {"user": {"username": "sam", "role": role}}}).to_string(),
        )
        .into_owned()
    }

    fn login(from: &str) -> Outcome {
        Outcome::RedirectLogin {
            from: from.to_string(),
        }
    }

    #[test]
    fn test_scenario_a_no_cookies_redirects_to_login() {
        let g = gate();
        let outcome = g.evaluate("/dashboard", Credentials::default(), NOW_MS);
        assert_eq!(outcome, login("/dashboard"));
        assert_eq!(g.location(&outcome).unwrap(), "/login?from=/dashboard");
    }

    #[test]
    fn test_scenario_b_reader_on_editor_is_forbidden() {
        let g = gate();
        let t = token(NOW_S + 3600);
        let s = session("READER");
        let creds = Credentials {
            token: Some(&t),
            session: Some(&s),
        };
        let outcome = g.evaluate("/editor", creds, NOW_MS);
        assert_eq!(outcome, Outcome::RedirectForbidden);
        assert_eq!(g.location(&outcome).unwrap(), "/403");

        assert_eq!(
            g.authorize("/editor", creds, NOW_MS).unwrap_err(),
            AuthError::InsufficientRole {
                role: Role::Reader,
                required: vec![Role::Admin, Role::Writer],
            }
        );
    }

    #[test]
    fn test_scenario_c_writer_on_editor_proceeds() {
        let g = gate();
        let t = token(NOW_S + 3600);
        let s = session("WRITER");
        let creds = Credentials {
            token: Some(&t),
            session: Some(&s),
        };
        assert_eq!(g.evaluate("/editor", creds, NOW_MS), Outcome::Proceed);
        assert_eq!(
            g.authorize("/editor", creds, NOW_MS).unwrap(),
            Grant::Authorized {
                subject: "12".to_string(),
                role: Role::Writer,
                username: Some("sam".to_string()),
            }
        );
    }

    #[test]
    fn test_scenario_d_expired_token_redirects_to_login() {
        let g = gate();
        let t = token(NOW_S - 10);
        let s = session("ADMIN");
        let creds = Credentials {
            token: Some(&t),
            session: Some(&s),
        };
        assert_eq!(g.evaluate("/profile", creds, NOW_MS), login("/profile"));
        assert_eq!(
            g.authorize("/profile", creds, NOW_MS).unwrap_err(),
            AuthError::ExpiredToken
        );
    }

    #[test]
    fn test_scenario_e_public_path_without_token() {
        let g = gate();
        assert_eq!(
            g.evaluate("/gene-assignment", Credentials::default(), NOW_MS),
            Outcome::Proceed
        );
        assert_eq!(
            g.authorize("/gene-assignment", Credentials::default(), NOW_MS).unwrap(),
            Grant::Public
        );
    }

    #[test]
    fn test_public_paths_ignore_bad_credentials() {
        let g = gate();
        let creds = Credentials {
            token: Some("garbage"),
            session: Some("garbage"),
        };
        for path in ["/", "/login", "/about", "/api/auth/refresh", "/api/auth/x/y"] {
            assert_eq!(g.evaluate(path, creds, NOW_MS), Outcome::Proceed, "{path}");
        }
    }

    #[test]
    fn test_valid_token_without_session_is_unauthenticated() {
        let g = gate();
        let t = token(NOW_S + 60);
        let creds = Credentials {
            token: Some(&t),
            session: None,
        };
        assert_eq!(g.evaluate("/dashboard", creds, NOW_MS), login("/dashboard"));
        assert_eq!(
            g.authorize("/dashboard", creds, NOW_MS).unwrap_err(),
            AuthError::MissingSession
        );

        let creds = Credentials {
            token: Some(&t),
            session: Some("%7Bbroken"),
        };
        assert_eq!(g.evaluate("/dashboard", creds, NOW_MS), login("/dashboard"));
    }

    #[test]
    fn test_session_without_role_redirects_to_login() {
        let g = gate();
        let t = token(NOW_S + 60);
        let s = urlencoding::encode(r#"{"state":{"user":null}}"#).into_owned();
        let creds = Credentials {
            token: Some(&t),
            session: Some(&s),
        };
        assert_eq!(
            g.authorize("/dashboard", creds, NOW_MS).unwrap_err(),
            AuthError::NoRole
        );
        assert_eq!(g.evaluate("/dashboard", creds, NOW_MS), login("/dashboard"));
    }

    #[test]
    fn test_token_checked_before_session() {
        let g = gate();
        let s = session("ADMIN");
        let creds = Credentials {
            token: Some("not.a.jwt"),
            session: Some(&s),
        };
        assert!(matches!(
            g.authorize("/admin", creds, NOW_MS),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_unlisted_path_proceeds_only_when_authenticated() {
        let g = gate();
        assert_eq!(
            g.evaluate("/genes", Credentials::default(), NOW_MS),
            login("/genes")
        );

        let t = token(NOW_S + 60);
        let s = session("READER");
        let creds = Credentials {
            token: Some(&t),
            session: Some(&s),
        };
        assert_eq!(g.evaluate("/genes", creds, NOW_MS), Outcome::Proceed);
    }

    #[test]
    fn test_fail_closed_unlisted_policy() {
        let policy = PolicyConfig {
            unlisted_policy: UnlistedPolicy::Deny,
            ..PolicyConfig::default()
        };
        let g = Gate::from_config(&AuthConfig::default(), &policy).unwrap();
        let t = token(NOW_S + 60);
        let s = session("ADMIN");
        let creds = Credentials {
            token: Some(&t),
            session: Some(&s),
        };
        assert_eq!(g.evaluate("/genes", creds, NOW_MS), Outcome::RedirectForbidden);
        assert_eq!(g.evaluate("/admin", creds, NOW_MS), Outcome::Proceed);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let g = gate();
        let t = token(NOW_S + 1);
        let s = session("VALIDATOR");
        let creds = Credentials {
            token: Some(&t),
            session: Some(&s),
        };
        for path in ["/dashboard", "/editor", "/genes", "/"] {
            assert_eq!(
                g.evaluate(path, creds, NOW_MS),
                g.evaluate(path, creds, NOW_MS),
                "{path}"
            );
        }
    }

    #[test]
    fn test_login_location_encodes_from() {
        let g = gate();
        let outcome = login("/editor/a b&c");
        assert_eq!(
            g.location(&outcome).unwrap(),
            "/login?from=/editor/a%20b%26c"
        );
        assert_eq!(g.location(&Outcome::Proceed), None);
    }

    #[test]
    fn test_custom_redirect_targets() {
        let auth = AuthConfig {
            login_path: "/signin".to_string(),
            forbidden_path: "/denied".to_string(),
            ..AuthConfig::default()
        };
        let g = Gate::from_config(&auth, &PolicyConfig::default()).unwrap();
        assert_eq!(
            g.location(&login("/profile")).unwrap(),
            "/signin?from=/profile"
        );
        assert_eq!(g.location(&Outcome::RedirectForbidden).unwrap(), "/denied");
    }

    #[test]
    fn test_from_config_rejects_invalid_policy() {
        let mut policy = PolicyConfig::default();
        policy.rules.push(policy.rules[0].clone());
        assert!(matches!(
            Gate::from_config(&AuthConfig::default(), &policy),
            Err(GateConfigError::Policy(PolicyConfigError::DuplicatePrefix(_)))
        ));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/").as_deref(), Some("/"));
        assert_eq!(normalize_path("").as_deref(), Some("/"));
        assert_eq!(normalize_path("/%65ditor").as_deref(), Some("/editor"));
        assert_eq!(normalize_path("//editor//7/").as_deref(), Some("/editor/7"));
        assert_eq!(normalize_path("/about/../editor").as_deref(), Some("/editor"));
        assert_eq!(normalize_path("/./editor/%2e%2e/admin").as_deref(), Some("/admin"));
        assert_eq!(normalize_path("/../../editor").as_deref(), Some("/editor"));
        assert_eq!(normalize_path("/\\editor").as_deref(), Some("/editor"));
        assert_eq!(normalize_path("/a%20b").as_deref(), Some("/a b"));
        assert_eq!(normalize_path("/%FF"), None);
    }

    #[test]
    fn test_normalized_path_reaches_rule() {
        let g = gate();
        let t = token(NOW_S + 60);
        let s = session("READER");
        let creds = Credentials {
            token: Some(&t),
            session: Some(&s),
        };
        let path = normalize_path("/%65ditor/7").unwrap();
        assert_eq!(g.evaluate(&path, creds, NOW_MS), Outcome::RedirectForbidden);
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let json = serde_json::to_value(login("/x")).unwrap();
        assert_eq!(json, json!({"outcome": "redirect_login", "from": "/x"}));
    }
}
