//! Session-state carrier.
//!
//! The browser persists the auth store as URL-encoded JSON of the form
//! `{"state":{"user":{"role":"..","username":".."}, ..}, "version":0}`.
//! It is evaluated independently of the access token.

use serde::Deserialize;

use super::{AuthError, Role};

#[derive(Debug, Deserialize)]
struct PersistedStore {
    state: PersistedState,
}

#[derive(Debug, Deserialize)]
struct PersistedState {
    #[serde(default)]
    user: Option<PersistedUser>,
}

#[derive(Debug, Deserialize)]
struct PersistedUser {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

/// Identity read from the session-state carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    /// Role, if the session has one.
    pub role: Option<Role>,
    /// Username, if present.
    pub username: Option<String>,
}

impl SessionClaims {
    /// Parse the raw cookie value.
    ///
    /// Absent or empty input is `MissingSession`; anything that does not
    /// decode to the expected structure is `MalformedSession`.
    pub fn parse(raw: Option<&str>) -> Result<Self, AuthError> {
        let raw = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSession)?;

        let decoded = urlencoding::decode(raw)
            .map_err(|e| AuthError::MalformedSession(format!("url decoding: {e}")))?;

        let store: PersistedStore = serde_json::from_str(&decoded)
            .map_err(|e| AuthError::MalformedSession(e.to_string()))?;

        let (role, username) = match store.state.user {
            Some(user) => (
                user.role.filter(|r| !r.is_empty()).map(Role::from),
                user.username,
            ),
            None => (None, None),
        };

        Ok(Self { role, username })
    }

    /// The session's role, or `NoRole`.
    pub fn require_role(&self) -> Result<&Role, AuthError> {
        self.role.as_ref().ok_or(AuthError::NoRole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(json: &str) -> String {
        urlencoding::encode(json).into_owned()
    }

    #[test]
    fn test_parse_persisted_store() {
        let raw = encoded(
            r#"{"state":{"user":{"username":"ana","email":"a@x","role":"WRITER","is_staff":false},"isAuthenticated":true},"version":0}"#,
        );
        let session = SessionClaims::parse(Some(&raw)).unwrap();
        assert_eq!(session.role, Some(Role::Writer));
        assert_eq!(session.username.as_deref(), Some("ana"));
        assert_eq!(session.require_role().unwrap(), &Role::Writer);
    }

    #[test]
    fn test_parse_accepts_unencoded_json() {
        let session =
            SessionClaims::parse(Some(r#"{"state":{"user":{"role":"READER"}}}"#)).unwrap();
        assert_eq!(session.role, Some(Role::Reader));
        assert_eq!(session.username, None);
    }

    #[test]
    fn test_missing_session() {
        assert_eq!(SessionClaims::parse(None).unwrap_err(), AuthError::MissingSession);
        assert_eq!(SessionClaims::parse(Some("")).unwrap_err(), AuthError::MissingSession);
    }

    #[test]
    fn test_malformed_session() {
        let cases = [
            "not json".to_string(),
            encoded("{\"state\":"),
            encoded(r#"{"user":{"role":"ADMIN"}}"#),
            encoded(r#"{"state":{"user":{"role":5}}}"#),
            "%E0%A4%A".to_string(),
        ];
        for case in cases {
            assert!(
                matches!(
                    SessionClaims::parse(Some(&case)),
                    Err(AuthError::MalformedSession(_))
                ),
                "{case} should be malformed"
            );
        }
    }

    #[test]
    fn test_logged_out_store_has_no_role() {
        let raw = encoded(r#"{"state":{"user":null,"isAuthenticated":false},"version":0}"#);
        let session = SessionClaims::parse(Some(&raw)).unwrap();
        assert_eq!(session.require_role().unwrap_err(), AuthError::NoRole);
    }

    #[test]
    fn test_empty_role_is_no_role() {
        let raw = encoded(r#"{"state":{"user":{"role":"","username":"x"}}}"#);
        let session = SessionClaims::parse(Some(&raw)).unwrap();
        assert_eq!(session.role, None);
        assert_eq!(session.require_role().unwrap_err(), AuthError::NoRole);
    }
}
