//! Test utilities and common setup.
#![allow(dead_code)]

use atlas_gate::api::{self, DEFAULT_CONTENT_SECURITY_POLICY, GateState, SecurityHeaders};
use atlas_gate::auth::AuthConfig;
use atlas_gate::gate::Gate;
use atlas_gate::policy::PolicyConfig;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use tower::ServiceExt;

pub const ISSUER_SECRET: &str = "issuer-secret-used-only-by-tests";

/// Upstream stand-in: echoes the path it received.
pub fn echo_upstream() -> Router {
    Router::new().fallback(|req: Request<Body>| async move {
        format!("upstream:{}", req.uri().path())
    })
}

pub fn test_app_with(auth: AuthConfig, policy: PolicyConfig) -> Router {
    let gate = Gate::from_config(&auth, &policy).unwrap();
    let headers = SecurityHeaders::standard(DEFAULT_CONTENT_SECURITY_POLICY).unwrap();
    api::create_router(GateState::new(gate, auth, headers), echo_upstream())
}

/// Gateway with the reference policy in front of [`echo_upstream`].
pub fn test_app() -> Router {
    test_app_with(AuthConfig::default(), PolicyConfig::default())
}

/// Access token expiring `ttl_secs` from now (negative for already expired).
pub fn access_token(ttl_secs: i64) -> String {
    let exp = Utc::now().timestamp() + ttl_secs;
    encode(
        &Header::default(),
        &json!({"token_type": "access", "exp": exp, "iat": exp - 3600, "user_id": 7}),
        &EncodingKey::from_secret(ISSUER_SECRET.as_bytes()),
    )
    .unwrap()
}

/// URL-encoded persisted session for `role`.
pub fn session_state(role: &str) -> String {
    let state = json!({
        "state": {"user": {"id": 7, "username": "curator", "role": role}},
        "version": 0
    });
    urlencoding::encode(&state.to_string()).into_owned()
}

/// Cookie header carrying both credentials.
pub fn auth_cookies(token: &str, session: &str) -> String {
    format!("accessToken={token}; auth-storage={session}")
}

pub async fn get(app: Router, path: &str, cookie: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    app.oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
