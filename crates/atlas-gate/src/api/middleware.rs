//! Gate middleware.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderMap, HeaderName, HeaderValue, Request, StatusCode,
        header::{self, AUTHORIZATION, COOKIE, InvalidHeaderValue},
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use log::debug;

use crate::auth::AuthConfig;
use crate::gate::{Credentials, Gate, normalize_path};

/// Default Content-Security-Policy for allowed responses.
pub const DEFAULT_CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self' 'unsafe-inline' 'unsafe-eval'; style-src 'self' 'unsafe-inline';";

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = parts.next()?;
    if token.is_empty() || parts.next().is_some() {
        return None;
    }

    Some(token)
}

fn cookie_from_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim())
        } else {
            None
        }
    })
}

/// First value of `name` across every Cookie header.
fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| cookie_from_header(value, name))
}

/// Credential carriers pulled out of a request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Carriers {
    pub token: Option<String>,
    pub session: Option<String>,
}

impl Carriers {
    /// Token cookie first, then the Bearer header when allowed.
    pub fn from_headers(headers: &HeaderMap, config: &AuthConfig) -> Self {
        let mut token = find_cookie(headers, &config.token_cookie);
        if token.is_none() && config.accept_bearer_header {
            token = headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(bearer_token_from_header);
        }

        Self {
            token: token.map(str::to_string),
            session: find_cookie(headers, &config.session_cookie).map(str::to_string),
        }
    }

    pub fn credentials(&self) -> Credentials<'_> {
        Credentials {
            token: self.token.as_deref(),
            session: self.session.as_deref(),
        }
    }
}

/// Response headers added to every request the gate lets through.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn none() -> Self {
        Self::default()
    }

    /// Frame, sniffing and referrer protections, plus a CSP unless `csp` is empty.
    pub fn standard(csp: &str) -> Result<Self, InvalidHeaderValue> {
        let mut headers = vec![
            (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
            (
                header::REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ),
        ];
        if !csp.trim().is_empty() {
            headers.push((
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_str(csp.trim())?,
            ));
        }
        Ok(Self { headers })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(k, v)| (k, v))
    }

    fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// State shared by the gate middleware.
#[derive(Clone)]
pub struct GateState {
    gate: Arc<Gate>,
    carriers: Arc<AuthConfig>,
    headers: Arc<SecurityHeaders>,
}

impl GateState {
    pub fn new(gate: Gate, carriers: AuthConfig, headers: SecurityHeaders) -> Self {
        Self {
            gate: Arc::new(gate),
            carriers: Arc::new(carriers),
            headers: Arc::new(headers),
        }
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }
}

/// Evaluate the request and either pass it on or redirect.
///
/// Exclusion and evaluation both see the normalized path.
pub async fn gate_middleware(
    State(state): State<GateState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(path) = normalize_path(req.uri().path()) else {
        debug!("{} {}: path is not valid UTF-8", req.method(), req.uri().path());
        return StatusCode::BAD_REQUEST.into_response();
    };
    if state.gate.is_excluded(&path) {
        return next.run(req).await;
    }

    let carriers = Carriers::from_headers(req.headers(), &state.carriers);
    let now_ms = Utc::now().timestamp_millis();
    let outcome = state.gate.evaluate(&path, carriers.credentials(), now_ms);

    match state.gate.location(&outcome) {
        Some(location) => {
            debug!("{} {path} -> {location}", req.method());
            Redirect::temporary(&location).into_response()
        }
        None => {
            let mut response = next.run(req).await;
            state.headers.apply(response.headers_mut());
            response
        }
    }
}
