//! Reverse proxy to the rendering upstream.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, Uri, header},
    response::Response,
};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use log::{debug, error};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("invalid upstream url {0:?}: {1}")]
    InvalidUri(String, String),
    #[error("upstream url {0:?} must be http://host[:port][/base]")]
    Unsupported(String),
}

/// Where allowed requests go.
#[derive(Clone)]
pub struct ProxyState {
    base: String,
    authority: HeaderValue,
    client: Client<HttpConnector, Body>,
}

impl ProxyState {
    pub fn new(upstream: &str) -> Result<Self, UpstreamError> {
        let uri: Uri = upstream
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| {
                UpstreamError::InvalidUri(upstream.to_string(), e.to_string())
            })?;

        if uri.scheme_str() != Some("http") || uri.query().is_some() {
            return Err(UpstreamError::Unsupported(upstream.to_string()));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| UpstreamError::Unsupported(upstream.to_string()))?;
        let authority = HeaderValue::from_str(authority.as_str())
            .map_err(|e| UpstreamError::InvalidUri(upstream.to_string(), e.to_string()))?;

        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            base: upstream.trim_end_matches('/').to_string(),
            authority,
            client,
        })
    }

    /// Upstream URI for an inbound request URI.
    pub fn target_uri(&self, inbound: &Uri) -> Result<Uri, StatusCode> {
        let path_and_query = inbound
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = format!("{}{}", self.base, path_and_query);
        target.parse().map_err(|e| {
            error!("Invalid target URI {}: {:?}", target, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

/// Router sending every request upstream.
pub fn router(state: ProxyState) -> Router {
    Router::new().fallback(forward).with_state(state)
}

/// Stream the request upstream and hand back its response.
pub async fn forward(
    State(state): State<ProxyState>,
    req: Request<Body>,
) -> Result<Response, StatusCode> {
    let target = state.target_uri(req.uri())?;
    debug!("Proxying {} {}", req.method(), target);

    let (mut parts, body) = req.into_parts();
    if let Some(host) = parts.headers.get(header::HOST).cloned() {
        parts
            .headers
            .insert(header::HeaderName::from_static("x-forwarded-host"), host);
    }
    parts.headers.insert(header::HOST, state.authority.clone());
    parts.uri = target;

    let forwarded = Request::from_parts(parts, body);
    match state.client.request(forwarded).await {
        Ok(res) => {
            let (parts, body) = res.into_parts();
            Ok(Response::from_parts(parts, Body::new(body)))
        }
        Err(err) => {
            error!("Proxy request failed: {:?}", err);
            Err(if err.is_connect() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::BAD_GATEWAY
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_uri_keeps_path_and_query() {
        let state = ProxyState::new("http://127.0.0.1:3000/").unwrap();
        let inbound: Uri = "/editor/7?tab=genes".parse().unwrap();
        assert_eq!(
            state.target_uri(&inbound).unwrap().to_string(),
            "http://127.0.0.1:3000/editor/7?tab=genes"
        );
    }

    #[test]
    fn test_target_uri_with_base_path() {
        let state = ProxyState::new("http://app.internal/atlas").unwrap();
        let inbound: Uri = "/dashboard".parse().unwrap();
        assert_eq!(
            state.target_uri(&inbound).unwrap().to_string(),
            "http://app.internal/atlas/dashboard"
        );
    }

    #[test]
    fn test_rejects_unsupported_upstreams() {
        assert!(matches!(
            ProxyState::new("https://example.com"),
            Err(UpstreamError::Unsupported(_))
        ));
        assert!(matches!(
            ProxyState::new("/relative"),
            Err(UpstreamError::Unsupported(_))
        ));
        assert!(matches!(
            ProxyState::new("http://exa mple"),
            Err(UpstreamError::InvalidUri(..))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_unavailable() {
        // Port 9 (discard) is not listening on loopback in test environments.
        let state = ProxyState::new("http://127.0.0.1:9").unwrap();
        let req = Request::builder()
            .uri("/dashboard")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            forward(State(state), req).await.unwrap_err(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
