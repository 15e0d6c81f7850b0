//! HTTP surface: gate middleware, upstream proxy and router.

mod middleware;
mod proxy;
mod routes;

pub use middleware::{
    Carriers, DEFAULT_CONTENT_SECURITY_POLICY, GateState, SecurityHeaders, gate_middleware,
};
pub use proxy::{ProxyState, UpstreamError, forward, router as proxy_router};
pub use routes::{HealthResponse, create_router, gated, health};
