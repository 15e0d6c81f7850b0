//! Request-time authorization gateway.
//!
//! Every navigation is checked against an access token and a role carried in
//! the persisted session, then either forwarded or redirected to the login or
//! forbidden page.

pub mod api;
pub mod auth;
pub mod gate;
pub mod policy;
pub mod settings;

pub use gate::{Credentials, Gate, GateConfigError, Grant, Outcome, normalize_path};
