//! Authentication module.
//!
//! Reads the two credential carriers a browser presents on every request:
//! - the access token (JWT), validated for structure and expiry
//! - the persisted session state, which carries the user's role

mod claims;
mod config;
mod error;
mod session;
mod token;

pub use claims::{Role, TokenClaims, UserId};
pub use config::{AuthConfig, ConfigValidationError};
pub use error::{AuthError, Denial};
pub use session::SessionClaims;
pub use token::TokenValidator;
