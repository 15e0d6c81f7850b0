//! Access-token validation.
//!
//! Tokens are decoded structurally and checked for expiry. Signature
//! verification is left to the issuing service unless a verification
//! secret is configured.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use log::debug;

use super::{AuthError, TokenClaims};

/// Decodes access tokens and enforces expiry.
#[derive(Clone)]
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    verify_signature: bool,
}

impl TokenValidator {
    /// Validator that trusts the token's structure and only enforces expiry.
    pub fn structural() -> Self {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        Self::with_validation(DecodingKey::from_secret(&[]), validation, false)
    }

    /// Validator that additionally verifies an HS256 signature.
    pub fn with_secret(secret: &str) -> Self {
        let validation = Validation::new(Algorithm::HS256);
        Self::with_validation(DecodingKey::from_secret(secret.as_bytes()), validation, true)
    }

    fn with_validation(
        decoding_key: DecodingKey,
        mut validation: Validation,
        verify_signature: bool,
    ) -> Self {
        // Expiry is compared here in milliseconds, not by the library.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        Self {
            decoding_key,
            validation,
            verify_signature,
        }
    }

    /// Whether signatures are checked.
    pub fn verifies_signature(&self) -> bool {
        self.verify_signature
    }

    /// Validate a possibly-absent token at `now_ms` (milliseconds since the epoch).
    pub fn validate(&self, token: Option<&str>, now_ms: i64) -> Result<TokenClaims, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("access token rejected: {e}");
                AuthError::MalformedToken(e.to_string())
            })?
            .claims;

        if claims.subject().is_none() {
            return Err(AuthError::MalformedToken("token has no subject".to_string()));
        }

        if claims.expires_at_ms() < now_ms {
            return Err(AuthError::ExpiredToken);
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("verifies_signature", &self.verifies_signature())
            .finish_non_exhaustive()
    }
}
