//! Identity Verifier (§4 component table).
//!
//! Validates a bearer credential against an external OIDC issuer and
//! returns a stable subject identifier plus profile claims. This is
//! explicitly an external collaborator per the spec's scope ("Identity
//! validation against an external OIDC provider... consumed by the
//! tenancy layer") — `JwtIdentityVerifier` is the production-shaped
//! default, generalized from the teacher's Azure AD `TokenValidator`
//! to any standards-compliant OIDC issuer.
//!
//! ## Security notes
//!
//! 1. Always validate tokens server-side — never trust client claims.
//! 2. Verify signature against the issuer's published JWKS.
//! 3. Check audience, issuer, and expiration.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::config::AuthConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("invalid authorization header format")]
    InvalidFormat,

    #[error("token validation failed: {0}")]
    ValidationFailed(String),

    #[error("invalid audience")]
    InvalidAudience,

    #[error("invalid issuer")]
    InvalidIssuer,
}

/// Claims expected from the external OIDC issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Stable subject identifier — the value `User.externalSubject` is
    /// keyed on.
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// The identity the request authenticated as, before any tenancy
/// resolution happens.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub external_subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

impl From<TokenClaims> for VerifiedIdentity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            external_subject: claims.sub,
            email: claims.email,
            name: claims.name,
            avatar: claims.picture,
        }
    }
}

/// Verifies a bearer token against the external issuer. Out of scope
/// per §1 ("takes a bearer token, returns user identity"); this trait
/// is the seam the tenancy layer depends on.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Result<VerifiedIdentity, AuthError>;
}

pub struct JwtIdentityVerifier {
    config: AuthConfig,
    /// Disable signature verification only in development, mirroring
    /// the teacher's explicit dev-only escape hatch.
    skip_signature_validation: bool,
}

impl JwtIdentityVerifier {
    pub fn new(config: AuthConfig, is_production: bool) -> Self {
        Self {
            config,
            skip_signature_validation: !is_production,
        }
    }

    fn validate_token(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let _header =
            decode_header(token).map_err(|e| AuthError::ValidationFailed(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        let mut audiences = HashSet::new();
        audiences.insert(self.config.audience.clone());
        validation.aud = Some(audiences);

        if self.skip_signature_validation {
            tracing::warn!("JWT signature validation disabled — development mode only");
            validation.insecure_disable_signature_validation();
        } else {
            // Production requires real JWKS-backed verification. This
            // default implementation does not fetch JWKS; deployments
            // swap in a verifier that does, keeping this trait boundary
            // the only thing callers depend on.
            tracing::error!("JWT signature validation not configured for production issuer");
            return Err(AuthError::ValidationFailed(
                "token signature validation not configured".to_string(),
            ));
        }

        let token_data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(&[]),
            &validation,
        )
        .map_err(|e| AuthError::ValidationFailed(e.to_string()))?;

        let claims = token_data.claims;

        if !claims.iss.starts_with(&self.config.issuer_domain) && claims.iss != self.config.issuer
        {
            return Err(AuthError::InvalidIssuer);
        }

        Ok(VerifiedIdentity::from(claims))
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<VerifiedIdentity, AuthError> {
        let token = bearer_token
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat)?;
        self.validate_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_identity_from_claims() {
        let claims = TokenClaims {
            sub: "user-sub".to_string(),
            aud: "app-id".to_string(),
            iss: "https://issuer.example.com/".to_string(),
            exp: 9_999_999_999,
            iat: 1_000_000_000,
            email: Some("user@example.com".to_string()),
            name: Some("Test User".to_string()),
            picture: None,
        };

        let identity = VerifiedIdentity::from(claims);
        assert_eq!(identity.external_subject, "user-sub");
        assert_eq!(identity.email.as_deref(), Some("user@example.com"));
    }
}
