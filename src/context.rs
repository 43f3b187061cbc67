//! Request-scoped tenancy context.
//!
//! The tenancy resolver (§4.1) binds `(user, clientId)` once per
//! request; every downstream call reads it through this typed value
//! rather than through process-wide mutable state (§9 design note).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::models::{Client, User};

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub user: User,
    /// `None` only for routes that opt out of tenancy entirely
    /// (`SkipClientValidation`) while still requiring authentication.
    pub client_id: Option<String>,
}

impl RequestContext {
    /// Panics are not appropriate at the HTTP boundary; handlers on
    /// tenanted routes should use this and propagate the resulting
    /// error rather than unwrap.
    pub fn require_client_id(&self) -> Result<&str, crate::error::ApiError> {
        self.client_id
            .as_deref()
            .ok_or_else(|| crate::error::ApiError::BadRequest("no active client".to_string()))
    }
}

/// Client derived from a `Client` row, attached to the context by the
/// tenancy layer once resolution completes, for handlers that need the
/// full row rather than just its id.
#[derive(Debug, Clone)]
pub struct BoundClient(pub Client);

/// Lets handlers take `RequestContext` directly as an extractor instead
/// of reaching into `request.extensions()` by hand. The tenancy layer
/// guarantees this extension is present on every route it runs ahead
/// of; its absence means the route forgot the middleware, which is a
/// wiring bug worth surfacing as a 500 rather than silently treating
/// the caller as anonymous.
#[async_trait::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ApiError::Internal("tenancy middleware did not run for this route".to_string()))
    }
}
