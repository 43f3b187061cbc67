//! Tenancy Resolver (§4.1).
//!
//! Runs as axum middleware ahead of every tenanted handler, the way the
//! teacher's `HandlerContext` is built once per invocation rather than
//! threaded in piecemeal. Resolution writes a `RequestContext` into the
//! request extensions; handlers pull it out with the `RequestContext`
//! extractor rather than reaching into a process-wide global (§9).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::auth::IdentityVerifier;
use crate::context::RequestContext;
use crate::error::{ApiError, ErrorContext};
use crate::store::Store;

/// Per-route tenancy requirements, attached via `Extension` on routes
/// that deviate from the default (authenticated + tenant-scoped).
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteMeta {
    pub is_public: bool,
    pub skip_client_validation: bool,
}

impl RouteMeta {
    pub fn public() -> Self {
        Self {
            is_public: true,
            skip_client_validation: true,
        }
    }

    pub fn skip_client_validation() -> Self {
        Self {
            is_public: false,
            skip_client_validation: true,
        }
    }
}

pub struct TenancyDeps {
    pub identity_verifier: Arc<dyn IdentityVerifier>,
    pub store: Arc<dyn Store>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()
}

fn client_hint(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Implements the six-step algorithm from §4.1. `route_meta` defaults to
/// "authenticated, tenant required" when a route hasn't attached a
/// `RouteMeta` extension.
pub async fn resolve(
    deps: &TenancyDeps,
    headers: &HeaderMap,
    route_meta: RouteMeta,
) -> Result<RequestContext, ApiError> {
    let request_id = Uuid::new_v4().to_string();

    if route_meta.is_public {
        return Ok(RequestContext {
            request_id,
            user: crate::models::User {
                id: String::new(),
                external_subject: String::new(),
                email: String::new(),
                name: String::new(),
                avatar: None,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            },
            client_id: None,
        });
    }

    let token = bearer_token(headers).ok_or_else(|| {
        ApiError::Unauthorized("missing authorization header".to_string())
    })?;

    let identity = deps
        .identity_verifier
        .verify(token)
        .await
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let (user, _provisioned) = deps
        .store
        .get_or_provision(
            &identity.external_subject,
            identity.email.as_deref().unwrap_or(""),
            identity.name.as_deref().unwrap_or(""),
            identity.avatar.as_deref(),
        )
        .await?;

    if route_meta.skip_client_validation {
        return Ok(RequestContext {
            request_id,
            user,
            client_id: None,
        });
    }

    let client_id = if let Some(hint) = client_hint(headers) {
        let belongs = deps.store.belongs_to_user(&hint, &user.id).await?;
        if !belongs {
            return Err(ApiError::Forbidden("client does not belong to user".to_string()));
        }
        hint
    } else {
        deps.store
            .earliest_for_user(&user.id)
            .await?
            .ok_or_else(|| ApiError::BadRequest("user has no client".to_string()))?
            .id
    };

    Ok(RequestContext {
        request_id,
        user,
        client_id: Some(client_id),
    })
}

/// `axum::middleware::from_fn_with_state` entry point for routes using
/// the default tenancy requirement (authenticated, tenant bound).
pub async fn layer(
    State(deps): State<Arc<TenancyDeps>>,
    mut request: Request,
    next: Next,
) -> Response {
    let route_meta = request
        .extensions()
        .get::<RouteMeta>()
        .copied()
        .unwrap_or_default();

    match resolve(&deps, request.headers(), route_meta).await {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => {
            let ctx = ErrorContext {
                path: request.uri().path().to_string(),
                method: request.method().to_string(),
            };
            err.into_response_with(ctx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, VerifiedIdentity};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    struct StubVerifier(&'static str);

    #[async_trait]
    impl IdentityVerifier for StubVerifier {
        async fn verify(&self, _bearer_token: &str) -> Result<VerifiedIdentity, AuthError> {
            Ok(VerifiedIdentity {
                external_subject: self.0.to_string(),
                email: Some("a@b.com".to_string()),
                name: Some("A B".to_string()),
                avatar: None,
            })
        }
    }

    fn headers_with_bearer() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(axum::http::header::AUTHORIZATION, "Bearer token".parse().unwrap());
        h
    }

    #[tokio::test]
    async fn resolves_default_client_on_first_auth() {
        let deps = TenancyDeps {
            identity_verifier: Arc::new(StubVerifier("sub-1")),
            store: Arc::new(InMemoryStore::new()),
        };
        let ctx = resolve(&deps, &headers_with_bearer(), RouteMeta::default())
            .await
            .unwrap();
        assert!(ctx.client_id.is_some());
        assert_eq!(ctx.user.external_subject, "sub-1");
    }

    #[tokio::test]
    async fn rejects_unknown_client_hint() {
        let deps = TenancyDeps {
            identity_verifier: Arc::new(StubVerifier("sub-2")),
            store: Arc::new(InMemoryStore::new()),
        };
        let mut headers = headers_with_bearer();
        headers.insert("x-client-id", "nonexistent".parse().unwrap());
        let err = resolve(&deps, &headers, RouteMeta::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn missing_credential_is_unauthorized() {
        let deps = TenancyDeps {
            identity_verifier: Arc::new(StubVerifier("sub-3")),
            store: Arc::new(InMemoryStore::new()),
        };
        let err = resolve(&deps, &HeaderMap::new(), RouteMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
