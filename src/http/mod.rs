//! HTTP surface (§6): the axum router wiring every public and
//! tenant-scoped endpoint to its service, the way the teacher's
//! `handlers` module maps one function per route onto a shared
//! `HandlerContext`. Here that shared context is `AppState`.

pub mod media;
pub mod public;
pub mod publications;
pub mod share_links;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::IdentityVerifier;
use crate::config::AppConfig;
use crate::objectstore::ObjectStoreGateway;
use crate::public_share::PublicShareService;
use crate::rate_limit::RateLimiters;
use crate::sharelink::ShareLinkService;
use crate::store::Store;
use crate::publisher::registry::DriverRegistry;
use crate::tenancy::TenancyDeps;

/// Everything a handler might need, the way the teacher threads one
/// `Arc<HandlerContext>` through every Azure Function instead of
/// passing a dozen collaborators around individually.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<DriverRegistry>,
    pub object_store: Arc<dyn ObjectStoreGateway>,
    pub share_links: Arc<ShareLinkService>,
    pub public_share: Arc<PublicShareService>,
    pub identity_verifier: Arc<dyn IdentityVerifier>,
    pub rate_limiters: Arc<RateLimiters>,
    pub config: Arc<AppConfig>,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

pub fn router(state: Arc<AppState>) -> Router {
    let tenancy_deps = Arc::new(TenancyDeps {
        identity_verifier: state.identity_verifier.clone(),
        store: state.store.clone(),
    });

    let tenanted = Router::new()
        .route("/publications", post(publications::create).get(publications::list))
        .route(
            "/publications/:id",
            get(publications::get).put(publications::update).delete(publications::delete),
        )
        .route("/contents/:content_id/media", post(media::upload))
        .route("/calendars/:calendar_id/share-links", post(share_links::create))
        .route(
            "/calendars/:calendar_id/share-links/:link_id",
            axum::routing::delete(share_links::revoke),
        )
        .route(
            "/calendars/:calendar_id/share-links/:link_id/regenerate",
            post(share_links::regenerate),
        )
        .layer(middleware::from_fn_with_state(tenancy_deps, crate::tenancy::layer))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/shared/:token", get(public::get_shared_calendar))
        .route(
            "/shared/:token/comments",
            get(public::list_comments).post(public::create_comment),
        )
        .route(
            "/shared/:token/comments/:comment_id",
            axum::routing::patch(public::update_comment).delete(public::delete_comment),
        )
        .layer(middleware::from_fn_with_state(state.clone(), public::commenter_cookie_layer))
        .with_state(state.clone());

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(tenanted)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(crate::error::capture_context_layer))
        .layer(CatchPanicLayer::custom(crate::error::handle_panic))
}

/// Shared fixtures for the handler test modules in this directory —
/// building a full `AppState` is the same ceremony everywhere, so it
/// lives here once rather than copy-pasted per file.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use std::time::Duration;

    use crate::auth::{AuthError, IdentityVerifier, VerifiedIdentity};
    use crate::config::{AppConfig, AuthConfig, DispatcherConfig, InstagramConfig, ObjectStoreConfig, TikTokConfig};
    use crate::objectstore::{ObjectStoreError, ObjectStoreGateway};
    use crate::public_share::PublicShareService;
    use crate::publisher::registry::DriverRegistry;
    use crate::rate_limit::RateLimiters;
    use crate::sharelink::ShareLinkService;
    use crate::store::Store;

    use super::AppState;

    pub struct StubVerifier;

    #[async_trait]
    impl IdentityVerifier for StubVerifier {
        async fn verify(&self, _bearer_token: &str) -> Result<VerifiedIdentity, AuthError> {
            Err(AuthError::MissingHeader)
        }
    }

    pub struct StubObjectStore;

    #[async_trait]
    impl ObjectStoreGateway for StubObjectStore {
        async fn upload_file(&self, key: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String, ObjectStoreError> {
            Ok(format!("https://cdn.example.com/{key}"))
        }

        async fn get_signed_url(&self, key: &str) -> Result<String, ObjectStoreError> {
            Ok(format!("https://cdn.example.com/{key}"))
        }

        async fn delete_file(&self, _key: &str) -> Result<(), ObjectStoreError> {
            Ok(())
        }
    }

    pub fn test_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/test".to_string(),
            port: 8080,
            is_production: false,
            auth: AuthConfig {
                issuer_domain: "https://issuer.example.com".to_string(),
                audience: "test-audience".to_string(),
                issuer: "https://issuer.example.com/".to_string(),
            },
            instagram: InstagramConfig {
                api_url: "https://graph.facebook.com/v19.0".to_string(),
                media_wait: Duration::from_secs(1),
                video_wait: Duration::from_secs(1),
            },
            tiktok: TikTokConfig {
                api_url: "https://open.tiktokapis.com/v2".to_string(),
                client_key: None,
                client_secret: None,
                callback_url: None,
            },
            dispatcher: DispatcherConfig {
                tick_period: Duration::from_secs(2),
                batch_size: 10,
            },
            object_store: ObjectStoreConfig {
                account_id: None,
                bucket_name: None,
                access_key_id: None,
                secret_access_key: None,
                public_domain: None,
            },
            cors_origins: Vec::new(),
            max_media_per_content: 10,
        }
    }

    pub fn test_state(store: Arc<dyn Store>) -> Arc<AppState> {
        let share_links = Arc::new(ShareLinkService::new(store.clone()));
        let public_share = Arc::new(PublicShareService::new(store.clone(), share_links.clone()));
        Arc::new(AppState {
            store,
            registry: Arc::new(DriverRegistry::new()),
            object_store: Arc::new(StubObjectStore),
            share_links,
            public_share,
            identity_verifier: Arc::new(StubVerifier),
            rate_limiters: Arc::new(RateLimiters::new()),
            config: Arc::new(test_config()),
        })
    }
}
