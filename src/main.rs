//! Process entry point: load configuration, wire every collaborator
//! behind `AppState`, start the dispatcher and share-link sweeper as
//! background tasks, and serve the HTTP router.

use std::net::SocketAddr;
use std::sync::Arc;

use postline_api::auth::JwtIdentityVerifier;
use postline_api::config::AppConfig;
use postline_api::dispatcher::Dispatcher;
use postline_api::http::{router, AppState};
use postline_api::objectstore::HttpObjectStoreGateway;
use postline_api::publisher::facebook::FacebookDriver;
use postline_api::publisher::instagram::InstagramDriver;
use postline_api::publisher::registry::DriverRegistry;
use postline_api::publisher::tiktok::TikTokDriver;
use postline_api::publisher::x::XDriver;
use postline_api::public_share::PublicShareService;
use postline_api::rate_limit::RateLimiters;
use postline_api::sharelink::{ShareLinkService, Sweeper};
use postline_api::store::memory::InMemoryStore;
use postline_api::store::Store;
use postline_api::models::Platform;

const SHARE_LINK_SWEEP_PERIOD: std::time::Duration = std::time::Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("configuration error: {e}");
        e
    })?;
    config.validate().map_err(|e| {
        tracing::error!("configuration invalid: {e}");
        e
    })?;
    let config = Arc::new(config);

    let store = Arc::new(InMemoryStore::new());
    let store_dyn: Arc<dyn Store> = store.clone();
    let social_accounts_dyn = store.clone() as Arc<dyn postline_api::store::SocialAccountStore>;

    let identity_verifier = Arc::new(JwtIdentityVerifier::new(config.auth.clone(), config.is_production));

    let mut registry = DriverRegistry::new();
    registry.register(Platform::Instagram, Arc::new(InstagramDriver::new(config.instagram.clone())));
    registry.register(
        Platform::Tiktok,
        Arc::new(TikTokDriver::new(config.tiktok.clone(), social_accounts_dyn)),
    );
    registry.register(Platform::Facebook, Arc::new(FacebookDriver));
    registry.register(Platform::X, Arc::new(XDriver));
    let registry = Arc::new(registry);

    let object_store = Arc::new(HttpObjectStoreGateway::new(config.object_store.clone()));

    let share_links = Arc::new(ShareLinkService::new(store_dyn.clone()));
    let public_share = Arc::new(PublicShareService::new(store_dyn.clone(), share_links.clone()));
    let rate_limiters = Arc::new(RateLimiters::new());

    let state = Arc::new(AppState {
        store: store_dyn.clone(),
        registry: registry.clone(),
        object_store,
        share_links: share_links.clone(),
        public_share,
        identity_verifier,
        rate_limiters,
        config: config.clone(),
    });

    let dispatcher = Arc::new(Dispatcher::new(
        store_dyn.clone(),
        registry,
        config.dispatcher.tick_period,
        config.dispatcher.batch_size,
    ));
    tokio::spawn(dispatcher.run());

    let sweeper = Arc::new(Sweeper::new(store_dyn.clone(), SHARE_LINK_SWEEP_PERIOD));
    tokio::spawn(sweeper.run());

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("postline-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
