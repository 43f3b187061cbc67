//! Public share surface (§4.8): anonymous calendar viewing and bounded
//! commenting, keyed entirely by the raw share token. No route here
//! runs the tenancy layer — the share link itself is the credential.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::crypto::generate_commenter_id;
use crate::error::ApiError;
use crate::public_share::{CommentPage, CreateCommentDto, SharedCalendarView, UpdateCommentDto};

use super::AppState;

const COMMENTER_COOKIE_NAME: &str = "postline_commenter_id";
/// 90 days, matching the calendar-share lifetime horizon this identity
/// is meant to outlive any single visit.
const COMMENTER_COOKIE_MAX_AGE: time::Duration = time::Duration::days(90);

/// The anonymous commenter identity carried by `postline_commenter_id`.
/// Minted once per browser by `commenter_cookie_layer` and threaded
/// through request extensions the same way `RequestContext` is.
#[derive(Debug, Clone)]
pub struct CommenterId(pub String);

#[async_trait::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CommenterId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CommenterId>()
            .cloned()
            .ok_or_else(|| ApiError::Internal("commenter cookie middleware did not run for this route".to_string()))
    }
}

/// Reads the commenter cookie if present, otherwise mints a fresh id
/// and sets it. Public comment authorship (§4.8, §8 invariant 6) is
/// keyed on this value rather than any authenticated identity.
pub async fn commenter_cookie_layer(State(state): State<Arc<AppState>>, jar: CookieJar, mut request: Request, next: Next) -> Response {
    let (commenter_id, jar) = match jar.get(COMMENTER_COOKIE_NAME) {
        Some(existing) => (existing.value().to_string(), jar),
        None => {
            let id = generate_commenter_id();
            let mut cookie = Cookie::new(COMMENTER_COOKIE_NAME, id.clone());
            cookie.set_http_only(true);
            cookie.set_same_site(SameSite::Strict);
            cookie.set_secure(state.config.is_production);
            cookie.set_max_age(COMMENTER_COOKIE_MAX_AGE);
            cookie.set_path("/");
            (id, jar.add(cookie))
        }
    };

    request.extensions_mut().insert(CommenterId(commenter_id));
    let response = next.run(request).await;
    (jar, response).into_response()
}

async fn check_resolve_quota(state: &AppState, addr: Option<ConnectInfo<SocketAddr>>) -> Result<(), ApiError> {
    let ip = addr
        .map(|ConnectInfo(a)| a.ip())
        .unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
    state.rate_limiters.share_link_resolve.check(ip)
}

pub async fn get_shared_calendar(
    State(state): State<Arc<AppState>>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Path(token): Path<String>,
) -> Result<Json<SharedCalendarView>, ApiError> {
    check_resolve_quota(&state, addr).await?;
    let view = state.public_share.get_shared_calendar(&token).await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentsQuery {
    pub cursor: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub publication_id: Option<String>,
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(q): Query<CommentsQuery>,
) -> Result<Json<CommentPage>, ApiError> {
    let page = state
        .public_share
        .get_comments(&token, q.cursor, q.limit, q.publication_id.as_deref())
        .await?;
    Ok(Json(page))
}

pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    commenter: CommenterId,
    Json(dto): Json<CreateCommentDto>,
) -> Result<Json<crate::public_share::CommentView>, ApiError> {
    let view = state.public_share.create_comment(&token, dto, &commenter.0).await?;
    Ok(Json(view))
}

pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    Path((token, comment_id)): Path<(String, String)>,
    commenter: CommenterId,
    Json(dto): Json<UpdateCommentDto>,
) -> Result<Json<crate::public_share::CommentView>, ApiError> {
    let view = state
        .public_share
        .update_comment(&token, &comment_id, dto, &commenter.0)
        .await?;
    Ok(Json(view))
}

pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path((token, comment_id)): Path<(String, String)>,
    commenter: CommenterId,
) -> Result<axum::http::StatusCode, ApiError> {
    state.public_share.delete_comment(&token, &comment_id, &commenter.0).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::test_state;
    use crate::models::{Calendar, Client, SharePermission};
    use crate::sharelink::ShareLinkService;
    use crate::store::memory::InMemoryStore;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn seed_and_build_state() -> (Arc<AppState>, String) {
        let mem = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        mem.insert_client(Client {
            id: "cl1".into(),
            user_id: "u1".into(),
            name: "Client".into(),
            avatar: None,
            created_at: now,
        })
        .await;
        mem.insert_calendar(Calendar {
            id: "cal1".into(),
            user_id: "u1".into(),
            client_id: "cl1".into(),
            name: "Cal".into(),
            description: None,
            created_at: now,
        })
        .await;

        let store: Arc<dyn crate::store::Store> = mem.clone();
        let svc = ShareLinkService::new(store.clone());
        let (_link, raw) = svc.create("cal1", SharePermission::ViewAndComment, None, None).await.unwrap();

        (test_state(store), raw)
    }

    async fn routed(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/shared/:token", get(get_shared_calendar))
            .layer(from_fn_with_state(state.clone(), commenter_cookie_layer))
            .with_state(state)
    }

    #[tokio::test]
    async fn cookie_layer_mints_a_cookie_on_first_visit() {
        let (state, token) = seed_and_build_state().await;
        let app = routed(state).await;

        let response = app
            .oneshot(HttpRequest::get(format!("/shared/{token}")).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let cookie = response
            .headers()
            .get(axum::http::header::SET_COOKIE)
            .expect("commenter cookie should be set")
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with(COMMENTER_COOKIE_NAME));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn cookie_layer_reuses_existing_cookie() {
        let (state, token) = seed_and_build_state().await;
        let app = routed(state).await;

        let response = app
            .oneshot(
                HttpRequest::get(format!("/shared/{token}"))
                    .header(axum::http::header::COOKIE, format!("{COMMENTER_COOKIE_NAME}=existing-id"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get(axum::http::header::SET_COOKIE).is_none());
    }
}
