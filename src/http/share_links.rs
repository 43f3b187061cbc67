//! Share-link CRUD endpoints (§4.7), scoped to a calendar the caller's
//! tenant owns. Creation is rate-limited per-IP since a share link is a
//! bearer credential minted on demand.

use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::context::RequestContext;
use crate::error::Result;
use crate::models::{CalendarShareLink, Id, SharePermission};
use crate::store::CalendarStore;

use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareLinkDto {
    pub permission: SharePermission,
    pub label: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The raw token is only ever present in this response, issued once at
/// creation/regeneration time, never persisted (§4.7).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkWithToken {
    #[serde(flatten)]
    pub link: CalendarShareLink,
    pub token: String,
}

async fn check_ip_quota(state: &AppState, addr: Option<ConnectInfo<SocketAddr>>) -> Result<()> {
    let ip = addr
        .map(|ConnectInfo(a)| a.ip())
        .unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
    state.rate_limiters.share_link_create.check(ip)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    addr: Option<ConnectInfo<SocketAddr>>,
    Path(calendar_id): Path<Id>,
    Json(dto): Json<CreateShareLinkDto>,
) -> Result<Json<ShareLinkWithToken>> {
    check_ip_quota(&state, addr).await?;

    let client_id = ctx.require_client_id()?;
    CalendarStore::get_scoped(&*state.store, client_id, &calendar_id).await?;

    let (link, token) = state
        .share_links
        .create(&calendar_id, dto.permission, dto.label, dto.expires_at)
        .await?;

    Ok(Json(ShareLinkWithToken { link, token }))
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((calendar_id, link_id)): Path<(Id, Id)>,
) -> Result<StatusCode> {
    let client_id = ctx.require_client_id()?;
    CalendarStore::get_scoped(&*state.store, client_id, &calendar_id).await?;

    state.share_links.revoke(&calendar_id, &link_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn regenerate(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((calendar_id, link_id)): Path<(Id, Id)>,
) -> Result<Json<ShareLinkWithToken>> {
    let client_id = ctx.require_client_id()?;
    CalendarStore::get_scoped(&*state.store, client_id, &calendar_id).await?;

    let (link, token) = state.share_links.regenerate(&calendar_id, &link_id).await?;
    Ok(Json(ShareLinkWithToken { link, token }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::test_state;
    use crate::models::{Client, User};
    use crate::store::memory::InMemoryStore;

    fn ctx(client_id: &str) -> RequestContext {
        RequestContext {
            request_id: "req-1".to_string(),
            user: User {
                id: "u1".into(),
                external_subject: "sub-1".into(),
                email: "a@b.com".into(),
                name: "A B".into(),
                avatar: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            client_id: Some(client_id.to_string()),
        }
    }

    async fn seed(mem: &InMemoryStore) {
        let now = Utc::now();
        mem.insert_client(Client {
            id: "cl1".into(),
            user_id: "u1".into(),
            name: "Client".into(),
            avatar: None,
            created_at: now,
        })
        .await;
        mem.insert_calendar(crate::models::Calendar {
            id: "cal-1".into(),
            user_id: "u1".into(),
            client_id: "cl1".into(),
            name: "Calendar".into(),
            description: None,
            created_at: now,
        })
        .await;
    }

    #[tokio::test]
    async fn create_revoke_round_trip() {
        let mem = Arc::new(InMemoryStore::new());
        seed(&mem).await;
        let state_inner: Arc<dyn crate::store::Store> = mem.clone();
        let state = test_state(state_inner);

        let dto = CreateShareLinkDto {
            permission: SharePermission::ViewAndComment,
            label: Some("launch".into()),
            expires_at: None,
        };
        let created = create(State(state.clone()), ctx("cl1"), None, Path("cal-1".to_string()), Json(dto))
            .await
            .unwrap()
            .0;
        assert!(!created.token.is_empty());

        let status = revoke(State(state), ctx("cl1"), Path(("cal-1".to_string(), created.link.id))).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn create_rejects_calendar_from_another_client() {
        let mem = Arc::new(InMemoryStore::new());
        seed(&mem).await;
        let state_inner: Arc<dyn crate::store::Store> = mem.clone();
        let state = test_state(state_inner);

        let dto = CreateShareLinkDto {
            permission: SharePermission::View,
            label: None,
            expires_at: None,
        };
        let err = create(State(state), ctx("cl-other"), None, Path("cal-1".to_string()), Json(dto))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::ApiError::NotFound(_)));
    }
}
