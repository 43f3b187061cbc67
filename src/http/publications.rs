//! Publication endpoints (§4.6): create/list/get/update/delete. Update
//! and delete enforce the lock rules straight off `Publication`'s own
//! `is_update_locked`/`is_delete_locked` rather than re-deriving them at
//! the handler boundary.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::context::RequestContext;
use crate::error::{ApiError, Result};
use crate::models::*;
use crate::publisher::PublishInput;
use crate::store::{ContentStore, MediaStore, PublicationFilter, PublicationMediaStore, PublicationStore, SocialAccountStore};

use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRefDto {
    pub media_id: Id,
    pub order: i32,
    pub crop_data: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePublicationDto {
    pub content_id: Id,
    pub social_account_id: Id,
    pub platform: Platform,
    pub format: PublicationFormat,
    pub publish_at: DateTime<Utc>,
    pub custom_caption: Option<String>,
    pub platform_config: Option<JsonValue>,
    pub kanban_column_id: Option<Id>,
    pub kanban_order: Option<i32>,
    #[serde(default)]
    pub media: Vec<MediaRefDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePublicationDto {
    pub publish_at: Option<DateTime<Utc>>,
    pub custom_caption: Option<String>,
    pub platform_config: Option<JsonValue>,
    pub kanban_column_id: Option<Id>,
    pub kanban_order: Option<i32>,
    pub media: Option<Vec<MediaRefDto>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPublicationsQuery {
    pub platform: Option<Platform>,
    pub status: Option<PublicationStatus>,
    pub content_id: Option<Id>,
    pub calendar_id: Option<Id>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationListResponse {
    pub data: Vec<Publication>,
    pub meta: PageMeta,
}

/// Validates that every referenced media id belongs to `content_id` and
/// that orders are unique, then builds the (unsaved) `PublicationMedia`
/// rows. `publication_id` is filled in by the caller once the
/// publication's id is known.
async fn build_media_rows(state: &AppState, content_id: &str, refs: &[MediaRefDto]) -> Result<Vec<PublicationMedia>> {
    let available = MediaStore::list_by_content_ordered(&*state.store, content_id).await?;
    let available_ids: HashSet<&str> = available.iter().map(|m| m.id.as_str()).collect();

    let mut seen_orders = HashSet::new();
    let mut rows = Vec::with_capacity(refs.len());
    for r in refs {
        if !available_ids.contains(r.media_id.as_str()) {
            return Err(ApiError::BadRequest(format!(
                "media {} does not belong to content {content_id}",
                r.media_id
            )));
        }
        if !seen_orders.insert(r.order) {
            return Err(ApiError::BadRequest("duplicate media order in publication".to_string()));
        }
        rows.push(PublicationMedia {
            id: uuid::Uuid::new_v4().to_string(),
            publication_id: String::new(),
            media_id: r.media_id.clone(),
            order: r.order,
            crop_data: r.crop_data.clone(),
        });
    }
    Ok(rows)
}

fn ordered_media_rows(all_media: Vec<Media>, refs: &[PublicationMedia]) -> Vec<Media> {
    let by_id: HashMap<&str, &Media> = all_media.iter().map(|m| (m.id.as_str(), m)).collect();
    let mut ordered: Vec<(i32, Media)> = refs
        .iter()
        .filter_map(|pm| by_id.get(pm.media_id.as_str()).map(|m| (pm.order, (*m).clone())))
        .collect();
    ordered.sort_by_key(|(order, _)| *order);
    ordered.into_iter().map(|(_, m)| m).collect()
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(dto): Json<CreatePublicationDto>,
) -> Result<Json<Publication>> {
    let client_id = ctx.require_client_id()?;

    let content = ContentStore::get_scoped(&*state.store, client_id, &dto.content_id).await?;
    let account = SocialAccountStore::get_scoped(&*state.store, client_id, &dto.social_account_id).await?;

    if account.platform != dto.platform {
        return Err(ApiError::BadRequest(
            "social account platform does not match the publication's platform".to_string(),
        ));
    }

    let media_rows = build_media_rows(&state, &content.id, &dto.media).await?;
    let all_media = MediaStore::list_by_content_ordered(&*state.store, &content.id).await?;
    let ordered_media = ordered_media_rows(all_media, &media_rows);

    let now = Utc::now();
    let publication = Publication {
        id: uuid::Uuid::new_v4().to_string(),
        content_id: content.id.clone(),
        social_account_id: account.id.clone(),
        platform: dto.platform,
        format: dto.format,
        publish_at: dto.publish_at,
        status: PublicationStatus::Scheduled,
        error: None,
        custom_caption: dto.custom_caption,
        platform_config: dto.platform_config,
        platform_id: None,
        link: None,
        kanban_column_id: dto.kanban_column_id,
        kanban_order: dto.kanban_order,
        created_at: now,
        updated_at: now,
    };

    let driver = state.registry.get(dto.platform)?;
    let input = PublishInput {
        publication: publication.clone(),
        social_account: account,
        content,
        media: ordered_media,
    };
    let validation = driver.validate(&input);
    if !validation.is_ok() {
        return Err(ApiError::BadRequest(validation.errors.join("; ")));
    }

    let stored = PublicationStore::create(&*state.store, publication).await?;

    let media_rows = media_rows
        .into_iter()
        .map(|mut pm| {
            pm.publication_id = stored.id.clone();
            pm
        })
        .collect();
    PublicationMediaStore::replace_for_publication(&*state.store, &stored.id, media_rows).await?;

    Ok(Json(stored))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(q): Query<ListPublicationsQuery>,
) -> Result<Json<PublicationListResponse>> {
    let client_id = ctx.require_client_id()?;
    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(20).clamp(1, 100);

    let filter = PublicationFilter {
        content_id: q.content_id,
        calendar_id: q.calendar_id,
        platform: q.platform,
        status: q.status,
    };

    let page_result = PublicationStore::list_scoped(&*state.store, client_id, filter, page, limit).await?;
    let total_pages = if page_result.total == 0 {
        0
    } else {
        (page_result.total + limit as u64 - 1) / limit as u64
    };

    Ok(Json(PublicationListResponse {
        data: page_result.data,
        meta: PageMeta {
            total: page_result.total,
            page,
            limit,
            total_pages,
        },
    }))
}

pub async fn get(State(state): State<Arc<AppState>>, ctx: RequestContext, Path(id): Path<Id>) -> Result<Json<Publication>> {
    let client_id = ctx.require_client_id()?;
    let publication = PublicationStore::get_scoped(&*state.store, client_id, &id).await?;
    Ok(Json(publication))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Id>,
    Json(dto): Json<UpdatePublicationDto>,
) -> Result<Json<Publication>> {
    let client_id = ctx.require_client_id()?;
    let mut publication = PublicationStore::get_scoped(&*state.store, client_id, &id).await?;
    if publication.is_update_locked() {
        return Err(ApiError::BadRequest(
            "publication cannot be modified once publishing has started".to_string(),
        ));
    }

    if let Some(publish_at) = dto.publish_at {
        publication.publish_at = publish_at;
    }
    if dto.custom_caption.is_some() {
        publication.custom_caption = dto.custom_caption;
    }
    if dto.platform_config.is_some() {
        publication.platform_config = dto.platform_config;
    }
    if dto.kanban_column_id.is_some() {
        publication.kanban_column_id = dto.kanban_column_id;
    }
    if dto.kanban_order.is_some() {
        publication.kanban_order = dto.kanban_order;
    }
    publication.updated_at = Utc::now();

    if let Some(media_refs) = dto.media {
        let rows = build_media_rows(&state, &publication.content_id, &media_refs).await?;
        let rows = rows
            .into_iter()
            .map(|mut pm| {
                pm.publication_id = publication.id.clone();
                pm
            })
            .collect();
        PublicationMediaStore::replace_for_publication(&*state.store, &publication.id, rows).await?;
    }

    let updated = PublicationStore::update(&*state.store, publication).await?;
    Ok(Json(updated))
}

pub async fn delete(State(state): State<Arc<AppState>>, ctx: RequestContext, Path(id): Path<Id>) -> Result<StatusCode> {
    let client_id = ctx.require_client_id()?;
    let publication = PublicationStore::get_scoped(&*state.store, client_id, &id).await?;
    if publication.is_delete_locked() {
        return Err(ApiError::BadRequest(
            "publication cannot be deleted while publishing is in progress".to_string(),
        ));
    }
    PublicationStore::delete_scoped(&*state.store, client_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::test_state;
    use crate::store::memory::InMemoryStore;
    use axum::extract::Query;

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
        mem.insert_content(Content {
            id: "content-1".into(),
            user_id: "u1".into(),
            client_id: "cl1".into(),
            calendar_id: None,
            caption: "caption".into(),
            created_at: now,
        })
        .await;
        mem.insert_social_account(SocialAccount {
            id: "sa-1".into(),
            user_id: "u1".into(),
            client_id: "cl1".into(),
            platform: Platform::Instagram,
            platform_user_id: "ig-1".into(),
            username: "handle".into(),
            access_token: Some("tok".into()),
            refresh_token: None,
            expires_at: None,
            is_active: true,
            disconnected_at: None,
        })
        .await;
        mem.insert_media(Media {
            id: "m1".into(),
            content_id: "content-1".into(),
            url: "https://cdn/m1.jpg".into(),
            key: "m1".into(),
            media_type: MediaType::Image,
            mime_type: "image/jpeg".into(),
            size: 10,
            width: None,
            height: None,
            duration: None,
            thumbnail: None,
            order: 0,
            created_at: now,
        })
        .await;
    }

    fn create_dto() -> CreatePublicationDto {
        CreatePublicationDto {
            content_id: "content-1".into(),
            social_account_id: "sa-1".into(),
            platform: Platform::Instagram,
            format: PublicationFormat::Feed,
            publish_at: Utc::now() + chrono::Duration::hours(1),
            custom_caption: Some("hello".into()),
            platform_config: None,
            kanban_column_id: None,
            kanban_order: None,
            media: vec![MediaRefDto {
                media_id: "m1".into(),
                order: 0,
                crop_data: None,
            }],
        }
    }

    #[tokio::test]
    async fn create_rejects_mismatched_platform() {
        let mem = Arc::new(InMemoryStore::new());
        seed(&mem).await;
        let state_inner: Arc<dyn crate::store::Store> = mem.clone();
        let state = test_state(state_inner);

        let mut dto = create_dto();
        dto.platform = Platform::Tiktok;

        let err = create(State(state), ctx("cl1"), Json(dto)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_media_order() {
        let mem = Arc::new(InMemoryStore::new());
        seed(&mem).await;
        let state_inner: Arc<dyn crate::store::Store> = mem.clone();
        let state = test_state(state_inner);

        let mut dto = create_dto();
        dto.media.push(MediaRefDto {
            media_id: "m1".into(),
            order: 0,
            crop_data: None,
        });

        let err = create(State(state), ctx("cl1"), Json(dto)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let mem = Arc::new(InMemoryStore::new());
        seed(&mem).await;
        let state_inner: Arc<dyn crate::store::Store> = mem.clone();
        let state = test_state(state_inner);

        let created = create(State(state.clone()), ctx("cl1"), Json(create_dto()))
            .await
            .unwrap()
            .0;
        assert_eq!(created.status, PublicationStatus::Scheduled);

        let fetched = get(State(state), ctx("cl1"), Path(created.id.clone())).await.unwrap().0;
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn delete_is_blocked_while_publishing() {
        let mem = Arc::new(InMemoryStore::new());
        seed(&mem).await;
        let state_inner: Arc<dyn crate::store::Store> = mem.clone();
        let state = test_state(state_inner);

        let created = create(State(state.clone()), ctx("cl1"), Json(create_dto()))
            .await
            .unwrap()
            .0;

        let mut publishing = created.clone();
        publishing.status = PublicationStatus::Publishing;
        PublicationStore::update(&*state.store, publishing).await.unwrap();

        let err = delete(State(state), ctx("cl1"), Path(created.id)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn list_paginates_by_client() {
        let mem = Arc::new(InMemoryStore::new());
        seed(&mem).await;
        let state_inner: Arc<dyn crate::store::Store> = mem.clone();
        let state = test_state(state_inner);

        create(State(state.clone()), ctx("cl1"), Json(create_dto())).await.unwrap();

        let query = ListPublicationsQuery {
            platform: None,
            status: None,
            content_id: None,
            calendar_id: None,
            page: None,
            limit: None,
        };
        let page = list(State(state), ctx("cl1"), Query(query)).await.unwrap().0;
        assert_eq!(page.meta.total, 1);
        assert_eq!(page.data.len(), 1);
    }
}
