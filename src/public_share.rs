//! Public Share Service (§4.8): the anonymous read path over a shared
//! calendar and the bounded-edit public comment write path. Every
//! operation is keyed by the raw share token; none accept an
//! identified user.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::models::{Calendar, CalendarShareLink, Comment, SharePermission};
use crate::sharelink::{ResolveOutcome, ShareLinkService};
use crate::store::Store;

/// Calendar projection served over `/shared/:token` (§4.8). Deliberately
/// a separate shape from `models::Calendar`/`Content`/`Publication` —
/// this is the narrow, token-free view the spec calls "projection
/// safety" (§8 invariant 7): no `accessToken`/`refreshToken` field
/// exists anywhere in this tree because `SocialAccount` is never
/// reachable from it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedCalendarView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub permission: SharePermission,
    pub contents: Vec<SharedContentView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedContentView {
    pub id: String,
    pub caption: String,
    pub created_at: DateTime<Utc>,
    pub media: Vec<SharedMediaView>,
    pub publications: Vec<SharedPublicationView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedMediaView {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: crate::models::MediaType,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub order: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPublicationView {
    pub id: String,
    pub platform: crate::models::Platform,
    pub format: crate::models::PublicationFormat,
    pub publish_at: DateTime<Utc>,
    pub status: crate::models::PublicationStatus,
    pub link: Option<String>,
    /// Media ids used by this publication, in per-publication order —
    /// "per-publication media usage" from §4.8.
    pub media_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub publication_id: Option<String>,
    pub author_name: String,
    pub body: String,
    pub is_manager: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Comment> for CommentView {
    fn from(c: Comment) -> Self {
        Self {
            id: c.id,
            publication_id: c.publication_id,
            author_name: c.author_name,
            body: c.body,
            is_manager: c.is_manager(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentDto {
    pub author_name: String,
    pub author_email: Option<String>,
    pub body: String,
    pub publication_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommentDto {
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub data: Vec<CommentView>,
    pub has_more: bool,
    pub next_cursor: Option<DateTime<Utc>>,
}

const DEFAULT_COMMENT_PAGE_SIZE: u32 = 20;
const COMMENT_EDIT_WINDOW_MESSAGE: &str = "comments can only be edited within 15 minutes of posting";

pub struct PublicShareService {
    store: Arc<dyn Store>,
    share_links: Arc<ShareLinkService>,
}

impl PublicShareService {
    pub fn new(store: Arc<dyn Store>, share_links: Arc<ShareLinkService>) -> Self {
        Self { store, share_links }
    }

    /// Resolves a raw token to a `valid` link/calendar, translating the
    /// other three resolution outcomes to the HTTP-facing errors the
    /// public surface uses (`gone` for revoked/expired per §7, `not_found`
    /// for an unrecognized token).
    async fn resolve_or_fail(&self, token: &str) -> Result<(CalendarShareLink, Calendar)> {
        match self.share_links.resolve(token).await? {
            ResolveOutcome::Valid { link, calendar } => Ok((link, calendar)),
            ResolveOutcome::Invalid => Err(ApiError::NotFound("share link not found".to_string())),
            ResolveOutcome::Revoked => Err(ApiError::Gone("share link has been revoked".to_string())),
            ResolveOutcome::Expired => Err(ApiError::Gone("share link has expired".to_string())),
        }
    }

    pub async fn get_shared_calendar(&self, token: &str) -> Result<SharedCalendarView> {
        let (link, calendar) = self.resolve_or_fail(token).await?;

        let contents = crate::store::ContentStore::list_by_calendar_ordered(&*self.store, &calendar.id).await?;
        let mut content_views = Vec::with_capacity(contents.len());
        for content in contents {
            let media = self.store.list_by_content_ordered(&content.id).await?;
            let media_views = media
                .into_iter()
                .map(|m| SharedMediaView {
                    id: m.id,
                    url: m.url,
                    media_type: m.media_type,
                    mime_type: m.mime_type,
                    width: m.width,
                    height: m.height,
                    duration: m.duration,
                    thumbnail: m.thumbnail,
                    order: m.order,
                })
                .collect();

            let publications = self.store.list_publications_by_content_ordered(&content.id).await?;
            let mut publication_views = Vec::with_capacity(publications.len());
            for publication in publications {
                let usage = self.store.list_for_publication_ordered(&publication.id).await?;
                publication_views.push(SharedPublicationView {
                    id: publication.id,
                    platform: publication.platform,
                    format: publication.format,
                    publish_at: publication.publish_at,
                    status: publication.status,
                    link: publication.link,
                    media_ids: usage.into_iter().map(|pm| pm.media_id).collect(),
                });
            }

            content_views.push(SharedContentView {
                id: content.id,
                caption: content.caption,
                created_at: content.created_at,
                media: media_views,
                publications: publication_views,
            });
        }

        Ok(SharedCalendarView {
            id: calendar.id,
            name: calendar.name,
            description: calendar.description,
            permission: link.permission,
            contents: content_views,
        })
    }

    pub async fn get_comments(
        &self,
        token: &str,
        cursor: Option<DateTime<Utc>>,
        limit: Option<u32>,
        publication_id: Option<&str>,
    ) -> Result<CommentPage> {
        let (link, _calendar) = self.resolve_or_fail(token).await?;
        let limit = limit.unwrap_or(DEFAULT_COMMENT_PAGE_SIZE).max(1);

        let mut page = self
            .store
            .list_page(&link.calendar_id, publication_id, cursor, limit)
            .await?;

        let has_more = page.len() as u32 > limit;
        if has_more {
            page.truncate(limit as usize);
        }
        let next_cursor = page.last().map(|c| c.created_at);

        Ok(CommentPage {
            data: page.into_iter().map(CommentView::from).collect(),
            has_more,
            next_cursor,
        })
    }

    pub async fn create_comment(
        &self,
        token: &str,
        dto: CreateCommentDto,
        commenter_id: &str,
    ) -> Result<CommentView> {
        let (link, calendar) = self.resolve_or_fail(token).await?;
        if link.permission != SharePermission::ViewAndComment {
            return Err(ApiError::Forbidden("this share link does not allow comments".to_string()));
        }

        if let Some(publication_id) = &dto.publication_id {
            let belongs = crate::store::ContentStore::list_by_calendar_ordered(&*self.store, &calendar.id)
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect::<Vec<_>>();
            let mut found = false;
            for content_id in belongs {
                if self
                    .store
                    .list_publications_by_content_ordered(&content_id)
                    .await?
                    .iter()
                    .any(|p| &p.id == publication_id)
                {
                    found = true;
                    break;
                }
            }
            if !found {
                return Err(ApiError::BadRequest(
                    "publication does not belong to this calendar".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            calendar_id: calendar.id,
            publication_id: dto.publication_id,
            share_link_id: Some(link.id),
            user_id: None,
            commenter_id: Some(commenter_id.to_string()),
            author_name: dto.author_name,
            author_email: dto.author_email,
            body: dto.body,
            is_resolved: false,
            created_at: now,
            updated_at: now,
        };
        let stored = crate::store::CommentStore::create(&*self.store, comment).await?;
        Ok(stored.into())
    }

    /// Common ownership + edit-window check shared by update/delete
    /// (§4.8, §8 invariant 6).
    async fn authorize_edit(&self, token: &str, comment_id: &str, commenter_id: &str) -> Result<Comment> {
        self.resolve_or_fail(token).await?;
        let comment = self.store.get(comment_id).await?;
        let is_author = comment
            .commenter_id
            .as_deref()
            .is_some_and(|stored| crate::crypto::secure_compare(stored, commenter_id));
        if !is_author {
            return Err(ApiError::Forbidden("not the author of this comment".to_string()));
        }
        if !comment.within_edit_window(Utc::now()) {
            return Err(ApiError::Forbidden(COMMENT_EDIT_WINDOW_MESSAGE.to_string()));
        }
        Ok(comment)
    }

    pub async fn update_comment(
        &self,
        token: &str,
        comment_id: &str,
        dto: UpdateCommentDto,
        commenter_id: &str,
    ) -> Result<CommentView> {
        self.authorize_edit(token, comment_id, commenter_id).await?;
        let updated = self.store.update_body(comment_id, dto.body, Utc::now()).await?;
        Ok(updated.into())
    }

    pub async fn delete_comment(&self, token: &str, comment_id: &str, commenter_id: &str) -> Result<()> {
        self.authorize_edit(token, comment_id, commenter_id).await?;
        crate::store::CommentStore::delete(&*self.store, comment_id).await?;
        Ok(())
    }
}
