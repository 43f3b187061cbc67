//! Store contracts (§4.2).
//!
//! The relational store is an external collaborator per the spec's
//! scope, but the dispatcher, share-link service, and public share
//! service all depend on precise transactional semantics — the
//! conditional claim, atomic reorders, and atomic revoke+regenerate
//! pairs. These traits pin down that contract; `memory::InMemoryStore`
//! is the in-process default implementation used in development and
//! by the test suite, built the way the teacher builds `ShareStorage`/
//! `ActivityStorage`: one narrow trait per aggregate, one struct
//! implementing all of them.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::*;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A page of results plus the total count, mirroring the
/// `{data, meta:{total,page,limit,totalPages}}` envelope from §6.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PublicationFilter {
    pub content_id: Option<Id>,
    pub calendar_id: Option<Id>,
    pub platform: Option<Platform>,
    pub status: Option<PublicationStatus>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by external subject, auto-provisioning both the
    /// user and a default client in a single transaction on first
    /// authentication (§4.1 step 2).
    async fn get_or_provision(
        &self,
        external_subject: &str,
        email: &str,
        name: &str,
        avatar: Option<&str>,
    ) -> StoreResult<(User, bool)>;

    async fn get_by_id(&self, user_id: &str) -> StoreResult<User>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get_by_id(&self, client_id: &str) -> StoreResult<Client>;

    /// The user's earliest-created client, used as the tenancy default
    /// when no `X-Client-Id` hint is supplied.
    async fn earliest_for_user(&self, user_id: &str) -> StoreResult<Option<Client>>;

    async fn belongs_to_user(&self, client_id: &str, user_id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait SocialAccountStore: Send + Sync {
    /// Relation-filtered lookup: entity by id, scoped by client, in one
    /// round trip.
    async fn get_scoped(&self, client_id: &str, account_id: &str) -> StoreResult<SocialAccount>;

    async fn update_tokens(
        &self,
        account_id: &str,
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn get_scoped(&self, client_id: &str, calendar_id: &str) -> StoreResult<Calendar>;

    /// Unscoped lookup by id, used by the public share path once a
    /// resolved share link has already authorized access to this
    /// calendar — there is no client in scope on that path (§4.8).
    async fn get_by_id(&self, calendar_id: &str) -> StoreResult<Calendar>;

    /// Cascades to share links and comments (lifecycle ownership rule).
    async fn delete_scoped(&self, client_id: &str, calendar_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait KanbanColumnStore: Send + Sync {
    /// All-or-nothing update of the ordered set (§4.2). Columns are
    /// identified by id; `order` values become a dense, non-decreasing
    /// sequence matching the input order.
    async fn reorder(&self, calendar_id: &str, ordered_ids: Vec<Id>) -> StoreResult<Vec<KanbanColumn>>;

    async fn list_by_calendar_ordered(&self, calendar_id: &str) -> StoreResult<Vec<KanbanColumn>>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_scoped(&self, client_id: &str, content_id: &str) -> StoreResult<Content>;

    /// Unscoped projection for the public share path (§4.8): every
    /// content item attached to a calendar, ordered by creation time.
    async fn list_by_calendar_ordered(&self, calendar_id: &str) -> StoreResult<Vec<Content>>;

    /// Forbidden while the content has non-error publications.
    async fn delete_scoped(&self, client_id: &str, content_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Registers a media row after the bytes have already landed in
    /// object storage (§4.9) — this store never sees file contents.
    async fn create(&self, media: Media) -> StoreResult<Media>;

    async fn list_by_content_ordered(&self, content_id: &str) -> StoreResult<Vec<Media>>;

    /// Forbidden if any `PublicationMedia` references the item.
    async fn delete(&self, media_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait PublicationStore: Send + Sync {
    async fn create(&self, publication: Publication) -> StoreResult<Publication>;

    async fn get_scoped(&self, client_id: &str, publication_id: &str) -> StoreResult<Publication>;

    async fn list_scoped(
        &self,
        client_id: &str,
        filter: PublicationFilter,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Publication>>;

    /// Full update by id, used by the publication service after
    /// enforcing the immutability rules in §4.6 (not enforced here).
    async fn update(&self, publication: Publication) -> StoreResult<Publication>;

    async fn delete_scoped(&self, client_id: &str, publication_id: &str) -> StoreResult<()>;

    /// Conditional claim (§4.2, §4.6): atomically transition up to
    /// `batch_size` rows with `status = SCHEDULED AND publishAt <= now`
    /// to `PUBLISHING`, ordered by `publishAt` ascending, and return
    /// them. The transition happens inside the same critical section as
    /// the selection so a second concurrent caller cannot reclaim a row.
    async fn claim_due(&self, now: DateTime<Utc>, batch_size: usize) -> StoreResult<Vec<Publication>>;

    /// Pre-loaded relations for a claimed publication: the social
    /// account (with tokens), the content, and its media ordered by
    /// per-publication order. Drivers must not re-fetch from the store
    /// (§4.3) — the dispatcher assembles this once per claimed row.
    async fn load_publish_input(&self, publication_id: &str) -> StoreResult<PublishInputRow>;

    async fn mark_published(
        &self,
        publication_id: &str,
        platform_id: Option<String>,
        link: Option<String>,
    ) -> StoreResult<()>;

    async fn mark_error(&self, publication_id: &str, error: String) -> StoreResult<()>;

    /// Unscoped projection for the public share path (§4.8): every
    /// publication for a content item, ordered by `publishAt` ascending.
    async fn list_publications_by_content_ordered(&self, content_id: &str) -> StoreResult<Vec<Publication>>;
}

/// Everything a driver needs to publish, loaded once by the dispatcher.
#[derive(Debug, Clone)]
pub struct PublishInputRow {
    pub publication: Publication,
    pub social_account: SocialAccount,
    pub content: Content,
    pub media: Vec<Media>,
}

#[async_trait]
pub trait PublicationMediaStore: Send + Sync {
    /// Atomic "delete all referencing rows + create replacements", used
    /// on publication update (§4.2).
    async fn replace_for_publication(
        &self,
        publication_id: &str,
        items: Vec<PublicationMedia>,
    ) -> StoreResult<Vec<PublicationMedia>>;

    async fn list_for_publication_ordered(
        &self,
        publication_id: &str,
    ) -> StoreResult<Vec<PublicationMedia>>;
}

#[async_trait]
pub trait ShareLinkStore: Send + Sync {
    async fn create(&self, link: CalendarShareLink) -> StoreResult<CalendarShareLink>;

    async fn get_by_hash(&self, token_hash: &str) -> StoreResult<Option<CalendarShareLink>>;

    async fn get_scoped(&self, calendar_id: &str, link_id: &str) -> StoreResult<CalendarShareLink>;

    async fn revoke(&self, link_id: &str) -> StoreResult<CalendarShareLink>;

    /// Atomic "revoke old + create new" pair (§4.2, §4.7).
    async fn regenerate(
        &self,
        old_link_id: &str,
        new_link: CalendarShareLink,
    ) -> StoreResult<(CalendarShareLink, CalendarShareLink)>;

    /// Debounced access-stats update: only writes if `lastAccessedAt` is
    /// null or more than one minute old. Returns true if it wrote.
    async fn record_access(&self, link_id: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Bulk-deactivate all active, expired links. Returns the number of
    /// rows updated (0 on a re-run with no new data — sweep idempotence).
    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create(&self, comment: Comment) -> StoreResult<Comment>;

    async fn get(&self, comment_id: &str) -> StoreResult<Comment>;

    async fn update_body(&self, comment_id: &str, body: String, now: DateTime<Utc>) -> StoreResult<Comment>;

    async fn delete(&self, comment_id: &str) -> StoreResult<()>;

    /// Cursor is a timestamp; returns non-resolved comments for a
    /// calendar ordered by `createdAt desc`, optionally scoped to one
    /// publication. Fetches `limit + 1` so the caller can detect
    /// `hasMore` without a second round trip.
    async fn list_page(
        &self,
        calendar_id: &str,
        publication_id: Option<&str>,
        cursor: Option<DateTime<Utc>>,
        limit: u32,
    ) -> StoreResult<Vec<Comment>>;
}

/// Supertrait combining every aggregate contract the core needs. One
/// `Arc<dyn Store>` is threaded through the application the way the
/// teacher threads `Arc<dyn ShareStorage>` through `HandlerContext`.
pub trait Store:
    UserStore
    + ClientStore
    + SocialAccountStore
    + CalendarStore
    + KanbanColumnStore
    + ContentStore
    + MediaStore
    + PublicationStore
    + PublicationMediaStore
    + ShareLinkStore
    + CommentStore
{
}
