//! In-memory `Store` implementation.
//!
//! Development/test default. Every aggregate lives behind its own
//! `tokio::sync::RwLock<HashMap<..>>`, the way the teacher keeps one
//! table per aggregate; a single `tokio::sync::Mutex<()>` acts as the
//! transaction lock for the multi-statement operations the spec calls
//! out explicitly (conditional claim, reorders, share-link
//! regeneration, publication-media replace) so they observe and commit
//! as one unit even under concurrent dispatchers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::*;
use crate::models::*;

#[derive(Default)]
struct Tables {
    users: HashMap<Id, User>,
    users_by_subject: HashMap<String, Id>,
    clients: HashMap<Id, Client>,
    social_accounts: HashMap<Id, SocialAccount>,
    calendars: HashMap<Id, Calendar>,
    kanban_columns: HashMap<Id, KanbanColumn>,
    contents: HashMap<Id, Content>,
    media: HashMap<Id, Media>,
    publications: HashMap<Id, Publication>,
    publication_media: HashMap<Id, PublicationMedia>,
    share_links: HashMap<Id, CalendarShareLink>,
    share_links_by_hash: HashMap<String, Id>,
    comments: HashMap<Id, Comment>,
}

pub struct InMemoryStore {
    tables: RwLock<Tables>,
    /// Serializes the multi-statement operations; the read-committed
    /// analogue of a row-level lock taken by the claim `SELECT`.
    txn: Mutex<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            txn: Mutex::new(()),
        }
    }

    /// Seed helpers: insert rows directly, bypassing the service-level
    /// validation a real handler would apply. Used by tests and by
    /// fixture-loading tools; the CRUD surfaces that normally populate
    /// these aggregates are out of scope for this crate (§1).
    pub async fn insert_client(&self, client: Client) {
        self.tables.write().await.clients.insert(client.id.clone(), client);
    }

    pub async fn insert_calendar(&self, calendar: Calendar) {
        self.tables.write().await.calendars.insert(calendar.id.clone(), calendar);
    }

    pub async fn insert_kanban_column(&self, column: KanbanColumn) {
        self.tables.write().await.kanban_columns.insert(column.id.clone(), column);
    }

    pub async fn insert_content(&self, content: Content) {
        self.tables.write().await.contents.insert(content.id.clone(), content);
    }

    pub async fn insert_media(&self, media: Media) {
        self.tables.write().await.media.insert(media.id.clone(), media);
    }

    pub async fn insert_social_account(&self, account: SocialAccount) {
        self.tables.write().await.social_accounts.insert(account.id.clone(), account);
    }

    pub async fn insert_comment_raw(&self, comment: Comment) {
        self.tables.write().await.comments.insert(comment.id.clone(), comment);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_or_provision(
        &self,
        external_subject: &str,
        email: &str,
        name: &str,
        avatar: Option<&str>,
    ) -> StoreResult<(User, bool)> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;

        if let Some(user_id) = tables.users_by_subject.get(external_subject).cloned() {
            let user = tables.users.get(&user_id).cloned().expect("indexed user must exist");
            return Ok((user, false));
        }

        let now = Utc::now();
        let user = User {
            id: new_id(),
            external_subject: external_subject.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            avatar: avatar.map(|s| s.to_string()),
            created_at: now,
            updated_at: now,
        };
        let client = Client {
            id: new_id(),
            user_id: user.id.clone(),
            name: format!("{}'s workspace", user.name),
            avatar: None,
            created_at: now,
        };

        tables.users_by_subject.insert(external_subject.to_string(), user.id.clone());
        tables.users.insert(user.id.clone(), user.clone());
        tables.clients.insert(client.id.clone(), client);

        Ok((user, true))
    }

    async fn get_by_id(&self, user_id: &str) -> StoreResult<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn get_by_id(&self, client_id: &str) -> StoreResult<Client> {
        let tables = self.tables.read().await;
        tables
            .clients
            .get(client_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("client {client_id}")))
    }

    async fn earliest_for_user(&self, user_id: &str) -> StoreResult<Option<Client>> {
        let tables = self.tables.read().await;
        Ok(tables
            .clients
            .values()
            .filter(|c| c.user_id == user_id)
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    async fn belongs_to_user(&self, client_id: &str, user_id: &str) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .clients
            .get(client_id)
            .map(|c| c.user_id == user_id)
            .unwrap_or(false))
    }
}

#[async_trait]
impl SocialAccountStore for InMemoryStore {
    async fn get_scoped(&self, client_id: &str, account_id: &str) -> StoreResult<SocialAccount> {
        let tables = self.tables.read().await;
        tables
            .social_accounts
            .get(account_id)
            .filter(|a| a.client_id == client_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("social account {account_id}")))
    }

    async fn update_tokens(
        &self,
        account_id: &str,
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let account = tables
            .social_accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::NotFound(format!("social account {account_id}")))?;
        account.access_token = Some(access_token);
        account.refresh_token = Some(refresh_token);
        account.expires_at = Some(expires_at);
        Ok(())
    }
}

#[async_trait]
impl CalendarStore for InMemoryStore {
    async fn get_scoped(&self, client_id: &str, calendar_id: &str) -> StoreResult<Calendar> {
        let tables = self.tables.read().await;
        tables
            .calendars
            .get(calendar_id)
            .filter(|c| c.client_id == client_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("calendar {calendar_id}")))
    }

    async fn get_by_id(&self, calendar_id: &str) -> StoreResult<Calendar> {
        let tables = self.tables.read().await;
        tables
            .calendars
            .get(calendar_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("calendar {calendar_id}")))
    }

    async fn delete_scoped(&self, client_id: &str, calendar_id: &str) -> StoreResult<()> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;
        let exists = tables
            .calendars
            .get(calendar_id)
            .map(|c| c.client_id == client_id)
            .unwrap_or(false);
        if !exists {
            return Err(StoreError::NotFound(format!("calendar {calendar_id}")));
        }
        tables.calendars.remove(calendar_id);

        // Cascade to share links and comments (lifecycle ownership rule).
        let link_ids: Vec<Id> = tables
            .share_links
            .values()
            .filter(|l| l.calendar_id == calendar_id)
            .map(|l| l.id.clone())
            .collect();
        for id in link_ids {
            if let Some(link) = tables.share_links.remove(&id) {
                tables.share_links_by_hash.remove(&link.token_hash);
            }
        }
        tables.comments.retain(|_, c| c.calendar_id != calendar_id);

        Ok(())
    }
}

#[async_trait]
impl KanbanColumnStore for InMemoryStore {
    async fn reorder(&self, calendar_id: &str, ordered_ids: Vec<Id>) -> StoreResult<Vec<KanbanColumn>> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;

        for id in &ordered_ids {
            match tables.kanban_columns.get(id) {
                Some(col) if col.calendar_id == calendar_id => {}
                _ => return Err(StoreError::PreconditionFailed(format!("column {id} not in calendar"))),
            }
        }

        for (idx, id) in ordered_ids.iter().enumerate() {
            if let Some(col) = tables.kanban_columns.get_mut(id) {
                col.order = idx as i32;
            }
        }

        let mut result: Vec<KanbanColumn> = ordered_ids
            .iter()
            .filter_map(|id| tables.kanban_columns.get(id).cloned())
            .collect();
        result.sort_by_key(|c| c.order);
        Ok(result)
    }

    async fn list_by_calendar_ordered(&self, calendar_id: &str) -> StoreResult<Vec<KanbanColumn>> {
        let tables = self.tables.read().await;
        let mut cols: Vec<KanbanColumn> = tables
            .kanban_columns
            .values()
            .filter(|c| c.calendar_id == calendar_id)
            .cloned()
            .collect();
        cols.sort_by_key(|c| c.order);
        Ok(cols)
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn get_scoped(&self, client_id: &str, content_id: &str) -> StoreResult<Content> {
        let tables = self.tables.read().await;
        tables
            .contents
            .get(content_id)
            .filter(|c| c.client_id == client_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("content {content_id}")))
    }

    async fn list_by_calendar_ordered(&self, calendar_id: &str) -> StoreResult<Vec<Content>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Content> = tables
            .contents
            .values()
            .filter(|c| c.calendar_id.as_deref() == Some(calendar_id))
            .cloned()
            .collect();
        items.sort_by_key(|c| c.created_at);
        Ok(items)
    }

    async fn delete_scoped(&self, client_id: &str, content_id: &str) -> StoreResult<()> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;
        let exists = tables
            .contents
            .get(content_id)
            .map(|c| c.client_id == client_id)
            .unwrap_or(false);
        if !exists {
            return Err(StoreError::NotFound(format!("content {content_id}")));
        }
        let has_active_publications = tables
            .publications
            .values()
            .any(|p| p.content_id == content_id && p.status != PublicationStatus::Error);
        if has_active_publications {
            return Err(StoreError::PreconditionFailed(
                "content has non-error publications".to_string(),
            ));
        }
        tables.contents.remove(content_id);
        Ok(())
    }
}

#[async_trait]
impl MediaStore for InMemoryStore {
    async fn create(&self, media: Media) -> StoreResult<Media> {
        let mut tables = self.tables.write().await;
        tables.media.insert(media.id.clone(), media.clone());
        Ok(media)
    }

    async fn list_by_content_ordered(&self, content_id: &str) -> StoreResult<Vec<Media>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Media> = tables
            .media
            .values()
            .filter(|m| m.content_id == content_id)
            .cloned()
            .collect();
        items.sort_by_key(|m| m.order);
        Ok(items)
    }

    async fn delete(&self, media_id: &str) -> StoreResult<()> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;
        let referenced = tables.publication_media.values().any(|pm| pm.media_id == media_id);
        if referenced {
            return Err(StoreError::PreconditionFailed(
                "media referenced by a publication".to_string(),
            ));
        }
        tables
            .media
            .remove(media_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("media {media_id}")))
    }
}

#[async_trait]
impl PublicationStore for InMemoryStore {
    async fn create(&self, publication: Publication) -> StoreResult<Publication> {
        let mut tables = self.tables.write().await;
        tables.publications.insert(publication.id.clone(), publication.clone());
        Ok(publication)
    }

    async fn get_scoped(&self, client_id: &str, publication_id: &str) -> StoreResult<Publication> {
        let tables = self.tables.read().await;
        let publication = tables
            .publications
            .get(publication_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("publication {publication_id}")))?;
        let content = tables
            .contents
            .get(&publication.content_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("content {}", publication.content_id)))?;
        if content.client_id != client_id {
            return Err(StoreError::NotFound(format!("publication {publication_id}")));
        }
        Ok(publication)
    }

    async fn list_scoped(
        &self,
        client_id: &str,
        filter: PublicationFilter,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Publication>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Publication> = tables
            .publications
            .values()
            .filter(|p| {
                tables
                    .contents
                    .get(&p.content_id)
                    .map(|c| c.client_id == client_id)
                    .unwrap_or(false)
            })
            .filter(|p| filter.content_id.as_deref().map(|id| id == p.content_id).unwrap_or(true))
            .filter(|p| filter.platform.map(|pl| pl == p.platform).unwrap_or(true))
            .filter(|p| filter.status.map(|s| s == p.status).unwrap_or(true))
            .filter(|p| {
                filter
                    .calendar_id
                    .as_deref()
                    .map(|cal_id| {
                        tables
                            .contents
                            .get(&p.content_id)
                            .and_then(|c| c.calendar_id.as_deref())
                            .map(|c| c == cal_id)
                            .unwrap_or(false)
                    })
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|p| p.publish_at);

        let total = matching.len() as u64;
        let start = (page.saturating_sub(1) as usize) * limit as usize;
        let data = matching.into_iter().skip(start).take(limit as usize).collect();
        Ok(Page { data, total })
    }

    async fn update(&self, publication: Publication) -> StoreResult<Publication> {
        let mut tables = self.tables.write().await;
        if !tables.publications.contains_key(&publication.id) {
            return Err(StoreError::NotFound(format!("publication {}", publication.id)));
        }
        tables.publications.insert(publication.id.clone(), publication.clone());
        Ok(publication)
    }

    async fn delete_scoped(&self, client_id: &str, publication_id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .publications
            .get(publication_id)
            .and_then(|p| tables.contents.get(&p.content_id))
            .map(|c| c.client_id == client_id)
            .unwrap_or(false);
        if !owned {
            return Err(StoreError::NotFound(format!("publication {publication_id}")));
        }
        tables.publications.remove(publication_id);
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>, batch_size: usize) -> StoreResult<Vec<Publication>> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;

        // Ordered claim (§4.6 / §5): sort by publish_at ascending.
        let mut with_time: Vec<(DateTime<Utc>, Id)> = tables
            .publications
            .values()
            .filter(|p| p.status == PublicationStatus::Scheduled && p.publish_at <= now)
            .map(|p| (p.publish_at, p.id.clone()))
            .collect();
        with_time.sort_by_key(|(ts, _)| *ts);

        let claimed_ids: Vec<Id> = with_time.into_iter().take(batch_size).map(|(_, id)| id).collect();

        let mut claimed = Vec::with_capacity(claimed_ids.len());
        for id in claimed_ids {
            if let Some(p) = tables.publications.get_mut(&id) {
                p.status = PublicationStatus::Publishing;
                p.updated_at = now;
                claimed.push(p.clone());
            }
        }
        Ok(claimed)
    }

    async fn load_publish_input(&self, publication_id: &str) -> StoreResult<PublishInputRow> {
        let tables = self.tables.read().await;
        let publication = tables
            .publications
            .get(publication_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("publication {publication_id}")))?;
        let social_account = tables
            .social_accounts
            .get(&publication.social_account_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("social account {}", publication.social_account_id)))?;
        let content = tables
            .contents
            .get(&publication.content_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("content {}", publication.content_id)))?;

        let mut pub_media: Vec<PublicationMedia> = tables
            .publication_media
            .values()
            .filter(|pm| pm.publication_id == publication_id)
            .cloned()
            .collect();
        pub_media.sort_by_key(|pm| pm.order);

        let media = pub_media
            .into_iter()
            .filter_map(|pm| tables.media.get(&pm.media_id).cloned())
            .collect();

        Ok(PublishInputRow {
            publication,
            social_account,
            content,
            media,
        })
    }

    async fn mark_published(
        &self,
        publication_id: &str,
        platform_id: Option<String>,
        link: Option<String>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let p = tables
            .publications
            .get_mut(publication_id)
            .ok_or_else(|| StoreError::NotFound(format!("publication {publication_id}")))?;
        p.status = PublicationStatus::Published;
        p.platform_id = platform_id;
        p.link = link;
        p.error = None;
        p.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_error(&self, publication_id: &str, error: String) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let p = tables
            .publications
            .get_mut(publication_id)
            .ok_or_else(|| StoreError::NotFound(format!("publication {publication_id}")))?;
        p.status = PublicationStatus::Error;
        p.error = Some(error);
        p.updated_at = Utc::now();
        Ok(())
    }

    async fn list_publications_by_content_ordered(&self, content_id: &str) -> StoreResult<Vec<Publication>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Publication> = tables
            .publications
            .values()
            .filter(|p| p.content_id == content_id)
            .cloned()
            .collect();
        items.sort_by_key(|p| p.publish_at);
        Ok(items)
    }
}

#[async_trait]
impl PublicationMediaStore for InMemoryStore {
    async fn replace_for_publication(
        &self,
        publication_id: &str,
        items: Vec<PublicationMedia>,
    ) -> StoreResult<Vec<PublicationMedia>> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;
        tables.publication_media.retain(|_, pm| pm.publication_id != publication_id);
        for item in &items {
            tables.publication_media.insert(item.id.clone(), item.clone());
        }
        Ok(items)
    }

    async fn list_for_publication_ordered(
        &self,
        publication_id: &str,
    ) -> StoreResult<Vec<PublicationMedia>> {
        let tables = self.tables.read().await;
        let mut items: Vec<PublicationMedia> = tables
            .publication_media
            .values()
            .filter(|pm| pm.publication_id == publication_id)
            .cloned()
            .collect();
        items.sort_by_key(|pm| pm.order);
        Ok(items)
    }
}

#[async_trait]
impl ShareLinkStore for InMemoryStore {
    async fn create(&self, link: CalendarShareLink) -> StoreResult<CalendarShareLink> {
        let mut tables = self.tables.write().await;
        if tables.share_links_by_hash.contains_key(&link.token_hash) {
            return Err(StoreError::Conflict("token hash collision".to_string()));
        }
        tables.share_links_by_hash.insert(link.token_hash.clone(), link.id.clone());
        tables.share_links.insert(link.id.clone(), link.clone());
        Ok(link)
    }

    async fn get_by_hash(&self, token_hash: &str) -> StoreResult<Option<CalendarShareLink>> {
        let tables = self.tables.read().await;
        Ok(tables
            .share_links_by_hash
            .get(token_hash)
            .and_then(|id| tables.share_links.get(id))
            .cloned())
    }

    async fn get_scoped(&self, calendar_id: &str, link_id: &str) -> StoreResult<CalendarShareLink> {
        let tables = self.tables.read().await;
        tables
            .share_links
            .get(link_id)
            .filter(|l| l.calendar_id == calendar_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("share link {link_id}")))
    }

    async fn revoke(&self, link_id: &str) -> StoreResult<CalendarShareLink> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;
        let link = tables
            .share_links
            .get_mut(link_id)
            .ok_or_else(|| StoreError::NotFound(format!("share link {link_id}")))?;
        if link.revoked_at.is_some() || !link.is_active {
            return Err(StoreError::PreconditionFailed("already revoked".to_string()));
        }
        link.is_active = false;
        link.revoked_at = Some(Utc::now());
        Ok(link.clone())
    }

    async fn regenerate(
        &self,
        old_link_id: &str,
        new_link: CalendarShareLink,
    ) -> StoreResult<(CalendarShareLink, CalendarShareLink)> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;

        let revoked = {
            let link = tables
                .share_links
                .get_mut(old_link_id)
                .ok_or_else(|| StoreError::NotFound(format!("share link {old_link_id}")))?;
            if link.revoked_at.is_some() || !link.is_active {
                return Err(StoreError::PreconditionFailed("already revoked".to_string()));
            }
            link.is_active = false;
            link.revoked_at = Some(Utc::now());
            link.clone()
        };

        tables
            .share_links_by_hash
            .insert(new_link.token_hash.clone(), new_link.id.clone());
        tables.share_links.insert(new_link.id.clone(), new_link.clone());

        Ok((revoked, new_link))
    }

    async fn record_access(&self, link_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let link = tables
            .share_links
            .get_mut(link_id)
            .ok_or_else(|| StoreError::NotFound(format!("share link {link_id}")))?;

        let should_write = match link.last_accessed_at {
            None => true,
            Some(last) => now.signed_duration_since(last) > chrono::Duration::minutes(1),
        };
        if should_write {
            link.last_accessed_at = Some(now);
            link.access_count += 1;
        }
        Ok(should_write)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _guard = self.txn.lock().await;
        let mut tables = self.tables.write().await;
        let mut count = 0u64;
        for link in tables.share_links.values_mut() {
            if link.is_active && link.expires_at.map(|e| e <= now).unwrap_or(false) {
                link.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl CommentStore for InMemoryStore {
    async fn create(&self, comment: Comment) -> StoreResult<Comment> {
        let mut tables = self.tables.write().await;
        tables.comments.insert(comment.id.clone(), comment.clone());
        Ok(comment)
    }

    async fn get(&self, comment_id: &str) -> StoreResult<Comment> {
        let tables = self.tables.read().await;
        tables
            .comments
            .get(comment_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("comment {comment_id}")))
    }

    async fn update_body(&self, comment_id: &str, body: String, now: DateTime<Utc>) -> StoreResult<Comment> {
        let mut tables = self.tables.write().await;
        let comment = tables
            .comments
            .get_mut(comment_id)
            .ok_or_else(|| StoreError::NotFound(format!("comment {comment_id}")))?;
        comment.body = body;
        comment.updated_at = now;
        Ok(comment.clone())
    }

    async fn delete(&self, comment_id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .comments
            .remove(comment_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("comment {comment_id}")))
    }

    async fn list_page(
        &self,
        calendar_id: &str,
        publication_id: Option<&str>,
        cursor: Option<DateTime<Utc>>,
        limit: u32,
    ) -> StoreResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.calendar_id == calendar_id && !c.is_resolved)
            .filter(|c| publication_id.map(|id| c.publication_id.as_deref() == Some(id)).unwrap_or(true))
            .filter(|c| cursor.map(|cur| c.created_at < cur).unwrap_or(true))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching.truncate(limit as usize + 1);
        Ok(matching)
    }
}

impl Store for InMemoryStore {}
