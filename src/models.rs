//! Data model for the scheduling backend.
//!
//! Entities mirror the frontend's camelCase wire shape, the way the
//! teacher's `ShareLink`/`Activity` DTOs do, so serialization stays
//! stable across a TypeScript client without a translation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

pub type Id = String;

// ============================================
// Tenancy
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub external_subject: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Social accounts
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Instagram,
    Tiktok,
    Facebook,
    X,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Platform::Instagram => "INSTAGRAM",
            Platform::Tiktok => "TIKTOK",
            Platform::Facebook => "FACEBOOK",
            Platform::X => "X",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialAccount {
    pub id: Id,
    pub user_id: Id,
    pub client_id: Id,
    pub platform: Platform,
    pub platform_user_id: String,
    pub username: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
}

// ============================================
// Calendars, kanban columns, content, media
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: Id,
    pub user_id: Id,
    pub client_id: Id,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanbanColumn {
    pub id: Id,
    pub calendar_id: Id,
    pub name: String,
    pub order: i32,
    pub mapped_status: Option<PublicationStatus>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: Id,
    pub user_id: Id,
    pub client_id: Id,
    pub calendar_id: Option<Id>,
    pub caption: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: Id,
    pub content_id: Id,
    pub url: String,
    pub key: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub mime_type: String,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub order: i32,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Publications
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PublicationFormat {
    Feed,
    Story,
    Reel,
    Carousel,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PublicationStatus {
    Scheduled,
    Publishing,
    Published,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub id: Id,
    pub content_id: Id,
    pub social_account_id: Id,
    pub platform: Platform,
    pub format: PublicationFormat,
    pub publish_at: DateTime<Utc>,
    pub status: PublicationStatus,
    pub error: Option<String>,
    pub custom_caption: Option<String>,
    pub platform_config: Option<Json>,
    pub platform_id: Option<String>,
    pub link: Option<String>,
    pub kanban_column_id: Option<Id>,
    pub kanban_order: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Publication {
    /// A publication in PUBLISHED or PUBLISHING is immutable via the
    /// user-facing update endpoint (§4.6 update rules).
    pub fn is_update_locked(&self) -> bool {
        matches!(
            self.status,
            PublicationStatus::Published | PublicationStatus::Publishing
        )
    }

    /// A publication in PUBLISHING cannot be deleted.
    pub fn is_delete_locked(&self) -> bool {
        matches!(self.status, PublicationStatus::Publishing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationMedia {
    pub id: Id,
    pub publication_id: Id,
    pub media_id: Id,
    pub order: i32,
    pub crop_data: Option<Json>,
}

// ============================================
// Share links
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SharePermission {
    View,
    ViewAndComment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarShareLink {
    pub id: Id,
    pub calendar_id: Id,
    /// SHA-256 hash of the raw token. The raw token itself is never
    /// persisted (testable property: token secrecy).
    pub token_hash: String,
    pub permission: SharePermission,
    pub label: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
}

impl CalendarShareLink {
    /// A link is resolvable iff active, not revoked, and not expired.
    pub fn is_resolvable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.revoked_at.is_none()
            && self.expires_at.map(|e| e > now).unwrap_or(true)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }
}

// ============================================
// Comments
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Id,
    pub calendar_id: Id,
    pub publication_id: Option<Id>,
    pub share_link_id: Option<Id>,
    pub user_id: Option<Id>,
    pub commenter_id: Option<Id>,
    pub author_name: String,
    pub author_email: Option<String>,
    pub body: String,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_manager(&self) -> bool {
        self.user_id.is_some()
    }

    /// Edit/delete by public commenter allowed iff now - createdAt <= 15 minutes.
    pub fn within_edit_window(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) <= chrono::Duration::minutes(15)
    }
}
