//! Share-Link Service (§4.7) and the periodic Share-Link Sweeper.
//!
//! Token issuance and resolution are pure-ish wrappers around
//! `crypto` + `ShareLinkStore`; the interesting part is the ordered
//! precondition checks in `resolve` (invalid → revoked → expired →
//! valid) and the debounced access-stats update, mirrored from §4.7
//! exactly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::crypto::{generate_share_token, hash_token};
use crate::error::{ApiError, Result};
use crate::models::{Calendar, CalendarShareLink, SharePermission};
use crate::store::Store;

/// Outcome of resolving a raw share token, mirroring the four states
/// in §4.7's resolution algorithm rather than collapsing them into a
/// single error — callers need to distinguish `expired`/`revoked` (410)
/// from `invalid` (404).
pub enum ResolveOutcome {
    Invalid,
    Revoked,
    Expired,
    Valid {
        link: CalendarShareLink,
        calendar: Calendar,
    },
}

pub struct ShareLinkService {
    store: Arc<dyn Store>,
}

impl ShareLinkService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Issues a new link. Returns the stored row and the raw token,
    /// which is never persisted and must be shown to the caller exactly
    /// once.
    pub async fn create(
        &self,
        calendar_id: &str,
        permission: SharePermission,
        label: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(CalendarShareLink, String)> {
        let raw_token = generate_share_token();
        let now = Utc::now();
        let link = CalendarShareLink {
            id: uuid::Uuid::new_v4().to_string(),
            calendar_id: calendar_id.to_string(),
            token_hash: hash_token(&raw_token),
            permission,
            label,
            expires_at,
            is_active: true,
            revoked_at: None,
            last_accessed_at: None,
            access_count: 0,
            created_at: now,
        };
        let stored = self.store.create(link).await?;
        Ok((stored, raw_token))
    }

    /// §4.7 resolution algorithm, steps 1-6.
    pub async fn resolve(&self, raw_token: &str) -> Result<ResolveOutcome> {
        let hash = hash_token(raw_token);
        let Some(link) = self.store.get_by_hash(&hash).await? else {
            return Ok(ResolveOutcome::Invalid);
        };

        if !link.is_active || link.revoked_at.is_some() {
            return Ok(ResolveOutcome::Revoked);
        }

        let now = Utc::now();
        if link.is_expired(now) {
            return Ok(ResolveOutcome::Expired);
        }

        self.store.record_access(&link.id, now).await?;
        let calendar = crate::store::CalendarStore::get_by_id(&*self.store, &link.calendar_id).await?;
        Ok(ResolveOutcome::Valid { link, calendar })
    }

    /// Idempotent precondition: revoking an already-revoked link is a
    /// `bad_request`, not a silent no-op (§4.7).
    pub async fn revoke(&self, calendar_id: &str, link_id: &str) -> Result<CalendarShareLink> {
        let link = crate::store::ShareLinkStore::get_scoped(&*self.store, calendar_id, link_id).await?;
        if !link.is_active || link.revoked_at.is_some() {
            return Err(ApiError::BadRequest("share link is already revoked".to_string()));
        }
        Ok(self.store.revoke(link_id).await?)
    }

    /// Revokes the old link and issues a new one with the same
    /// `permission`, `label`, `expiresAt`, in one transaction.
    pub async fn regenerate(&self, calendar_id: &str, link_id: &str) -> Result<(CalendarShareLink, String)> {
        let old = crate::store::ShareLinkStore::get_scoped(&*self.store, calendar_id, link_id).await?;
        let raw_token = generate_share_token();
        let now = Utc::now();
        let new_link = CalendarShareLink {
            id: uuid::Uuid::new_v4().to_string(),
            calendar_id: old.calendar_id.clone(),
            token_hash: hash_token(&raw_token),
            permission: old.permission,
            label: old.label.clone(),
            expires_at: old.expires_at,
            is_active: true,
            revoked_at: None,
            last_accessed_at: None,
            access_count: 0,
            created_at: now,
        };
        let (_old, new) = self.store.regenerate(link_id, new_link).await?;
        Ok((new, raw_token))
    }
}

/// Periodic bulk-deactivation of expired links (§4.7). Purely an
/// optimization — `resolve` already re-checks expiry on every call —
/// so a missed or doubled tick changes nothing about correctness.
pub struct Sweeper {
    store: Arc<dyn Store>,
    period: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn Store>, period: Duration) -> Self {
        Self { store, period }
    }

    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.period);
        loop {
            interval.tick().await;
            match self.store.sweep_expired(Utc::now()).await {
                Ok(count) if count > 0 => tracing::info!(count, "swept expired share links"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "share link sweep failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    async fn seed_client_and_calendar(mem: &InMemoryStore, now: chrono::DateTime<chrono::Utc>) {
        mem.insert_client(crate::models::Client {
            id: "cl1".into(),
            user_id: "u1".into(),
            name: "Client".into(),
            avatar: None,
            created_at: now,
        })
        .await;
        mem.insert_calendar(crate::models::Calendar {
            id: "cal1".into(),
            user_id: "u1".into(),
            client_id: "cl1".into(),
            name: "Cal".into(),
            description: None,
            created_at: now,
        })
        .await;
    }

    #[tokio::test]
    async fn create_then_resolve_round_trips() {
        let mem = Arc::new(InMemoryStore::new());
        let now = chrono::Utc::now();
        seed_client_and_calendar(&mem, now).await;
        let svc = ShareLinkService::new(mem.clone());

        let (_link, raw) = svc
            .create("cal1", SharePermission::View, None, None)
            .await
            .unwrap();

        match svc.resolve(&raw).await.unwrap() {
            ResolveOutcome::Valid { calendar, .. } => assert_eq!(calendar.id, "cal1"),
            _ => panic!("expected valid"),
        }
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let mem = Arc::new(InMemoryStore::new());
        let svc = ShareLinkService::new(mem);
        match svc.resolve("does-not-exist").await.unwrap() {
            ResolveOutcome::Invalid => {}
            _ => panic!("expected invalid"),
        }
    }

    #[tokio::test]
    async fn revoking_twice_is_bad_request() {
        let mem = Arc::new(InMemoryStore::new());
        let now = chrono::Utc::now();
        seed_client_and_calendar(&mem, now).await;
        let svc = ShareLinkService::new(mem.clone());
        let (link, _raw) = svc.create("cal1", SharePermission::View, None, None).await.unwrap();

        svc.revoke("cal1", &link.id).await.unwrap();
        let err = svc.revoke("cal1", &link.id).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn regenerate_revokes_old_and_resolves_new() {
        let mem = Arc::new(InMemoryStore::new());
        let now = chrono::Utc::now();
        seed_client_and_calendar(&mem, now).await;
        let svc = ShareLinkService::new(mem.clone());
        let (old_link, old_raw) = svc.create("cal1", SharePermission::View, None, None).await.unwrap();

        let (_new_link, new_raw) = svc.regenerate("cal1", &old_link.id).await.unwrap();

        match svc.resolve(&old_raw).await.unwrap() {
            ResolveOutcome::Revoked => {}
            _ => panic!("expected old token revoked"),
        }
        match svc.resolve(&new_raw).await.unwrap() {
            ResolveOutcome::Valid { .. } => {}
            _ => panic!("expected new token valid"),
        }
    }
}
