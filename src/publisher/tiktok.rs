//! TikTok driver (§4.5): creator-info negotiation, direct-post init,
//! chunked upload, and an execute-with-refresh wrapper around expired
//! access tokens.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::TikTokConfig;
use crate::models::{MediaType, PublicationFormat};
use crate::store::SocialAccountStore;

use super::{DriverError, PublishInput, PublishOutcome, Publisher, ValidationResult};

const CAPTION_MAX_LEN: usize = 150;
const SINGLE_CHUNK_LIMIT: u64 = 64 * 1024 * 1024;
const CHUNK_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
struct TikTokApiError {
    is_token_invalid: bool,
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    data: Option<T>,
    error: EnvelopeError,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    code: String,
    message: String,
    #[serde(default)]
    #[allow(dead_code)]
    log_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatorInfoData {
    #[serde(default)]
    privacy_level_options: Vec<String>,
    #[serde(default)]
    comment_disabled: bool,
    #[serde(default)]
    duet_disabled: bool,
    #[serde(default)]
    stitch_disabled: bool,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
    #[serde(default)]
    upload_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

/// `chunk_size = video_size` and `total_chunk_count = 1` for files at or
/// under 64 MiB; otherwise fixed 10 MiB chunks (§8 boundary: exactly 64
/// MiB is one chunk, one byte more triggers the chunked path).
pub fn chunk_plan(video_size: u64) -> (u64, u64) {
    if video_size <= SINGLE_CHUNK_LIMIT {
        (video_size, 1)
    } else {
        let total = video_size.div_ceil(CHUNK_SIZE);
        (CHUNK_SIZE, total)
    }
}

pub fn truncate_caption(raw: &str, max_chars: usize) -> String {
    raw.chars().take(max_chars).collect()
}

/// Deletes its path on drop, so a temp download is cleaned up on every
/// exit path (success, error, or panic-unwind) from the upload flow.
struct TempFileGuard(PathBuf);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

pub struct TikTokDriver {
    client: reqwest::Client,
    config: TikTokConfig,
    social_accounts: Arc<dyn SocialAccountStore>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TikTokDriver {
    pub fn new(config: TikTokConfig, social_accounts: Arc<dyn SocialAccountStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            social_accounts,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, social_account_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(social_account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_url)
    }

    /// §4.5: attempt `op`, and on a recognized token-invalid error,
    /// refresh once and retry exactly once. The refresh itself is
    /// guarded by a per-social-account lock so two concurrent failures
    /// don't both exchange the same refresh token (§5); the lock is
    /// released before the retried call, so the retry is not serialized.
    async fn execute_with_refresh<F, Fut, T>(
        &self,
        social_account: &crate::models::SocialAccount,
        op: F,
    ) -> Result<T, DriverError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, TikTokApiError>>,
    {
        let access_token = social_account
            .access_token
            .clone()
            .ok_or_else(|| DriverError::Other("social account has no access token".to_string()))?;

        match op(access_token.clone()).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_token_invalid => {
                let refresh_token = social_account
                    .refresh_token
                    .clone()
                    .ok_or_else(|| DriverError::RefreshFailed("no refresh token on file".to_string()))?;

                let lock = self.lock_for(&social_account.id).await;
                let new_access_token = {
                    let _guard = lock.lock().await;
                    let refreshed = self.refresh_tokens(&refresh_token).await?;
                    self.social_accounts
                        .update_tokens(
                            &social_account.id,
                            refreshed.access_token.clone(),
                            refreshed.refresh_token,
                            chrono::Utc::now() + chrono::Duration::seconds(refreshed.expires_in),
                        )
                        .await
                        .map_err(|e| DriverError::RefreshFailed(e.to_string()))?;
                    refreshed.access_token
                };

                op(new_access_token)
                    .await
                    .map_err(|e| DriverError::Upstream { code: e.code, message: e.message })
            }
            Err(e) => Err(DriverError::Upstream { code: e.code, message: e.message }),
        }
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<RefreshResponse, DriverError> {
        let client_key = self
            .config
            .client_key
            .as_deref()
            .ok_or_else(|| DriverError::RefreshFailed("TIKTOK_CLIENT_KEY not configured".to_string()))?;
        let client_secret = self
            .config
            .client_secret
            .as_deref()
            .ok_or_else(|| DriverError::RefreshFailed("TIKTOK_CLIENT_SECRET not configured".to_string()))?;

        let mut params = HashMap::new();
        params.insert("client_key", client_key.to_string());
        params.insert("client_secret", client_secret.to_string());
        params.insert("grant_type", "refresh_token".to_string());
        params.insert("refresh_token", refresh_token.to_string());

        let response = self
            .client
            .post(self.url("oauth/token/"))
            .form(&params)
            .send()
            .await
            .map_err(|e| DriverError::RefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DriverError::RefreshFailed(format!(
                "refresh endpoint returned {}",
                response.status()
            )));
        }

        // The refresh endpoint is flat — no {data, error} envelope.
        response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| DriverError::RefreshFailed(e.to_string()))
    }

    async fn call_envelope<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        access_token: &str,
        body: serde_json::Value,
    ) -> Result<T, TikTokApiError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=UTF-8")
            .json(&body)
            .send()
            .await
            .map_err(|e| TikTokApiError {
                is_token_invalid: false,
                code: "request_failed".to_string(),
                message: e.to_string(),
            })?;

        let http_status = response.status();
        let text = response.text().await.unwrap_or_default();
        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| TikTokApiError {
            is_token_invalid: false,
            code: "decode_failed".to_string(),
            message: e.to_string(),
        })?;

        let is_token_invalid = http_status == reqwest::StatusCode::UNAUTHORIZED
            || envelope.error.code == "access_token_invalid";

        if envelope.error.code != "ok" {
            return Err(TikTokApiError {
                is_token_invalid,
                code: envelope.error.code,
                message: envelope.error.message,
            });
        }

        envelope.data.ok_or_else(|| TikTokApiError {
            is_token_invalid: false,
            code: "empty_data".to_string(),
            message: "success envelope missing data".to_string(),
        })
    }

    async fn creator_info(&self, access_token: &str) -> Result<CreatorInfoData, TikTokApiError> {
        self.call_envelope("post/publish/creator_info/query/", access_token, json!({}))
            .await
    }

    async fn init_direct_post(
        &self,
        access_token: &str,
        title: &str,
        privacy_level: &str,
        video_size: u64,
        chunk_size: u64,
        total_chunk_count: u64,
    ) -> Result<InitData, TikTokApiError> {
        let body = json!({
            "post_info": {
                "title": title,
                "privacy_level": privacy_level,
                "disable_comment": false,
                "disable_duet": false,
                "disable_stitch": false,
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": video_size,
                "chunk_size": chunk_size,
                "total_chunk_count": total_chunk_count,
            },
        });
        self.call_envelope("post/publish/video/init/", access_token, body).await
    }

    async fn download_to_tempfile(&self, url: &str, publication_id: &str) -> Result<(TempFileGuard, u64), DriverError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DriverError::Other(format!("media download failed: {e}")))?;

        let path = std::env::temp_dir().join(format!("tiktok-upload-{publication_id}.mp4"));
        let guard = TempFileGuard(path.clone());

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| DriverError::Other(format!("temp file create failed: {e}")))?;

        let mut size = 0u64;
        let mut stream = response.bytes_stream();
        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DriverError::Other(format!("media download failed: {e}")))?;
            size += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| DriverError::Other(format!("temp file write failed: {e}")))?;
        }
        file.flush().await.map_err(|e| DriverError::Other(format!("temp file flush failed: {e}")))?;

        Ok((guard, size))
    }

    async fn upload_chunks(
        &self,
        upload_url: &str,
        path: &PathBuf,
        video_size: u64,
        chunk_size: u64,
        total_chunk_count: u64,
    ) -> Result<(), DriverError> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| DriverError::Other(format!("temp file reopen failed: {e}")))?;

        for chunk_index in 0..total_chunk_count {
            let start = chunk_index * chunk_size;
            let end = std::cmp::min(start + chunk_size, video_size) - 1;
            let len = (end - start + 1) as usize;

            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|e| DriverError::Other(format!("temp file seek failed: {e}")))?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf)
                .await
                .map_err(|e| DriverError::Other(format!("temp file read failed: {e}")))?;

            let response = self
                .client
                .put(upload_url)
                .header(reqwest::header::CONTENT_TYPE, "video/mp4")
                .header(reqwest::header::CONTENT_LENGTH, len)
                .header("Content-Range", format!("bytes {start}-{end}/{video_size}"))
                .body(buf)
                .send()
                .await
                .map_err(|e| DriverError::Other(format!("chunk upload failed: {e}")))?;

            if !response.status().is_success() {
                return Err(DriverError::Upstream {
                    code: response.status().as_u16().to_string(),
                    message: "chunk upload rejected".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for TikTokDriver {
    fn validate(&self, input: &PublishInput) -> ValidationResult {
        let mut errors = Vec::new();
        if input.media.is_empty() {
            errors.push("either video_url or file_path is required".to_string());
        }
        if input.caption().chars().count() > CAPTION_MAX_LEN {
            errors.push(format!("description must be at most {CAPTION_MAX_LEN} characters"));
        }
        ValidationResult { errors }
    }

    async fn publish(&self, input: &PublishInput) -> Result<PublishOutcome, DriverError> {
        let validation = self.validate(input);
        if !validation.is_ok() {
            return Err(DriverError::Validation(validation.errors));
        }
        if !matches!(input.publication.format, PublicationFormat::Video | PublicationFormat::Reel) {
            return Err(DriverError::NotImplemented(format!(
                "TikTok driver does not support {:?}",
                input.publication.format
            )));
        }

        let media = input
            .media
            .iter()
            .find(|m| m.media_type == MediaType::Video)
            .ok_or_else(|| DriverError::Validation(vec!["no video media attached".to_string()]))?;

        let title = truncate_caption(&input.caption(), CAPTION_MAX_LEN);
        let social_account = input.social_account.clone();
        let publication_id = input.publication.id.clone();
        let media_url = media.url.clone();

        let privacy_level = self
            .execute_with_refresh(&social_account, {
                let input = input.clone();
                move |token| {
                    let input = input.clone();
                    async move {
                        let requested = platform_config_str(&input, "privacy_level");
                        match self_privacy_level(self, &token, requested.as_deref()).await {
                            Ok(level) => Ok(level),
                            Err(e) => Err(e),
                        }
                    }
                }
            })
            .await
            .unwrap_or_else(|_| "SELF_ONLY".to_string());

        let (guard, video_size) = self.download_to_tempfile(&media_url, &publication_id).await?;
        let (chunk_size, total_chunk_count) = chunk_plan(video_size);

        // Re-fetch: the creator-info call above may have refreshed and
        // persisted a new access/refresh token pair. TikTok rotates the
        // refresh token on every exchange, so reusing the stale clone
        // here would retry a second refresh against an already-spent
        // refresh_token.
        let social_account = self
            .social_accounts
            .get_scoped(&social_account.client_id, &social_account.id)
            .await
            .map_err(|e| DriverError::Other(format!("failed to reload social account: {e}")))?;

        let init = self
            .execute_with_refresh(&social_account, {
                let title = title.clone();
                let privacy_level = privacy_level.clone();
                move |token| {
                    let title = title.clone();
                    let privacy_level = privacy_level.clone();
                    async move {
                        self.init_direct_post(&token, &title, &privacy_level, video_size, chunk_size, total_chunk_count)
                            .await
                    }
                }
            })
            .await?;

        let upload_url = init
            .upload_url
            .clone()
            .ok_or_else(|| DriverError::Other("init response missing upload_url".to_string()))?;

        let upload_result = self
            .upload_chunks(&upload_url, &guard.0, video_size, chunk_size, total_chunk_count)
            .await;

        drop(guard);
        upload_result?;

        Ok(PublishOutcome {
            platform_id: Some(init.publish_id),
            link: None,
        })
    }
}

/// Creator-info guard (§4.5): if the caller's requested privacy level
/// isn't advertised, fall back to the first advertised option, logging
/// the substitution.
async fn self_privacy_level(
    driver: &TikTokDriver,
    access_token: &str,
    requested: Option<&str>,
) -> Result<String, TikTokApiError> {
    let info = driver.creator_info(access_token).await?;
    match requested {
        Some(level) if info.privacy_level_options.iter().any(|o| o == level) => Ok(level.to_string()),
        Some(level) => {
            let fallback = info
                .privacy_level_options
                .first()
                .cloned()
                .unwrap_or_else(|| "SELF_ONLY".to_string());
            tracing::warn!(requested = level, substituted = %fallback, "tiktok privacy level unsupported by creator, substituting");
            Ok(fallback)
        }
        None => Ok(info.privacy_level_options.first().cloned().unwrap_or_else(|| "SELF_ONLY".to_string())),
    }
}

fn platform_config_str(input: &PublishInput, key: &str) -> Option<String> {
    input
        .publication
        .platform_config
        .as_ref()
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_plan_single_chunk_at_boundary() {
        assert_eq!(chunk_plan(64 * 1024 * 1024), (64 * 1024 * 1024, 1));
    }

    #[test]
    fn chunk_plan_chunks_one_byte_over_boundary() {
        let (chunk_size, total) = chunk_plan(64 * 1024 * 1024 + 1);
        assert_eq!(chunk_size, CHUNK_SIZE);
        assert_eq!(total, 2);
    }

    #[test]
    fn chunk_plan_divides_evenly() {
        let (chunk_size, total) = chunk_plan(150 * 1024 * 1024);
        assert_eq!(chunk_size, CHUNK_SIZE);
        assert_eq!(total, 15);
    }

    #[test]
    fn caption_truncates_to_150_chars() {
        let long = "a".repeat(200);
        let truncated = truncate_caption(&long, CAPTION_MAX_LEN);
        assert_eq!(truncated.chars().count(), CAPTION_MAX_LEN);
    }

    struct FakeSocialAccountStore(Mutex<crate::models::SocialAccount>);

    #[async_trait]
    impl SocialAccountStore for FakeSocialAccountStore {
        async fn get_scoped(&self, _client_id: &str, _account_id: &str) -> crate::store::StoreResult<crate::models::SocialAccount> {
            Ok(self.0.lock().await.clone())
        }

        async fn update_tokens(
            &self,
            _account_id: &str,
            access_token: String,
            refresh_token: String,
            expires_at: chrono::DateTime<chrono::Utc>,
        ) -> crate::store::StoreResult<()> {
            let mut guard = self.0.lock().await;
            guard.access_token = Some(access_token);
            guard.refresh_token = Some(refresh_token);
            guard.expires_at = Some(expires_at);
            Ok(())
        }
    }

    /// S3 (§8): expired access token triggers exactly one refresh, the
    /// retried `init` succeeds, and the single-chunk (<=64 MiB) video is
    /// uploaded — all against a mocked TikTok API.
    #[tokio::test]
    async fn publish_refreshes_expired_token_then_succeeds() {
        use crate::models::{Content, Platform, Publication, PublicationStatus, SocialAccount};

        let mut server = mockito::Server::new_async().await;

        let creator_info_mock = server
            .mock("POST", "/post/publish/creator_info/query/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":{"privacy_level_options":["SELF_ONLY"],"comment_disabled":false,"duet_disabled":false,"stitch_disabled":false},"error":{"code":"ok","message":"","log_id":"l1"}}"#,
            )
            .create_async()
            .await;

        let video_bytes: &[u8] = b"0123456789";
        let media_mock = server
            .mock("GET", "/video.mp4")
            .with_status(200)
            .with_body(video_bytes)
            .create_async()
            .await;

        let init_unauthorized_mock = server
            .mock("POST", "/post/publish/video/init/")
            .match_header("authorization", "Bearer T1")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":null,"error":{"code":"access_token_invalid","message":"token expired","log_id":"l2"}}"#)
            .create_async()
            .await;

        let upload_url = format!("{}/upload", server.url());
        let init_ok_mock = server
            .mock("POST", "/post/publish/video/init/")
            .match_header("authorization", "Bearer T2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"data":{{"publish_id":"P","upload_url":"{upload_url}"}},"error":{{"code":"ok","message":"","log_id":"l3"}}}}"#
            ))
            .create_async()
            .await;

        let refresh_mock = server
            .mock("POST", "/oauth/token/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"T2","refresh_token":"R2","expires_in":86400}"#)
            .create_async()
            .await;

        let upload_mock = server.mock("PUT", "/upload").with_status(200).create_async().await;

        let social_account = SocialAccount {
            id: "sa-1".into(),
            user_id: "u-1".into(),
            client_id: "c-1".into(),
            platform: Platform::Tiktok,
            platform_user_id: "tt-1".into(),
            username: "handle".into(),
            access_token: Some("T1".into()),
            refresh_token: Some("R1".into()),
            expires_at: None,
            is_active: true,
            disconnected_at: None,
        };
        let store = Arc::new(FakeSocialAccountStore(Mutex::new(social_account.clone())));

        let driver = TikTokDriver::new(
            TikTokConfig {
                api_url: server.url(),
                client_key: Some("key".into()),
                client_secret: Some("secret".into()),
                callback_url: None,
            },
            store.clone(),
        );

        let content = Content {
            id: "content-1".into(),
            user_id: "u-1".into(),
            client_id: "c-1".into(),
            calendar_id: None,
            caption: "default caption".into(),
            created_at: chrono::Utc::now(),
        };
        let publication = Publication {
            id: "pub-1".into(),
            content_id: "content-1".into(),
            social_account_id: "sa-1".into(),
            platform: Platform::Tiktok,
            format: PublicationFormat::Video,
            publish_at: chrono::Utc::now(),
            status: PublicationStatus::Publishing,
            error: None,
            custom_caption: Some("hello".into()),
            platform_config: None,
            platform_id: None,
            link: None,
            kanban_column_id: None,
            kanban_order: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let media = crate::models::Media {
            id: "m1".into(),
            content_id: "content-1".into(),
            url: format!("{}/video.mp4", server.url()),
            key: "m1".into(),
            media_type: MediaType::Video,
            mime_type: "video/mp4".into(),
            size: video_bytes.len() as u64,
            width: None,
            height: None,
            duration: None,
            thumbnail: None,
            order: 0,
            created_at: chrono::Utc::now(),
        };

        let input = PublishInput {
            publication,
            social_account,
            content,
            media: vec![media],
        };

        let outcome = driver.publish(&input).await.unwrap();
        assert_eq!(outcome.platform_id.as_deref(), Some("P"));

        let stored = store.0.lock().await;
        assert_eq!(stored.access_token.as_deref(), Some("T2"));
        assert_eq!(stored.refresh_token.as_deref(), Some("R2"));
        drop(stored);

        creator_info_mock.assert_async().await;
        media_mock.assert_async().await;
        init_unauthorized_mock.assert_async().await;
        init_ok_mock.assert_async().await;
        refresh_mock.assert_async().await;
        upload_mock.assert_async().await;
    }
}
