//! Media upload endpoint (§4.9): accepts a single multipart file,
//! pushes it to the object store, and registers the resulting row.
//! Resizing/thumbnailing/probing width-height-duration is a job for an
//! external media pipeline per the spec's scope; this handler only
//! persists what the client declares plus what the upload response
//! gives us for free (the final URL).

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::Utc;

use crate::context::RequestContext;
use crate::error::{ApiError, Result};
use crate::models::{Id, Media, MediaType};
use crate::objectstore::media_key;
use crate::store::{ContentStore, MediaStore};

use super::AppState;

/// §4.9 MIME/size policy: images from a small allowlist, capped at
/// 10 MiB; videos from another allowlist, capped at 100 MiB.
const IMAGE_MIME_ALLOWLIST: &[&str] = &["image/jpeg", "image/png", "image/webp"];
const VIDEO_MIME_ALLOWLIST: &[&str] = &["video/mp4", "video/quicktime"];
const MAX_IMAGE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_VIDEO_SIZE_BYTES: u64 = 100 * 1024 * 1024;

fn media_type_for(mime_type: &str) -> Result<MediaType> {
    if IMAGE_MIME_ALLOWLIST.contains(&mime_type) {
        Ok(MediaType::Image)
    } else if VIDEO_MIME_ALLOWLIST.contains(&mime_type) {
        Ok(MediaType::Video)
    } else {
        Err(ApiError::BadRequest(format!("unsupported media type: {mime_type}")))
    }
}

fn max_size_for(media_type: MediaType) -> u64 {
    match media_type {
        MediaType::Image => MAX_IMAGE_SIZE_BYTES,
        MediaType::Video => MAX_VIDEO_SIZE_BYTES,
    }
}

fn extension_for(filename: Option<&str>, mime_type: &str) -> String {
    if let Some(name) = filename {
        if let Some(ext) = name.rsplit('.').next() {
            if ext != name {
                return ext.to_lowercase();
            }
        }
    }
    mime_type.split('/').nth(1).unwrap_or("bin").to_lowercase()
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(content_id): Path<Id>,
    mut multipart: Multipart,
) -> Result<Json<Media>> {
    let client_id = ctx.require_client_id()?;
    let content = ContentStore::get_scoped(&*state.store, client_id, &content_id).await?;

    let existing = MediaStore::list_by_content_ordered(&*state.store, &content.id).await?;
    if existing.len() >= state.config.max_media_per_content {
        return Err(ApiError::BadRequest(format!(
            "content already has the maximum of {} media items",
            state.config.max_media_per_content
        )));
    }

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
        .ok_or_else(|| ApiError::BadRequest("multipart request is missing the file field".to_string()))?;

    let filename = field.file_name().map(|s| s.to_string());
    let mime_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let media_type = media_type_for(&mime_type)?;
    let size = bytes.len() as u64;
    let max_size = max_size_for(media_type);
    if size > max_size {
        return Err(ApiError::BadRequest(format!(
            "{media_type:?} media must be at most {} bytes, got {size}",
            max_size
        )));
    }

    let ext = extension_for(filename.as_deref(), &mime_type);
    let key = media_key(client_id, &content.id, &ext);

    let url = state
        .object_store
        .upload_file(&key, bytes.to_vec(), &mime_type)
        .await
        .map_err(|e| ApiError::internal(e))?;

    let order = existing.len() as i32;
    let media = Media {
        id: uuid::Uuid::new_v4().to_string(),
        content_id: content.id,
        url,
        key,
        media_type,
        mime_type,
        size,
        width: None,
        height: None,
        duration: None,
        thumbnail: None,
        order,
        created_at: Utc::now(),
    };

    let stored = MediaStore::create(&*state.store, media).await?;
    Ok(Json(stored))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_dispatches_on_allowlisted_mime() {
        assert!(matches!(media_type_for("image/png").unwrap(), MediaType::Image));
        assert!(matches!(media_type_for("video/mp4").unwrap(), MediaType::Video));
        assert!(media_type_for("application/pdf").is_err());
    }

    #[test]
    fn media_type_rejects_non_allowlisted_subtype() {
        assert!(media_type_for("image/gif").is_err());
        assert!(media_type_for("video/avi").is_err());
    }

    #[test]
    fn size_ceiling_differs_by_media_type() {
        assert_eq!(max_size_for(MediaType::Image), MAX_IMAGE_SIZE_BYTES);
        assert_eq!(max_size_for(MediaType::Video), MAX_VIDEO_SIZE_BYTES);
        assert!(MAX_VIDEO_SIZE_BYTES > MAX_IMAGE_SIZE_BYTES);
    }

    #[test]
    fn extension_prefers_filename_over_mime() {
        assert_eq!(extension_for(Some("photo.JPG"), "image/png"), "jpg");
        assert_eq!(extension_for(Some("noext"), "image/png"), "png");
        assert_eq!(extension_for(None, "video/quicktime"), "quicktime");
    }
}
