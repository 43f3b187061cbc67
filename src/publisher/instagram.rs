//! Instagram driver (§4.4): two-phase Graph API container flow.
//!
//! Modeled on the Meta Graph API connector pattern from the pack's
//! `other_examples` (reqwest + form-encoded POST + nested
//! `error.{message,code,type,fbtrace_id}` parsing), restructured around
//! container creation/publish rather than OAuth token exchange — tokens
//! arrive already populated on `SocialAccount`.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::InstagramConfig;
use crate::models::{MediaType, PublicationFormat};

use super::{DriverError, PublishInput, PublishOutcome, Publisher, ValidationResult};

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct GraphError {
    message: String,
    #[serde(default)]
    #[serde(rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    fbtrace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    id: String,
}

pub struct InstagramDriver {
    client: reqwest::Client,
    config: InstagramConfig,
}

impl InstagramDriver {
    pub fn new(config: InstagramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_url)
    }

    async fn post_form(&self, path: &str, params: &HashMap<&str, String>, phase: &str) -> Result<serde_json::Value, DriverError> {
        let response = self
            .client
            .post(self.url(path))
            .form(params)
            .send()
            .await
            .map_err(|e| DriverError::Other(format!("instagram request failed during {phase}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DriverError::Other(format!("instagram response read failed: {e}")))?;

        if !status.is_success() {
            if let Ok(parsed) = serde_json::from_str::<GraphErrorBody>(&body) {
                tracing::error!(
                    phase,
                    code = parsed.error.code,
                    fbtrace_id = parsed.error.fbtrace_id.as_deref(),
                    "instagram api error"
                );
                return Err(DriverError::Upstream {
                    code: parsed
                        .error
                        .code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| status.as_u16().to_string()),
                    message: parsed.error.message,
                });
            }
            return Err(DriverError::Upstream {
                code: status.as_u16().to_string(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| DriverError::Other(format!("invalid instagram response: {e}")))
    }

    async fn create_container(&self, ig_user_id: &str, params: HashMap<&str, String>) -> Result<String, DriverError> {
        let body: ContainerResponse =
            serde_json::from_value(self.post_form(&format!("{ig_user_id}/media"), &params, "container_create").await?)
                .map_err(|e| DriverError::Other(format!("invalid container response: {e}")))?;
        Ok(body.id)
    }

}

#[async_trait]
impl Publisher for InstagramDriver {
    fn validate(&self, input: &PublishInput) -> ValidationResult {
        let mut errors = Vec::new();
        match input.publication.format {
            PublicationFormat::Feed | PublicationFormat::Story | PublicationFormat::Reel => {
                if input.media.is_empty() {
                    errors.push("at least one media item is required".to_string());
                }
            }
            PublicationFormat::Carousel => {
                if input.media.len() < 2 {
                    errors.push("carousel requires at least two media items".to_string());
                }
            }
            PublicationFormat::Video => {
                errors.push("VIDEO format is not a valid Instagram publication format".to_string());
            }
        }
        ValidationResult { errors }
    }

    async fn publish(&self, input: &PublishInput) -> Result<PublishOutcome, DriverError> {
        let validation = self.validate(input);
        if !validation.is_ok() {
            return Err(DriverError::Validation(validation.errors));
        }

        let ig_user_id = input.social_account.platform_user_id.clone();
        let access_token = input
            .social_account
            .access_token
            .clone()
            .ok_or_else(|| DriverError::Other("social account has no access token".to_string()))?;
        let caption = input.caption();

        match input.publication.format {
            PublicationFormat::Feed => {
                let media = &input.media[0];
                let mut params = HashMap::new();
                params.insert("image_url", media.url.clone());
                params.insert("caption", caption);
                params.insert("access_token", access_token.clone());

                let creation_id = self.create_container(&ig_user_id, params).await?;
                tokio::time::sleep(self.config.media_wait).await;
                let published_id = self.publish_container_with_token(&ig_user_id, &creation_id, &access_token).await?;

                Ok(PublishOutcome {
                    platform_id: Some(published_id.clone()),
                    link: Some(format!("https://www.instagram.com/p/{published_id}")),
                })
            }
            PublicationFormat::Story => {
                let media = &input.media[0];
                let mut params = HashMap::new();
                params.insert("media_type", "STORIES".to_string());
                if media.media_type == MediaType::Video {
                    params.insert("video_url", media.url.clone());
                } else {
                    params.insert("image_url", media.url.clone());
                }
                if let Some(link) = platform_config_str(input, "link") {
                    params.insert("link", link);
                }
                params.insert("access_token", access_token.clone());

                let creation_id = self.create_container(&ig_user_id, params).await?;
                tokio::time::sleep(self.config.media_wait).await;
                self.publish_container_with_token(&ig_user_id, &creation_id, &access_token).await?;

                Ok(PublishOutcome {
                    platform_id: Some(creation_id),
                    link: None,
                })
            }
            PublicationFormat::Reel => {
                let media = &input.media[0];
                let mut params = HashMap::new();
                params.insert("media_type", "REELS".to_string());
                params.insert("video_url", media.url.clone());
                params.insert("caption", caption);
                if let Some(thumb) = media.thumbnail.clone() {
                    params.insert("cover_url", thumb);
                }
                params.insert("access_token", access_token.clone());

                let creation_id = self.create_container(&ig_user_id, params).await?;
                tokio::time::sleep(self.config.video_wait).await;
                let published_id = self.publish_container_with_token(&ig_user_id, &creation_id, &access_token).await?;

                Ok(PublishOutcome {
                    platform_id: Some(published_id.clone()),
                    link: Some(format!("https://www.instagram.com/reel/{published_id}")),
                })
            }
            PublicationFormat::Carousel => {
                let mut child_ids = Vec::with_capacity(input.media.len());
                for media in &input.media {
                    let mut params = HashMap::new();
                    params.insert("is_carousel_item", "true".to_string());
                    if media.media_type == MediaType::Video {
                        params.insert("media_type", "VIDEO".to_string());
                        params.insert("video_url", media.url.clone());
                    } else {
                        params.insert("image_url", media.url.clone());
                    }
                    params.insert("access_token", access_token.clone());
                    let child_id = self.create_container(&ig_user_id, params).await?;
                    child_ids.push(child_id);
                }

                tokio::time::sleep(self.config.media_wait).await;

                let mut parent_params = HashMap::new();
                parent_params.insert("media_type", "CAROUSEL".to_string());
                parent_params.insert("children", child_ids.join(","));
                parent_params.insert("caption", caption);
                parent_params.insert("access_token", access_token.clone());
                let parent_id = self.create_container(&ig_user_id, parent_params).await?;

                tokio::time::sleep(self.config.media_wait).await;
                let published_id = self.publish_container_with_token(&ig_user_id, &parent_id, &access_token).await?;

                Ok(PublishOutcome {
                    platform_id: Some(published_id.clone()),
                    link: Some(format!("https://www.instagram.com/p/{published_id}")),
                })
            }
            PublicationFormat::Video => unreachable!("validated above"),
        }
    }
}

impl InstagramDriver {
    async fn publish_container_with_token(
        &self,
        ig_user_id: &str,
        creation_id: &str,
        access_token: &str,
    ) -> Result<String, DriverError> {
        let mut params = HashMap::new();
        params.insert("creation_id", creation_id.to_string());
        params.insert("access_token", access_token.to_string());
        let body: PublishResponse =
            serde_json::from_value(self.post_form(&format!("{ig_user_id}/media_publish"), &params, "publish").await?)
                .map_err(|e| DriverError::Other(format!("invalid publish response: {e}")))?;
        Ok(body.id)
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
    use crate::models::{Content, Media, Platform, Publication, PublicationStatus, SocialAccount};
    use chrono::Utc;

    fn social_account() -> SocialAccount {
        SocialAccount {
            id: "sa-1".into(),
            user_id: "u-1".into(),
            client_id: "c-1".into(),
            platform: Platform::Instagram,
            platform_user_id: "ig-1".into(),
            username: "handle".into(),
            access_token: Some("token".into()),
            refresh_token: None,
            expires_at: None,
            is_active: true,
            disconnected_at: None,
        }
    }

    fn content() -> Content {
        Content {
            id: "content-1".into(),
            user_id: "u-1".into(),
            client_id: "c-1".into(),
            calendar_id: None,
            caption: "default caption".into(),
            created_at: Utc::now(),
        }
    }

    fn publication(format: PublicationFormat) -> Publication {
        Publication {
            id: "pub-1".into(),
            content_id: "content-1".into(),
            social_account_id: "sa-1".into(),
            platform: Platform::Instagram,
            format,
            publish_at: Utc::now(),
            status: PublicationStatus::Scheduled,
            error: None,
            custom_caption: Some("hello".into()),
            platform_config: None,
            platform_id: None,
            link: None,
            kanban_column_id: None,
            kanban_order: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn image_media(id: &str, order: i32) -> Media {
        Media {
            id: id.into(),
            content_id: "content-1".into(),
            url: format!("https://cdn/{id}.jpg"),
            key: id.into(),
            media_type: MediaType::Image,
            mime_type: "image/jpeg".into(),
            size: 1024,
            width: None,
            height: None,
            duration: None,
            thumbnail: None,
            order,
            created_at: Utc::now(),
        }
    }

    fn video_media(id: &str, order: i32) -> Media {
        Media {
            media_type: MediaType::Video,
            mime_type: "video/mp4".into(),
            ..image_media(id, order)
        }
    }

    #[test]
    fn validate_requires_media_for_feed() {
        let driver = InstagramDriver::new(InstagramConfig {
            api_url: "https://graph.example.com".into(),
            media_wait: std::time::Duration::from_millis(1),
            video_wait: std::time::Duration::from_millis(1),
        });
        let input = PublishInput {
            publication: publication(PublicationFormat::Feed),
            social_account: social_account(),
            content: content(),
            media: vec![],
        };
        let result = driver.validate(&input);
        assert!(!result.is_ok());
    }

    #[test]
    fn validate_requires_two_items_for_carousel() {
        let driver = InstagramDriver::new(InstagramConfig {
            api_url: "https://graph.example.com".into(),
            media_wait: std::time::Duration::from_millis(1),
            video_wait: std::time::Duration::from_millis(1),
        });
        let input = PublishInput {
            publication: publication(PublicationFormat::Carousel),
            social_account: social_account(),
            content: content(),
            media: vec![image_media("a", 0)],
        };
        assert!(!driver.validate(&input).is_ok());

        let input_ok = PublishInput {
            media: vec![image_media("a", 0), video_media("b", 1)],
            ..input
        };
        assert!(driver.validate(&input_ok).is_ok());
    }

    #[test]
    fn caption_precedence_prefers_custom_caption() {
        let input = PublishInput {
            publication: publication(PublicationFormat::Feed),
            social_account: social_account(),
            content: content(),
            media: vec![image_media("a", 0)],
        };
        assert_eq!(input.caption(), "hello");

        let mut without_custom = input.clone();
        without_custom.publication.custom_caption = None;
        assert_eq!(without_custom.caption(), "default caption");
    }

    /// S1 (§8): happy-path Instagram FEED — container create, then
    /// publish, against a mocked Graph API.
    #[tokio::test]
    async fn publish_feed_creates_container_then_publishes() {
        let mut server = mockito::Server::new_async().await;
        let container_mock = server
            .mock("POST", "/ig-1/media")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"17895000000000000"}"#)
            .create_async()
            .await;
        let publish_mock = server
            .mock("POST", "/ig-1/media_publish")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"18000"}"#)
            .create_async()
            .await;

        let driver = InstagramDriver::new(InstagramConfig {
            api_url: server.url(),
            media_wait: std::time::Duration::from_millis(1),
            video_wait: std::time::Duration::from_millis(1),
        });

        let input = PublishInput {
            publication: publication(PublicationFormat::Feed),
            social_account: social_account(),
            content: content(),
            media: vec![image_media("a", 0)],
        };

        let outcome = driver.publish(&input).await.unwrap();
        assert_eq!(outcome.platform_id.as_deref(), Some("18000"));
        assert_eq!(outcome.link.as_deref(), Some("https://www.instagram.com/p/18000"));

        container_mock.assert_async().await;
        publish_mock.assert_async().await;
    }

    /// S2 (§8): Instagram CAROUSEL with three items — one child
    /// container per item, then a parent CAROUSEL container, then a
    /// single publish call, all against a mocked Graph API.
    #[tokio::test]
    async fn publish_carousel_creates_children_then_parent_then_publishes() {
        let mut server = mockito::Server::new_async().await;
        let container_mock = server
            .mock("POST", "/ig-1/media")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"container-id"}"#)
            .create_async()
            .await;
        let publish_mock = server
            .mock("POST", "/ig-1/media_publish")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"parent-published-id"}"#)
            .create_async()
            .await;

        let driver = InstagramDriver::new(InstagramConfig {
            api_url: server.url(),
            media_wait: std::time::Duration::from_millis(1),
            video_wait: std::time::Duration::from_millis(1),
        });

        let input = PublishInput {
            publication: publication(PublicationFormat::Carousel),
            social_account: social_account(),
            content: content(),
            media: vec![image_media("a", 0), video_media("b", 1), image_media("c", 2)],
        };

        let outcome = driver.publish(&input).await.unwrap();
        assert_eq!(outcome.platform_id.as_deref(), Some("parent-published-id"));
        assert_eq!(
            outcome.link.as_deref(),
            Some("https://www.instagram.com/p/parent-published-id")
        );

        container_mock.assert_async().await;
        publish_mock.assert_async().await;
    }
}
