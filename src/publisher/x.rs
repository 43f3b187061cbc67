//! X (Twitter) driver (§4.5): not yet implemented beyond validation.

use async_trait::async_trait;

use super::{DriverError, PublishInput, PublishOutcome, Publisher, ValidationResult};

const TEXT_MAX_LEN: usize = 280;
const MAX_MEDIA_ITEMS: usize = 4;

pub struct XDriver;

#[async_trait]
impl Publisher for XDriver {
    fn validate(&self, input: &PublishInput) -> ValidationResult {
        let mut errors = Vec::new();
        if input.caption().chars().count() > TEXT_MAX_LEN {
            errors.push(format!("text must be at most {TEXT_MAX_LEN} characters"));
        }
        if input.media.len() > MAX_MEDIA_ITEMS {
            errors.push(format!("at most {MAX_MEDIA_ITEMS} media items are allowed"));
        }
        ValidationResult { errors }
    }

    async fn publish(&self, _input: &PublishInput) -> Result<PublishOutcome, DriverError> {
        Err(DriverError::NotImplemented("X publishing is not yet implemented".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Content, Platform, Publication, PublicationFormat, PublicationStatus, SocialAccount};
    use chrono::Utc;

    fn input_with_caption(caption: &str, media_count: usize) -> PublishInput {
        PublishInput {
            publication: Publication {
                id: "p1".into(),
                content_id: "c1".into(),
                social_account_id: "sa1".into(),
                platform: Platform::X,
                format: PublicationFormat::Feed,
                publish_at: Utc::now(),
                status: PublicationStatus::Scheduled,
                error: None,
                custom_caption: Some(caption.to_string()),
                platform_config: None,
                platform_id: None,
                link: None,
                kanban_column_id: None,
                kanban_order: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            social_account: SocialAccount {
                id: "sa1".into(),
                user_id: "u1".into(),
                client_id: "cl1".into(),
                platform: Platform::X,
                platform_user_id: "x1".into(),
                username: "handle".into(),
                access_token: None,
                refresh_token: None,
                expires_at: None,
                is_active: true,
                disconnected_at: None,
            },
            content: Content {
                id: "c1".into(),
                user_id: "u1".into(),
                client_id: "cl1".into(),
                calendar_id: None,
                caption: String::new(),
                created_at: Utc::now(),
            },
            media: (0..media_count)
                .map(|i| crate::models::Media {
                    id: format!("m{i}"),
                    content_id: "c1".into(),
                    url: format!("https://cdn/{i}.jpg"),
                    key: format!("{i}"),
                    media_type: crate::models::MediaType::Image,
                    mime_type: "image/jpeg".into(),
                    size: 100,
                    width: None,
                    height: None,
                    duration: None,
                    thumbnail: None,
                    order: i as i32,
                    created_at: Utc::now(),
                })
                .collect(),
        }
    }

    #[test]
    fn rejects_text_over_280_chars() {
        let driver = XDriver;
        let input = input_with_caption(&"a".repeat(281), 0);
        assert!(!driver.validate(&input).is_ok());
    }

    #[test]
    fn rejects_more_than_four_media_items() {
        let driver = XDriver;
        let input = input_with_caption("hello", 5);
        assert!(!driver.validate(&input).is_ok());
    }

    #[test]
    fn accepts_within_limits() {
        let driver = XDriver;
        let input = input_with_caption("hello", 2);
        assert!(driver.validate(&input).is_ok());
    }
}
