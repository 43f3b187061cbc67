//! Publisher contract and per-platform drivers (§4.3-§4.5).

pub mod facebook;
pub mod instagram;
pub mod registry;
pub mod tiktok;
pub mod x;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Content, Media, Publication, SocialAccount};

#[derive(Debug, Error, Clone)]
pub enum DriverError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("upstream platform error ({code}): {message}")]
    Upstream { code: String, message: String },

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("driver error: {0}")]
    Other(String),
}

/// Everything a driver needs, pre-loaded by the dispatcher. Drivers
/// must not re-fetch from the store (§4.3).
#[derive(Debug, Clone)]
pub struct PublishInput {
    pub publication: Publication,
    pub social_account: SocialAccount,
    pub content: Content,
    /// Ordered per the publication's `PublicationMedia.order`.
    pub media: Vec<Media>,
}

impl PublishInput {
    /// Caption precedence: `publication.customCaption ?? content.caption ?? ""`.
    pub fn caption(&self) -> String {
        self.publication
            .custom_caption
            .clone()
            .unwrap_or_else(|| self.content.caption.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishOutcome {
    pub platform_id: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Uniform contract invoked by the dispatcher; one implementation per
/// platform tag (§4.3).
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Pure: checks format-specific constraints without network I/O.
    fn validate(&self, input: &PublishInput) -> ValidationResult;

    async fn publish(&self, input: &PublishInput) -> Result<PublishOutcome, DriverError>;

    /// Best-effort revocation on platforms that support it. Default: unsupported.
    async fn cancel(&self, _platform_id: &str) -> Result<(), DriverError> {
        Err(DriverError::NotImplemented("cancel".to_string()))
    }
}
