//! Facebook driver (§4.5): not yet implemented beyond validation.

use async_trait::async_trait;

use super::{DriverError, PublishInput, PublishOutcome, Publisher, ValidationResult};

pub struct FacebookDriver;

#[async_trait]
impl Publisher for FacebookDriver {
    fn validate(&self, input: &PublishInput) -> ValidationResult {
        let mut errors = Vec::new();
        if input.media.is_empty() && input.caption().is_empty() {
            errors.push("a post requires either a caption or media".to_string());
        }
        ValidationResult { errors }
    }

    async fn publish(&self, _input: &PublishInput) -> Result<PublishOutcome, DriverError> {
        Err(DriverError::NotImplemented("Facebook publishing is not yet implemented".to_string()))
    }
}
