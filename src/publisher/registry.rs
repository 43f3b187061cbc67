//! Driver Registry (§4.3): maps a platform tag to its driver instance.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::Platform;

use super::Publisher;

pub struct DriverRegistry {
    drivers: HashMap<Platform, Arc<dyn Publisher>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    pub fn register(&mut self, platform: Platform, driver: Arc<dyn Publisher>) {
        self.drivers.insert(platform, driver);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn Publisher>, ApiError> {
        self.drivers
            .get(&platform)
            .cloned()
            .ok_or_else(|| ApiError::BadRequest(format!("no driver registered for {platform}")))
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
