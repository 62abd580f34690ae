use std::time::Duration;

use crate::{RegionId, DATA_CF};

/// Per-request correlation: which region and partition a request targets and
/// how long the caller is willing to wait for commit.
#[derive(Debug, Clone)]
pub struct Context {
    region_id: RegionId,
    cf_name: String,
    timeout: Option<Duration>,
}

impl Default for Context {
    fn default() -> Self {
        Context { region_id: 0, cf_name: DATA_CF.to_string(), timeout: None }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region_id(mut self, region_id: RegionId) -> Self {
        self.region_id = region_id;
        self
    }

    pub fn with_cf_name(mut self, cf_name: impl Into<String>) -> Self {
        self.cf_name = cf_name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn region_id(&self) -> RegionId {
        self.region_id
    }

    pub fn cf_name(&self) -> &str {
        &self.cf_name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
