use std::sync::Arc;

use ygg_types::{KeyValue, YggError};

use crate::traits::RawEngine;

/// Read-only view of one partition. Reads bypass consensus and see whatever
/// has been applied locally.
#[derive(Clone)]
pub struct Reader {
    engine: Arc<dyn RawEngine>,
    cf: String,
}

impl Reader {
    pub fn new(engine: Arc<dyn RawEngine>, cf: impl Into<String>) -> Result<Self, YggError> {
        let cf = cf.into();
        if !engine.has_partition(&cf) {
            return Err(YggError::InvalidPartition(cf));
        }
        Ok(Reader { engine, cf })
    }

    pub fn cf(&self) -> &str {
        &self.cf
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, YggError> {
        self.engine.get(&self.cf, key)
    }

    pub fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<KeyValue>, YggError> {
        self.engine.scan(&self.cf, start, end)
    }

    pub fn count(&self, start: &[u8], end: &[u8]) -> Result<u64, YggError> {
        self.engine.count(&self.cf, start, end)
    }
}
