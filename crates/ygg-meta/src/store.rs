use std::sync::Arc;

use ygg_storage::keys::prefix_end;
use ygg_storage::{RawEngine, WriteBatch};
use ygg_types::{KeyValue, YggError, META_CF};

/// Durable record store over the `meta` partition.
#[derive(Clone)]
pub struct MetaStore {
    engine: Arc<dyn RawEngine>,
}

impl MetaStore {
    pub fn new(engine: Arc<dyn RawEngine>) -> Result<Self, YggError> {
        if !engine.has_partition(META_CF) {
            return Err(YggError::InvalidPartition(META_CF.to_string()));
        }
        Ok(MetaStore { engine })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<KeyValue>, YggError> {
        Ok(self.engine.get(META_CF, key)?.map(|value| KeyValue::new(key, value)))
    }

    /// Every record whose key starts with `prefix`, in key order.
    pub fn scan(&self, prefix: &[u8]) -> Result<Vec<KeyValue>, YggError> {
        let end = prefix_end(prefix).unwrap_or_default();
        self.engine.scan(META_CF, prefix, &end)
    }

    pub fn put(&self, kv: &KeyValue) -> Result<(), YggError> {
        self.engine.put(META_CF, &kv.key, &kv.value)
    }

    /// Writes all records in one atomic batch.
    pub fn put_batch(&self, kvs: Vec<KeyValue>) -> Result<(), YggError> {
        if kvs.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for kv in kvs {
            batch.put(META_CF, kv.key, kv.value);
        }
        self.engine.write(batch)
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), YggError> {
        self.engine.delete(META_CF, key)
    }
}

#[cfg(test)]
mod tests {
    use ygg_storage::MemEngine;

    use super::*;

    fn store() -> MetaStore {
        MetaStore::new(Arc::new(MemEngine::new(&[META_CF]))).unwrap()
    }

    #[test]
    fn scan_uses_incremented_prefix_bound() {
        let s = store();
        s.put_batch(vec![
            KeyValue::new("META_REGION_1", "a"),
            KeyValue::new("META_REGION_22", "b"),
            KeyValue::new("META_REGIONX", "no"),
            KeyValue::new("META_STORE", "no"),
        ])
        .unwrap();
        let found = s.scan(b"META_REGION_").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].key, b"META_REGION_22");
    }

    #[test]
    fn get_put_delete() {
        let s = store();
        assert_eq!(s.get(b"k").unwrap(), None);
        s.put(&KeyValue::new("k", "v")).unwrap();
        assert_eq!(s.get(b"k").unwrap(), Some(KeyValue::new("k", "v")));
        s.delete(b"k").unwrap();
        assert_eq!(s.get(b"k").unwrap(), None);
    }

    #[test]
    fn missing_meta_partition() {
        let engine: Arc<dyn RawEngine> = Arc::new(MemEngine::new(&["default"]));
        assert!(matches!(MetaStore::new(engine), Err(YggError::InvalidPartition(_))));
    }
}
