use ygg_types::{KeyValue, YggError};

use crate::types::WriteBatch;

/// A partitioned, ordered byte key-value engine.
///
/// The trait is object-safe: the node picks a backend at construction and
/// shares it as `Arc<dyn RawEngine>` between the metadata store, every
/// region's raft log and state machine, and readers. Calls block; async
/// callers move them onto `tokio::task::spawn_blocking`.
///
/// Any operation naming a partition the engine was not opened with fails with
/// [`YggError::InvalidPartition`].
pub trait RawEngine: Send + Sync + 'static {
    /// Backend name, for logs.
    fn name(&self) -> &'static str;

    fn partitions(&self) -> Vec<String>;

    fn has_partition(&self, cf: &str) -> bool {
        self.partitions().iter().any(|p| p == cf)
    }

    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, YggError>;

    fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<(), YggError>;

    fn delete(&self, cf: &str, key: &[u8]) -> Result<(), YggError>;

    /// Ordered pairs in `[start, end)`. An empty `end` is unbounded.
    fn scan(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<Vec<KeyValue>, YggError>;

    /// Ordered pairs whose key starts with `prefix`.
    fn scan_prefix(&self, cf: &str, prefix: &[u8]) -> Result<Vec<KeyValue>, YggError> {
        let end = crate::keys::prefix_end(prefix).unwrap_or_default();
        self.scan(cf, prefix, &end)
    }

    /// Number of keys in `[start, end)`. An empty `end` is unbounded.
    fn count(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<u64, YggError>;

    /// Removes every key in `[start, end)`. An empty `end` is unbounded.
    fn delete_range(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<(), YggError>;

    /// Applies every operation of `batch` atomically, in order.
    fn write(&self, batch: WriteBatch) -> Result<(), YggError>;
}
