use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use ygg_types::{KeyValue, YggError};

use crate::traits::RawEngine;
use crate::types::{WriteBatch, WriteOp};

fn fjall_err(e: fjall::Error) -> YggError {
    YggError::Storage(e.to_string())
}

fn bounds(start: &[u8], end: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let upper = if end.is_empty() { Bound::Unbounded } else { Bound::Excluded(end.to_vec()) };
    (Bound::Included(start.to_vec()), upper)
}

// ---------------------------------------------------------------------------
// FjallEngine: one fjall keyspace per partition
// ---------------------------------------------------------------------------

/// Persistent [`RawEngine`] backed by fjall.
///
/// Every partition is a keyspace of the same fjall `Database`, so a
/// [`WriteBatch`] spanning partitions commits atomically.
pub struct FjallEngine {
    db: fjall::Database,
    partitions: HashMap<String, fjall::Keyspace>,
}

impl FjallEngine {
    /// Open (or create) the database at `path` with the given partitions.
    pub fn open<S: AsRef<str>>(path: &Path, cfs: &[S]) -> Result<Arc<Self>, YggError> {
        let db = fjall::Database::builder(path).open().map_err(fjall_err)?;
        let mut partitions = HashMap::with_capacity(cfs.len());
        for cf in cfs {
            let cf = cf.as_ref();
            let ks = db.keyspace(cf, fjall::KeyspaceCreateOptions::default).map_err(fjall_err)?;
            partitions.insert(cf.to_string(), ks);
        }
        tracing::info!(path = %path.display(), partitions = cfs.len(), "fjall engine opened");
        Ok(Arc::new(FjallEngine { db, partitions }))
    }

    fn keyspace(&self, cf: &str) -> Result<&fjall::Keyspace, YggError> {
        self.partitions.get(cf).ok_or_else(|| YggError::InvalidPartition(cf.to_string()))
    }

    fn range_keys(
        ks: &fjall::Keyspace,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<Vec<u8>>, YggError> {
        ks.range::<Vec<u8>, _>(bounds(start, end))
            .map(|g| g.into_inner().map(|(k, _)| k.to_vec()).map_err(fjall_err))
            .collect()
    }
}

impl RawEngine for FjallEngine {
    fn name(&self) -> &'static str {
        "fjall"
    }

    fn partitions(&self) -> Vec<String> {
        let mut cfs: Vec<String> = self.partitions.keys().cloned().collect();
        cfs.sort();
        cfs
    }

    fn has_partition(&self, cf: &str) -> bool {
        self.partitions.contains_key(cf)
    }

    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, YggError> {
        let ks = self.keyspace(cf)?;
        Ok(ks.get(key).map_err(fjall_err)?.map(|v| v.to_vec()))
    }

    fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<(), YggError> {
        self.keyspace(cf)?.insert(key, value).map_err(fjall_err)
    }

    fn delete(&self, cf: &str, key: &[u8]) -> Result<(), YggError> {
        self.keyspace(cf)?.remove(key).map_err(fjall_err)
    }

    fn scan(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<Vec<KeyValue>, YggError> {
        let ks = self.keyspace(cf)?;
        ks.range::<Vec<u8>, _>(bounds(start, end))
            .map(|g| {
                g.into_inner()
                    .map(|(k, v)| KeyValue::new(k.to_vec(), v.to_vec()))
                    .map_err(fjall_err)
            })
            .collect()
    }

    fn count(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<u64, YggError> {
        let ks = self.keyspace(cf)?;
        let mut n = 0u64;
        for g in ks.range::<Vec<u8>, _>(bounds(start, end)) {
            g.into_inner().map_err(fjall_err)?;
            n += 1;
        }
        Ok(n)
    }

    fn delete_range(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<(), YggError> {
        let ks = self.keyspace(cf)?;
        let keys = Self::range_keys(ks, start, end)?;
        if keys.is_empty() {
            return Ok(());
        }
        let mut batch = self.db.batch();
        for k in keys {
            batch.remove(ks, k);
        }
        batch.commit().map_err(fjall_err)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), YggError> {
        // Fold the ops into a final per-key state first: fjall gives every
        // item of a batch the same seqno, so repeated keys must not appear twice.
        let mut overlay: BTreeMap<(String, Vec<u8>), Option<Vec<u8>>> = BTreeMap::new();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { cf, key, value } => {
                    self.keyspace(&cf)?;
                    overlay.insert((cf, key), Some(value));
                }
                WriteOp::Delete { cf, key } => {
                    self.keyspace(&cf)?;
                    overlay.insert((cf, key), None);
                }
                WriteOp::DeleteRange { cf, start, end } => {
                    let ks = self.keyspace(&cf)?;
                    for k in Self::range_keys(ks, &start, &end)? {
                        overlay.insert((cf.clone(), k), None);
                    }
                    for ((ocf, k), v) in overlay.iter_mut() {
                        let in_range = k.as_slice() >= start.as_slice()
                            && (end.is_empty() || k.as_slice() < end.as_slice());
                        if *ocf == cf && in_range {
                            *v = None;
                        }
                    }
                }
            }
        }
        if overlay.is_empty() {
            return Ok(());
        }

        let mut fb = self.db.batch();
        for ((cf, key), value) in overlay {
            let ks = self.keyspace(&cf)?;
            match value {
                Some(v) => fb.insert(ks, key, v),
                None => fb.remove(ks, key),
            }
        }
        fb.commit().map_err(fjall_err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
