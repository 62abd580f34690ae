use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use parking_lot::RwLock;
use ygg_types::{KeyValue, YggError};

use crate::traits::RawEngine;
use crate::types::{WriteBatch, WriteOp};

type Partition = BTreeMap<Vec<u8>, Vec<u8>>;

fn bounds<'a>(start: &'a [u8], end: &'a [u8]) -> (Bound<&'a [u8]>, Bound<&'a [u8]>) {
    let upper = if end.is_empty() { Bound::Unbounded } else { Bound::Excluded(end) };
    (Bound::Included(start), upper)
}

fn invalid(cf: &str) -> YggError {
    YggError::InvalidPartition(cf.to_string())
}

/// In-memory [`RawEngine`]: one `BTreeMap` per partition behind a single
/// `parking_lot::RwLock`, so a batch is applied under one write guard.
///
/// Intended for tests and ephemeral nodes; nothing survives a restart.
pub struct MemEngine {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl MemEngine {
    pub fn new<S: AsRef<str>>(cfs: &[S]) -> Self {
        let partitions = cfs.iter().map(|cf| (cf.as_ref().to_string(), Partition::new())).collect();
        MemEngine { partitions: RwLock::new(partitions) }
    }
}

fn remove_range(part: &mut Partition, start: &[u8], end: &[u8]) {
    let doomed: Vec<Vec<u8>> =
        part.range::<[u8], _>(bounds(start, end)).map(|(k, _)| k.clone()).collect();
    for k in doomed {
        part.remove(&k);
    }
}

impl RawEngine for MemEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn partitions(&self) -> Vec<String> {
        let mut cfs: Vec<String> = self.partitions.read().keys().cloned().collect();
        cfs.sort();
        cfs
    }

    fn has_partition(&self, cf: &str) -> bool {
        self.partitions.read().contains_key(cf)
    }

    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, YggError> {
        let g = self.partitions.read();
        let part = g.get(cf).ok_or_else(|| invalid(cf))?;
        Ok(part.get(key).cloned())
    }

    fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<(), YggError> {
        let mut g = self.partitions.write();
        let part = g.get_mut(cf).ok_or_else(|| invalid(cf))?;
        part.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, cf: &str, key: &[u8]) -> Result<(), YggError> {
        let mut g = self.partitions.write();
        let part = g.get_mut(cf).ok_or_else(|| invalid(cf))?;
        part.remove(key);
        Ok(())
    }

    fn scan(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<Vec<KeyValue>, YggError> {
        let g = self.partitions.read();
        let part = g.get(cf).ok_or_else(|| invalid(cf))?;
        Ok(part
            .range::<[u8], _>(bounds(start, end))
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect())
    }

    fn count(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<u64, YggError> {
        let g = self.partitions.read();
        let part = g.get(cf).ok_or_else(|| invalid(cf))?;
        Ok(part.range::<[u8], _>(bounds(start, end)).count() as u64)
    }

    fn delete_range(&self, cf: &str, start: &[u8], end: &[u8]) -> Result<(), YggError> {
        let mut g = self.partitions.write();
        let part = g.get_mut(cf).ok_or_else(|| invalid(cf))?;
        remove_range(part, start, end);
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), YggError> {
        let mut g = self.partitions.write();
        // Validate every partition first so a bad op leaves nothing half-applied.
        if let Some(op) = batch.ops().iter().find(|op| !g.contains_key(op.cf())) {
            return Err(invalid(op.cf()));
        }
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { cf, key, value } => {
                    if let Some(part) = g.get_mut(&cf) {
                        part.insert(key, value);
                    }
                }
                WriteOp::Delete { cf, key } => {
                    if let Some(part) = g.get_mut(&cf) {
                        part.remove(&key);
                    }
                }
                WriteOp::DeleteRange { cf, start, end } => {
                    if let Some(part) = g.get_mut(&cf) {
                        remove_range(part, &start, &end);
                    }
                }
            }
        }
        Ok(())
    }
}
