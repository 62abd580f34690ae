use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use ygg_storage::codec::{decode, encode};
use ygg_types::{KeyValue, Region, RegionId, YggError};

/// Key prefix of every region record in the `meta` partition.
pub const REGION_PREFIX: &str = "META_REGION";

#[derive(Default)]
struct Inner {
    regions: BTreeMap<RegionId, Arc<Region>>,
    /// Regions modified since the last delta export.
    changed: BTreeSet<RegionId>,
}

/// In-memory directory of the regions this node hosts.
#[derive(Default)]
pub struct StoreRegionMeta {
    inner: RwLock<Inner>,
}

impl StoreRegionMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix() -> Vec<u8> {
        format!("{REGION_PREFIX}_").into_bytes()
    }

    pub fn is_exist(&self, region_id: RegionId) -> bool {
        self.inner.read().regions.contains_key(&region_id)
    }

    pub fn get_region(&self, region_id: RegionId) -> Option<Arc<Region>> {
        self.inner.read().regions.get(&region_id).cloned()
    }

    /// Point-in-time copy of the directory.
    pub fn get_all_region(&self) -> BTreeMap<RegionId, Arc<Region>> {
        self.inner.read().regions.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().regions.is_empty()
    }

    /// Inserts `region` unless its id is already present. Returns whether it
    /// was inserted.
    pub fn add_region(&self, region: Region) -> bool {
        let mut g = self.inner.write();
        if g.regions.contains_key(&region.id) {
            tracing::warn!(region_id = region.id, "region already exists");
            return false;
        }
        g.changed.insert(region.id);
        g.regions.insert(region.id, Arc::new(region));
        true
    }

    /// Replaces an existing region. The epoch may not go backwards.
    pub fn update_region(&self, region: Region) -> Result<(), YggError> {
        let mut g = self.inner.write();
        let current = g.regions.get(&region.id).ok_or(YggError::RegionNotFound(region.id))?;
        if region.epoch < current.epoch {
            return Err(YggError::InvalidArgument(format!(
                "region {} epoch {} is older than {}",
                region.id, region.epoch, current.epoch
            )));
        }
        g.changed.insert(region.id);
        g.regions.insert(region.id, Arc::new(region));
        Ok(())
    }

    pub fn delete_region(&self, region_id: RegionId) -> Option<Arc<Region>> {
        let mut g = self.inner.write();
        g.changed.remove(&region_id);
        g.regions.remove(&region_id)
    }

    pub fn gen_key(region_id: RegionId) -> Vec<u8> {
        format!("{REGION_PREFIX}_{region_id}").into_bytes()
    }

    /// Inverse of [`gen_key`](Self::gen_key). Malformed keys yield `None`.
    pub fn parse_region_id(key: &[u8]) -> Option<RegionId> {
        let rest = key.strip_prefix(Self::prefix().as_slice())?;
        let digits = std::str::from_utf8(rest).ok()?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn transform_to_kv(region: &Region) -> Result<KeyValue, YggError> {
        Ok(KeyValue { key: Self::gen_key(region.id), value: encode(region)? })
    }

    /// Records for regions changed since the previous call. Clears the
    /// changed set.
    pub fn transform_to_kv_with_delta(&self) -> Result<Vec<KeyValue>, YggError> {
        let mut g = self.inner.write();
        let kvs = g
            .changed
            .iter()
            .filter_map(|id| g.regions.get(id))
            .map(|r| Self::transform_to_kv(r))
            .collect::<Result<Vec<_>, _>>()?;
        g.changed.clear();
        Ok(kvs)
    }

    pub fn transform_to_kv_with_all(&self) -> Result<Vec<KeyValue>, YggError> {
        let g = self.inner.read();
        g.regions.values().map(|r| Self::transform_to_kv(r)).collect()
    }

    /// Bulk-loads persisted records, last write wins. Records with a
    /// malformed key or an undecodable value are skipped. Returns the number
    /// of regions loaded.
    pub fn recover(&self, kvs: Vec<KeyValue>) -> usize {
        let mut g = self.inner.write();
        let mut loaded = 0;
        for kv in kvs {
            let Some(region_id) = Self::parse_region_id(&kv.key) else {
                let key = String::from_utf8_lossy(&kv.key);
                tracing::error!(%key, "malformed region key, skipped");
                continue;
            };
            let region = match decode::<Region>(&kv.value) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(region_id, error = %e, "undecodable region record, skipped");
                    continue;
                }
            };
            if region.id != region_id {
                let record_id = region.id;
                tracing::error!(region_id, record_id, "region record id mismatch, skipped");
                continue;
            }
            g.regions.insert(region_id, Arc::new(region));
            loaded += 1;
        }
        loaded
    }
}
