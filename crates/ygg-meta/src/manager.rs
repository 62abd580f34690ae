use std::collections::BTreeMap;
use std::sync::Arc;

use ygg_storage::RawEngine;
use ygg_types::{Region, RegionId, StoreId, YggError};

use crate::region::StoreRegionMeta;
use crate::server::{StoreServerMeta, STORE_KEY};
use crate::store::MetaStore;

/// Keeps the region directory and node identity in step with their durable
/// records in the `meta` partition.
pub struct StoreMetaManager {
    meta_store: MetaStore,
    server_meta: StoreServerMeta,
    region_meta: StoreRegionMeta,
}

impl StoreMetaManager {
    pub fn new(engine: Arc<dyn RawEngine>, server_meta: StoreServerMeta) -> Result<Self, YggError> {
        Ok(StoreMetaManager {
            meta_store: MetaStore::new(engine)?,
            server_meta,
            region_meta: StoreRegionMeta::new(),
        })
    }

    /// Persists the node identity. A data directory already claimed by a
    /// different store id is refused.
    pub fn init(&self) -> Result<(), YggError> {
        if let Some(kv) = self.meta_store.get(STORE_KEY.as_bytes())? {
            let persisted = StoreServerMeta::transform_from_kv(&kv)?;
            if persisted.id != self.server_meta.id() {
                return Err(YggError::Internal(format!(
                    "data belongs to store {}, not {}",
                    persisted.id,
                    self.server_meta.id()
                )));
            }
            self.server_meta.set_epoch(persisted.epoch);
        }
        self.meta_store.put(&self.server_meta.transform_to_kv()?)?;
        tracing::info!(store = ?self.server_meta.get_store(), "store server meta initialized");
        Ok(())
    }

    /// Loads every persisted region record into the directory.
    pub fn recover(&self) -> Result<usize, YggError> {
        let kvs = self.meta_store.scan(&StoreRegionMeta::prefix())?;
        let loaded = self.region_meta.recover(kvs);
        // Recovered records are already durable.
        self.region_meta.transform_to_kv_with_delta()?;
        tracing::info!(regions = loaded, "region meta recovered");
        Ok(loaded)
    }

    pub fn store_id(&self) -> StoreId {
        self.server_meta.id()
    }

    pub fn server_meta(&self) -> &StoreServerMeta {
        &self.server_meta
    }

    pub fn region_meta(&self) -> &StoreRegionMeta {
        &self.region_meta
    }

    pub fn is_exist_region(&self, region_id: RegionId) -> bool {
        self.region_meta.is_exist(region_id)
    }

    pub fn get_region(&self, region_id: RegionId) -> Option<Arc<Region>> {
        self.region_meta.get_region(region_id)
    }

    pub fn get_all_region(&self) -> BTreeMap<RegionId, Arc<Region>> {
        self.region_meta.get_all_region()
    }

    /// Records `region` and persists it. Returns `false` (and writes nothing)
    /// when the id is already known. A failed write leaves the directory as
    /// it was.
    pub fn add_region(&self, region: Region) -> Result<bool, YggError> {
        let kv = StoreRegionMeta::transform_to_kv(&region)?;
        let region_id = region.id;
        if !self.region_meta.add_region(region) {
            return Ok(false);
        }
        if let Err(e) = self.meta_store.put(&kv) {
            self.region_meta.delete_region(region_id);
            return Err(e);
        }
        tracing::info!(region_id, "store meta added region");
        Ok(true)
    }

    pub fn update_region(&self, region: Region) -> Result<(), YggError> {
        let kv = StoreRegionMeta::transform_to_kv(&region)?;
        let (region_id, epoch) = (region.id, region.epoch);
        self.region_meta.update_region(region)?;
        self.meta_store.put(&kv)?;
        tracing::info!(region_id, epoch, "store meta updated region");
        Ok(())
    }

    pub fn delete_region(&self, region_id: RegionId) -> Result<Option<Arc<Region>>, YggError> {
        self.meta_store.delete(&StoreRegionMeta::gen_key(region_id))?;
        let removed = self.region_meta.delete_region(region_id);
        tracing::info!(region_id, existed = removed.is_some(), "store meta deleted region");
        Ok(removed)
    }

    /// Writes every directory change not yet persisted, in one batch.
    pub fn flush(&self) -> Result<usize, YggError> {
        let kvs = self.region_meta.transform_to_kv_with_delta()?;
        let n = kvs.len();
        self.meta_store.put_batch(kvs)?;
        Ok(n)
    }
}
