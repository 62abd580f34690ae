use parking_lot::RwLock;
use ygg_storage::codec::{decode, encode};
use ygg_types::{KeyValue, Location, Store, StoreId, StoreState, YggError};

/// Key of the node identity record in the `meta` partition.
pub const STORE_KEY: &str = "META_STORE";

/// Identity of this node. Built once from configuration; only state and
/// epoch change afterwards.
pub struct StoreServerMeta {
    store: RwLock<Store>,
}

impl StoreServerMeta {
    pub fn new(id: StoreId, server_location: Location, raft_location: Location) -> Self {
        StoreServerMeta {
            store: RwLock::new(Store {
                id,
                epoch: 0,
                state: StoreState::Normal,
                server_location,
                raft_location,
            }),
        }
    }

    pub fn id(&self) -> StoreId {
        self.store.read().id
    }

    pub fn get_store(&self) -> Store {
        self.store.read().clone()
    }

    pub fn epoch(&self) -> u64 {
        self.store.read().epoch
    }

    pub fn set_epoch(&self, epoch: u64) {
        self.store.write().epoch = epoch;
    }

    pub fn set_state(&self, state: StoreState) {
        self.store.write().state = state;
    }

    pub fn transform_to_kv(&self) -> Result<KeyValue, YggError> {
        Ok(KeyValue { key: STORE_KEY.as_bytes().to_vec(), value: encode(&*self.store.read())? })
    }

    pub fn transform_from_kv(kv: &KeyValue) -> Result<Store, YggError> {
        decode(&kv.value)
    }
}
