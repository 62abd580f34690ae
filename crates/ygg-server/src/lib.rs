mod convert;
mod kv_service;
pub mod messages;
mod region_service;
mod validate;

use std::sync::Arc;
use std::time::Duration;

use ygg_engine::RaftKvEngine;
use ygg_meta::StoreMetaManager;

pub use convert::ygg_to_error_info;
pub use kv_service::KvService;
pub use region_service::RegionService;

/// Everything a transport needs to answer store requests.
pub struct StoreServices {
    pub kv: KvService,
    pub region: RegionService,
}

impl StoreServices {
    pub fn new(
        engine: Arc<RaftKvEngine>,
        meta: Arc<StoreMetaManager>,
        request_timeout: Duration,
    ) -> Self {
        tracing::info!(store_id = meta.store_id(), "store services ready");
        StoreServices {
            kv: KvService::new(engine.clone(), meta.clone(), request_timeout),
            region: RegionService::new(engine, meta),
        }
    }
}
