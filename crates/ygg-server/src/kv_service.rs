use std::sync::Arc;
use std::time::Duration;

use ygg_engine::{RaftKvEngine, Storage};
use ygg_meta::StoreMetaManager;
use ygg_types::{Context, Region, YggError};

use crate::convert::{error_slot, to_context, ygg_to_error_info};
use crate::messages::{
    KvBatchGetRequest, KvBatchGetResponse, KvCompareAndSetRequest, KvCompareAndSetResponse,
    KvDeleteRangeRequest, KvDeleteRangeResponse, KvDeleteRequest, KvDeleteResponse, KvGetRequest,
    KvGetResponse, KvPutIfAbsentRequest, KvPutIfAbsentResponse, KvPutRequest, KvPutResponse,
    KvScanRequest, KvScanResponse, RequestContext,
};
use crate::validate::{validate_keys, validate_range, validate_region};

pub struct KvService {
    meta: Arc<StoreMetaManager>,
    storage: Storage<RaftKvEngine>,
    request_timeout: Duration,
}

impl KvService {
    pub fn new(
        engine: Arc<RaftKvEngine>,
        meta: Arc<StoreMetaManager>,
        request_timeout: Duration,
    ) -> Self {
        KvService { meta, storage: Storage::new(engine), request_timeout }
    }

    fn prepare(&self, ctx: &RequestContext) -> Result<(Arc<Region>, Context), YggError> {
        let region = validate_region(&self.meta, ctx.region_id)?;
        Ok((region, to_context(ctx, self.request_timeout)))
    }

    pub fn kv_get(&self, req: KvGetRequest) -> KvGetResponse {
        let result = self.prepare(&req.context).and_then(|(region, ctx)| {
            validate_keys(&region, [req.key.as_slice()])?;
            let mut kvs = self.storage.kv_get(&ctx, std::slice::from_ref(&req.key))?;
            Ok(kvs.pop().map(|kv| kv.value))
        });
        match result {
            Ok(value) => KvGetResponse { error: None, value },
            Err(e) => KvGetResponse { error: Some(ygg_to_error_info(&e)), value: None },
        }
    }

    pub fn kv_batch_get(&self, req: KvBatchGetRequest) -> KvBatchGetResponse {
        let result = self.prepare(&req.context).and_then(|(region, ctx)| {
            validate_keys(&region, req.keys.iter().map(Vec::as_slice))?;
            self.storage.kv_get(&ctx, &req.keys)
        });
        match result {
            Ok(kvs) => KvBatchGetResponse { error: None, kvs },
            Err(e) => KvBatchGetResponse { error: Some(ygg_to_error_info(&e)), kvs: Vec::new() },
        }
    }

    pub fn kv_scan(&self, req: KvScanRequest) -> KvScanResponse {
        let result = self.prepare(&req.context).and_then(|(region, ctx)| {
            let range = validate_range(&region, &req.range)?;
            self.storage.kv_scan(&ctx, &range)
        });
        match result {
            Ok(kvs) => KvScanResponse { error: None, kvs },
            Err(e) => KvScanResponse { error: Some(ygg_to_error_info(&e)), kvs: Vec::new() },
        }
    }

    pub async fn kv_put(&self, req: KvPutRequest) -> KvPutResponse {
        let result: Result<(), YggError> = async {
            let (region, ctx) = self.prepare(&req.context)?;
            validate_keys(&region, req.kvs.iter().map(|kv| kv.key.as_slice()))?;
            self.storage.kv_put(&ctx, req.kvs).await
        }
        .await;
        KvPutResponse { error: error_slot(&result) }
    }

    pub async fn kv_put_if_absent(&self, req: KvPutIfAbsentRequest) -> KvPutIfAbsentResponse {
        let result: Result<Vec<Vec<u8>>, YggError> = async {
            let (region, ctx) = self.prepare(&req.context)?;
            validate_keys(&region, req.kvs.iter().map(|kv| kv.key.as_slice()))?;
            self.storage.kv_put_if_absent(&ctx, req.kvs, req.atomic).await
        }
        .await;
        match result {
            Ok(put_keys) => KvPutIfAbsentResponse { error: None, put_keys },
            Err(e) => {
                KvPutIfAbsentResponse { error: Some(ygg_to_error_info(&e)), put_keys: Vec::new() }
            }
        }
    }

    pub async fn kv_delete(&self, req: KvDeleteRequest) -> KvDeleteResponse {
        let result: Result<(), YggError> = async {
            let (region, ctx) = self.prepare(&req.context)?;
            validate_keys(&region, req.keys.iter().map(Vec::as_slice))?;
            self.storage.kv_delete(&ctx, req.keys).await
        }
        .await;
        KvDeleteResponse { error: error_slot(&result) }
    }

    pub async fn kv_delete_range(&self, req: KvDeleteRangeRequest) -> KvDeleteRangeResponse {
        let result: Result<(), YggError> = async {
            let (region, ctx) = self.prepare(&req.context)?;
            let range = validate_range(&region, &req.range)?;
            self.storage.kv_delete_range(&ctx, range).await
        }
        .await;
        KvDeleteRangeResponse { error: error_slot(&result) }
    }

    pub async fn kv_compare_and_set(&self, req: KvCompareAndSetRequest) -> KvCompareAndSetResponse {
        let result: Result<bool, YggError> = async {
            let (region, ctx) = self.prepare(&req.context)?;
            validate_keys(&region, [req.kv.key.as_slice()])?;
            self.storage.kv_compare_and_set(&ctx, req.kv, req.expect_value).await
        }
        .await;
        match result {
            Ok(success) => KvCompareAndSetResponse { error: None, success },
            Err(e) => {
                KvCompareAndSetResponse { error: Some(ygg_to_error_info(&e)), success: false }
            }
        }
    }
}
