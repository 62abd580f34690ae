use std::sync::Arc;

use ygg_engine::{RaftKvEngine, StoreControl};
use ygg_meta::StoreMetaManager;
use ygg_types::{Context, YggError};

use crate::convert::{error_slot, ygg_to_error_info};
use crate::messages::{
    AddRegionRequest, AddRegionResponse, ChangeRegionRequest, ChangeRegionResponse,
    DestroyRegionRequest, DestroyRegionResponse, RegionStatusRequest, RegionStatusResponse,
};
use crate::validate::{validate_new_region, validate_region};

pub struct RegionService {
    control: StoreControl,
    engine: Arc<RaftKvEngine>,
    meta: Arc<StoreMetaManager>,
}

impl RegionService {
    pub fn new(engine: Arc<RaftKvEngine>, meta: Arc<StoreMetaManager>) -> Self {
        RegionService { control: StoreControl::new(engine.clone(), meta.clone()), engine, meta }
    }

    pub async fn add_region(&self, req: AddRegionRequest) -> AddRegionResponse {
        let region_id = req.region.id;
        let ctx = Context::new().with_region_id(region_id);
        let result = match validate_new_region(&req.region) {
            Ok(()) => self.control.add_region(&ctx, req.region).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::warn!(region_id, error = %e, "add region failed");
        }
        AddRegionResponse { error: error_slot(&result) }
    }

    pub async fn change_region(&self, req: ChangeRegionRequest) -> ChangeRegionResponse {
        let ctx = Context::new().with_region_id(req.region_id);
        let result = if req.peers.is_empty() {
            Err(YggError::InvalidArgument("peer set must not be empty".into()))
        } else {
            self.control.change_region(&ctx, req.region_id, req.peers).await
        };
        match result {
            Ok(region) => ChangeRegionResponse { error: None, region: Some(region) },
            Err(e) => {
                tracing::warn!(region_id = req.region_id, error = %e, "change region failed");
                ChangeRegionResponse { error: Some(ygg_to_error_info(&e)), region: None }
            }
        }
    }

    pub async fn destroy_region(&self, req: DestroyRegionRequest) -> DestroyRegionResponse {
        let ctx = Context::new().with_region_id(req.region_id);
        let result = self.control.destroy_region(&ctx, req.region_id).await;
        DestroyRegionResponse { error: error_slot(&result) }
    }

    pub fn region_status(&self, req: RegionStatusRequest) -> RegionStatusResponse {
        let region = match validate_region(&self.meta, req.region_id) {
            Ok(region) => region,
            Err(e) => {
                return RegionStatusResponse {
                    error: Some(ygg_to_error_info(&e)),
                    ..Default::default()
                }
            }
        };
        let mut resp =
            RegionStatusResponse { region: Some((*region).clone()), ..Default::default() };
        match self.engine.get_node(req.region_id) {
            Some(node) => {
                resp.is_leader = node.is_leader();
                resp.leader_id = node.leader_id();
                resp.term = node.term();
                resp.last_error = node.last_error();
            }
            None => resp.error = Some(ygg_to_error_info(&YggError::RaftNotNode(req.region_id))),
        }
        resp
    }
}
