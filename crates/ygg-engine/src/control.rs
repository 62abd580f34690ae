use std::sync::Arc;

use ygg_meta::StoreMetaManager;
use ygg_types::{Context, Peer, Region, RegionId, YggError};

use crate::engine::RaftKvEngine;

/// Region lifecycle as seen by the store: the engine acts first and the
/// directory records the outcome only when the engine succeeded. A region
/// that could not be recorded is not left hosted.
pub struct StoreControl {
    engine: Arc<RaftKvEngine>,
    meta: Arc<StoreMetaManager>,
}

impl StoreControl {
    pub fn new(engine: Arc<RaftKvEngine>, meta: Arc<StoreMetaManager>) -> Self {
        StoreControl { engine, meta }
    }

    pub async fn add_region(&self, ctx: &Context, region: Region) -> Result<(), YggError> {
        let region_id = region.id;
        let newly_hosted = self.engine.get_node(region_id).is_none();
        self.engine.add_region(ctx, &region).await?;
        match self.meta.add_region(region) {
            Ok(true) => {}
            Ok(false) => tracing::debug!(region_id, "region already recorded"),
            Err(e) => {
                if newly_hosted {
                    if let Err(undo) = self.engine.destroy_region(ctx, region_id).await {
                        tracing::error!(region_id, error = %undo, "failed to undo region add");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Replaces the region's peers, then records them with the epoch bumped.
    pub async fn change_region(
        &self,
        ctx: &Context,
        region_id: RegionId,
        peers: Vec<Peer>,
    ) -> Result<Region, YggError> {
        let current = self.meta.get_region(region_id).ok_or(YggError::RegionNotFound(region_id))?;
        self.engine.change_region(ctx, region_id, peers.clone()).await?;
        let updated = current.with_peers(peers);
        self.meta.update_region(updated.clone())?;
        Ok(updated)
    }

    pub async fn destroy_region(&self, ctx: &Context, region_id: RegionId) -> Result<(), YggError> {
        self.engine.destroy_region(ctx, region_id).await?;
        self.meta.delete_region(region_id)?;
        Ok(())
    }
}
