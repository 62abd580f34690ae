use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ygg_consensus::{Completion, LocalRouter, RaftCmd, RaftNode, RaftOptions};
use ygg_meta::StoreMetaManager;
use ygg_storage::{RawEngine, Reader};
use ygg_types::{
    is_reserved_cf, Context, KeyValue, NodeId, Peer, Region, RegionId, StoreId, WriteData,
    WriteResponse, YggError,
};

use crate::manager::RaftNodeManager;

// ---------------------------------------------------------------------------
// Engine trait
// Uses RPITIT; the explicit `+ Send` lets generic callers await across
// threads.
// ---------------------------------------------------------------------------

pub trait Engine: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Commits `data` to the region named by `ctx` and waits for the applied
    /// result.
    fn write(
        &self,
        ctx: &Context,
        data: WriteData,
    ) -> impl Future<Output = Result<WriteResponse, YggError>> + Send;

    /// Like [`Engine::write`] but returns at once; `completion` fires with the
    /// outcome.
    fn async_write(&self, ctx: &Context, data: WriteData, completion: Completion<WriteResponse>);

    fn new_reader(&self, cf: &str) -> Result<Reader, YggError>;
}

// ---------------------------------------------------------------------------
// RaftKvEngine
// ---------------------------------------------------------------------------

/// Hosts one consensus node per region on top of a shared raw engine.
/// Writes are replicated through the region's node; reads go straight to the
/// raw engine and see what has been applied locally.
pub struct RaftKvEngine {
    engine: Arc<dyn RawEngine>,
    meta: Arc<StoreMetaManager>,
    router: Arc<LocalRouter>,
    options: RaftOptions,
    nodes: RaftNodeManager,
    /// Serializes node start and teardown so a region id never has two
    /// replicas registered with the router.
    lifecycle: tokio::sync::Mutex<()>,
}

impl RaftKvEngine {
    pub fn new(
        engine: Arc<dyn RawEngine>,
        meta: Arc<StoreMetaManager>,
        router: Arc<LocalRouter>,
        options: RaftOptions,
    ) -> Self {
        RaftKvEngine {
            engine,
            meta,
            router,
            options,
            nodes: RaftNodeManager::new(),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store_id(&self) -> StoreId {
        self.meta.store_id()
    }

    pub fn raw_engine(&self) -> &Arc<dyn RawEngine> {
        &self.engine
    }

    pub fn get_node(&self, region_id: RegionId) -> Option<Arc<RaftNode>> {
        self.nodes.get_node(region_id)
    }

    fn node(&self, region_id: RegionId) -> Result<Arc<RaftNode>, YggError> {
        self.nodes.get_node(region_id).ok_or(YggError::RaftNotNode(region_id))
    }

    async fn start_node(&self, region: &Region) -> Result<Arc<RaftNode>, YggError> {
        let node = Arc::new(RaftNode::new(
            self.store_id(),
            region.clone(),
            self.engine.clone(),
            self.router.clone(),
            self.options.clone(),
        ));
        node.init(&region.peers).await?;
        Ok(node)
    }

    // -----------------------------------------------------------------------
    // Region lifecycle
    // -----------------------------------------------------------------------

    /// Starts a node for every region in the directory. Regions whose node
    /// fails to start are logged and left out.
    pub async fn recover(&self) -> usize {
        let _guard = self.lifecycle.lock().await;
        let mut recovered = 0;
        for region in self.meta.get_all_region().into_values() {
            if self.nodes.is_exist(region.id) {
                continue;
            }
            match self.start_node(&region).await {
                Ok(node) => {
                    self.nodes.add_node(node);
                    recovered += 1;
                }
                Err(e) => {
                    tracing::error!(region_id = region.id, error = %e, "region recovery failed")
                }
            }
        }
        tracing::info!(store_id = self.store_id(), regions = recovered, "raft kv engine recovered");
        recovered
    }

    /// Starts hosting `region`. A region already hosted is left as is.
    pub async fn add_region(&self, _ctx: &Context, region: &Region) -> Result<(), YggError> {
        let _guard = self.lifecycle.lock().await;
        if self.nodes.is_exist(region.id) {
            tracing::debug!(region_id = region.id, "region already hosted");
            return Ok(());
        }
        let node = self.start_node(region).await?;
        self.nodes.add_node(node);
        tracing::info!(region_id = region.id, epoch = region.epoch, "region added");
        Ok(())
    }

    /// Replaces the region's voter set and waits until the change committed.
    pub async fn change_region(
        &self,
        _ctx: &Context,
        region_id: RegionId,
        peers: Vec<Peer>,
    ) -> Result<(), YggError> {
        let node = self.node(region_id)?;
        let (completion, waiter) = Completion::channel();
        node.change_peers(peers, completion);
        waiter.wait().await
    }

    /// Stops the region's node and removes its log, raft state and data range.
    /// When the wipe fails the stopped node stays registered, so the destroy
    /// can be retried.
    pub async fn destroy_region(
        &self,
        _ctx: &Context,
        region_id: RegionId,
    ) -> Result<(), YggError> {
        let _guard = self.lifecycle.lock().await;
        let node = self.node(region_id)?;
        if let Err(e) = node.shutdown().await {
            tracing::warn!(region_id, error = %e, "raft node shutdown reported an error");
        }
        node.join().await;
        node.destroy().await?;
        self.nodes.delete_node(region_id);
        tracing::info!(region_id, "region destroyed");
        Ok(())
    }

    /// Stops every hosted node. Data stays in place for the next recovery.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        for node in self.nodes.drain() {
            if let Err(e) = node.shutdown().await {
                let region_id = node.region_id();
                tracing::warn!(region_id, error = %e, "raft node shutdown failed");
            }
            node.join().await;
        }
        tracing::info!(store_id = self.store_id(), "raft kv engine stopped");
    }

    // -----------------------------------------------------------------------
    // Leadership
    // -----------------------------------------------------------------------

    pub fn region_ids(&self) -> Vec<RegionId> {
        self.nodes.region_ids()
    }

    pub fn is_leader(&self, region_id: RegionId) -> bool {
        self.nodes.get_node(region_id).is_some_and(|n| n.is_leader())
    }

    pub fn leader_id(&self, region_id: RegionId) -> Option<NodeId> {
        self.nodes.get_node(region_id).and_then(|n| n.leader_id())
    }

    pub async fn wait_leader(
        &self,
        region_id: RegionId,
        timeout: Duration,
    ) -> Result<NodeId, YggError> {
        self.node(region_id)?.wait_leader(timeout).await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn kv_get(&self, ctx: &Context, key: &[u8]) -> Result<Option<Vec<u8>>, YggError> {
        self.new_reader(ctx.cf_name())?.get(key)
    }

    /// Values of the keys that exist, in request order.
    pub fn kv_batch_get(&self, ctx: &Context, keys: &[Vec<u8>]) -> Result<Vec<KeyValue>, YggError> {
        let reader = self.new_reader(ctx.cf_name())?;
        let mut kvs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = reader.get(key)? {
                kvs.push(KeyValue::new(key.clone(), value));
            }
        }
        Ok(kvs)
    }

    pub fn kv_scan(
        &self,
        ctx: &Context,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<KeyValue>, YggError> {
        self.new_reader(ctx.cf_name())?.scan(start, end)
    }

    pub fn kv_count(&self, ctx: &Context, start: &[u8], end: &[u8]) -> Result<u64, YggError> {
        self.new_reader(ctx.cf_name())?.count(start, end)
    }

    /// Rejects a write that would fail while being applied: partitions must
    /// exist and must not be reserved.
    fn check_partitions(&self, data: &WriteData) -> Result<(), YggError> {
        for m in data.mutations() {
            let cf = m.cf();
            if is_reserved_cf(cf) || !self.engine.has_partition(cf) {
                return Err(YggError::InvalidPartition(cf.to_string()));
            }
        }
        Ok(())
    }

    /// Every key a write touches must belong to the region hosted by `node`.
    fn check_range(node: &RaftNode, data: &WriteData) -> Result<(), YggError> {
        let region = node.region();
        if data.mutations().iter().all(|m| m.within(&region.range)) {
            Ok(())
        } else {
            Err(YggError::KeyOutOfRange { region_id: region.id })
        }
    }
}

impl Engine for RaftKvEngine {
    fn name(&self) -> &str {
        "raft_kv"
    }

    async fn write(&self, ctx: &Context, data: WriteData) -> Result<WriteResponse, YggError> {
        let (completion, waiter) = Completion::channel();
        self.async_write(ctx, data, completion);
        waiter.wait().await
    }

    fn async_write(&self, ctx: &Context, data: WriteData, completion: Completion<WriteResponse>) {
        let region_id = ctx.region_id();
        let checked = data
            .validate()
            .and_then(|()| self.check_partitions(&data))
            .and_then(|()| self.node(region_id))
            .and_then(|node| Self::check_range(&node, &data).map(|()| node));
        let node = match checked {
            Ok(node) => node,
            Err(e) => {
                completion.complete(Err(e));
                return;
            }
        };
        let cmd = RaftCmd { region_id, mutations: data.into_mutations() };
        node.commit(ctx, cmd, completion);
    }

    fn new_reader(&self, cf: &str) -> Result<Reader, YggError> {
        if is_reserved_cf(cf) {
            return Err(YggError::InvalidPartition(cf.to_string()));
        }
        Reader::new(self.engine.clone(), cf)
    }
}
