use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use openraft::error::{InstallSnapshotError, RPCError, RaftError, RemoteError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::BasicNode;
use parking_lot::RwLock;
use ygg_types::{NodeId, RegionId, YggError};

use crate::types::{TypeConfig, YggRaft};

/// Delivers consensus messages between region replicas living in one process.
///
/// Replicas register under `(region_id, store_id)`; a message to a replica
/// that is not registered fails as unreachable, like a down peer.
#[derive(Default)]
pub struct LocalRouter {
    nodes: RwLock<HashMap<(RegionId, NodeId), YggRaft>>,
}

impl LocalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, region_id: RegionId, node_id: NodeId, raft: YggRaft) {
        self.nodes.write().insert((region_id, node_id), raft);
    }

    pub fn unregister(&self, region_id: RegionId, node_id: NodeId) {
        self.nodes.write().remove(&(region_id, node_id));
    }

    pub fn get(&self, region_id: RegionId, node_id: NodeId) -> Option<YggRaft> {
        self.nodes.read().get(&(region_id, node_id)).cloned()
    }

    /// Stores with a registered replica of `region_id`, ascending.
    pub fn replicas(&self, region_id: RegionId) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> =
            self.nodes.read().keys().filter(|(r, _)| *r == region_id).map(|(_, n)| *n).collect();
        ids.sort_unstable();
        ids
    }
}

/// Hands out per-peer clients for one region.
pub struct RegionNetworkFactory {
    router: Arc<LocalRouter>,
    region_id: RegionId,
}

impl RegionNetworkFactory {
    pub fn new(router: Arc<LocalRouter>, region_id: RegionId) -> Self {
        RegionNetworkFactory { router, region_id }
    }
}

impl RaftNetworkFactory<TypeConfig> for RegionNetworkFactory {
    type Network = RegionNetwork;

    async fn new_client(&mut self, target: NodeId, _node: &BasicNode) -> Self::Network {
        RegionNetwork { router: self.router.clone(), region_id: self.region_id, target }
    }
}

pub struct RegionNetwork {
    router: Arc<LocalRouter>,
    region_id: RegionId,
    target: NodeId,
}

impl RegionNetwork {
    fn target_raft<E: Error>(&self) -> Result<YggRaft, RPCError<NodeId, BasicNode, E>> {
        self.router.get(self.region_id, self.target).ok_or_else(|| {
            let e = YggError::Consensus(format!(
                "replica of region {} on store {} is not reachable",
                self.region_id, self.target
            ));
            RPCError::Unreachable(Unreachable::new(&e))
        })
    }
}

impl RaftNetwork<TypeConfig> for RegionNetwork {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        let raft = self.target_raft()?;
        raft.append_entries(rpc)
            .await
            .map_err(|e| RPCError::RemoteError(RemoteError::new(self.target, e)))
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, BasicNode, RaftError<NodeId, InstallSnapshotError>>,
    > {
        let raft = self.target_raft()?;
        raft.install_snapshot(rpc)
            .await
            .map_err(|e| RPCError::RemoteError(RemoteError::new(self.target, e)))
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        let raft = self.target_raft()?;
        raft.vote(rpc).await.map_err(|e| RPCError::RemoteError(RemoteError::new(self.target, e)))
    }
}
