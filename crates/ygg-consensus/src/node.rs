use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use openraft::error::{ChangeMembershipError, ClientWriteError, Fatal, InitializeError, RaftError};
use openraft::metrics::{RaftMetrics, WaitError};
use openraft::{BasicNode, Raft, ServerState};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use ygg_storage::RawEngine;
use ygg_types::{Context, NodeId, Peer, Region, RegionId, StoreId, WriteResponse, YggError};

use crate::completion::Completion;
use crate::log_store::RegionLogStore;
use crate::network::{LocalRouter, RegionNetworkFactory};
use crate::options::RaftOptions;
use crate::peers::format_peers;
use crate::state_machine::{wipe_region_data, RegionStateMachine};
use crate::status::RegionStatus;
use crate::types::{blocking, RaftCmd, YggRaft};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

fn client_write_err(e: RaftError<NodeId, ClientWriteError<NodeId, BasicNode>>) -> YggError {
    match e {
        RaftError::APIError(ClientWriteError::ForwardToLeader(f)) => {
            YggError::NotLeader { leader: f.leader_id }
        }
        RaftError::APIError(ClientWriteError::ChangeMembershipError(
            ChangeMembershipError::InProgress(_),
        )) => YggError::ConfChangeInProgress,
        RaftError::APIError(ClientWriteError::ChangeMembershipError(e)) => {
            YggError::Consensus(e.to_string())
        }
        RaftError::Fatal(Fatal::Stopped) => YggError::Shutdown,
        RaftError::Fatal(f) => YggError::Consensus(f.to_string()),
    }
}

/// One region replica: the openraft instance, its storage and the task that
/// mirrors its metrics into [`RegionStatus`].
pub struct RaftNode {
    store_id: StoreId,
    region: Region,
    engine: Arc<dyn RawEngine>,
    router: Arc<LocalRouter>,
    options: RaftOptions,
    state: Mutex<NodeState>,
    raft: RwLock<Option<YggRaft>>,
    status: Arc<RegionStatus>,
    conf_changing: Arc<AtomicBool>,
    proposals: Mutex<JoinSet<()>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl RaftNode {
    pub fn new(
        store_id: StoreId,
        region: Region,
        engine: Arc<dyn RawEngine>,
        router: Arc<LocalRouter>,
        options: RaftOptions,
    ) -> Self {
        let status = Arc::new(RegionStatus::new(region.id));
        RaftNode {
            store_id,
            region,
            engine,
            router,
            options,
            state: Mutex::new(NodeState::Uninitialized),
            raft: RwLock::new(None),
            status,
            conf_changing: Arc::new(AtomicBool::new(false)),
            proposals: Mutex::new(JoinSet::new()),
            watcher: Mutex::new(None),
        }
    }

    pub fn region_id(&self) -> RegionId {
        self.region.id
    }

    /// The descriptor the replica was started with.
    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    pub fn is_leader(&self) -> bool {
        self.status.is_leader()
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.status.leader_id()
    }

    pub fn term(&self) -> u64 {
        self.status.term()
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.last_error()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts the replica. When this store is among `peers` and the region
    /// has no consensus history here, the membership is initialized to `peers`;
    /// otherwise the replica waits to be contacted by a leader.
    pub async fn init(&self, peers: &[Peer]) -> Result<(), YggError> {
        {
            let mut state = self.state.lock();
            if *state != NodeState::Uninitialized {
                return Err(YggError::RaftInitFailed(format!(
                    "region {} replica is {:?}",
                    self.region.id, *state
                )));
            }
            *state = NodeState::Initializing;
        }

        match self.start(peers).await {
            Ok(()) => {
                *self.state.lock() = NodeState::Running;
                tracing::info!(
                    region_id = self.region.id,
                    store_id = self.store_id,
                    peers = %format_peers(peers),
                    "raft node started"
                );
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = NodeState::Stopped;
                tracing::error!(region_id = self.region.id, error = %e, "raft node init failed");
                Err(match e {
                    YggError::RaftInitFailed(_) => e,
                    other => YggError::RaftInitFailed(other.to_string()),
                })
            }
        }
    }

    async fn start(&self, peers: &[Peer]) -> Result<(), YggError> {
        let region_id = self.region.id;
        let config = Arc::new(self.options.to_config(region_id)?);
        let log_store = RegionLogStore::new(region_id, self.engine.clone());
        let probe = log_store.clone();
        let pristine = blocking(move || probe.is_pristine()).await?;
        let state_machine =
            RegionStateMachine::open(&self.region, self.engine.clone(), self.status.clone()).await?;
        let network = RegionNetworkFactory::new(self.router.clone(), region_id);

        let raft = Raft::new(self.store_id, config, network, log_store, state_machine)
            .await
            .map_err(|e| YggError::RaftInitFailed(e.to_string()))?;
        self.router.register(region_id, self.store_id, raft.clone());

        if pristine && peers.iter().any(|p| p.store_id == self.store_id) {
            let members: BTreeMap<NodeId, BasicNode> = peers
                .iter()
                .map(|p| (p.store_id, BasicNode::new(p.raft_location.to_string())))
                .collect();
            match raft.initialize(members).await {
                Ok(()) | Err(RaftError::APIError(InitializeError::NotAllowed(_))) => {}
                Err(e) => {
                    self.router.unregister(region_id, self.store_id);
                    let _ = raft.shutdown().await;
                    return Err(YggError::RaftInitFailed(e.to_string()));
                }
            }
        }

        *self.watcher.lock() = Some(spawn_watcher(raft.metrics(), self.status.clone()));
        *self.raft.write() = Some(raft);
        Ok(())
    }

    /// Stops accepting proposals and stops consensus. Proposals still in
    /// flight resolve with an error. Idempotent.
    pub async fn shutdown(&self) -> Result<(), YggError> {
        {
            let mut state = self.state.lock();
            match *state {
                NodeState::ShuttingDown | NodeState::Stopped => return Ok(()),
                NodeState::Uninitialized => {
                    *state = NodeState::Stopped;
                    return Ok(());
                }
                NodeState::Initializing => {
                    return Err(YggError::Internal(format!(
                        "region {} replica is still initializing",
                        self.region.id
                    )))
                }
                NodeState::Running => *state = NodeState::ShuttingDown,
            }
        }

        let raft = self.raft.write().take();
        self.router.unregister(self.region.id, self.store_id);
        let result = match raft {
            Some(raft) => raft.shutdown().await.map_err(|e| YggError::Consensus(e.to_string())),
            None => Ok(()),
        };
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
        if self.status.is_leader() {
            self.status.on_leader_stop();
        }
        *self.state.lock() = NodeState::Stopped;
        tracing::info!(region_id = self.region.id, store_id = self.store_id, "raft node stopped");
        result
    }

    /// Waits for every proposal task spawned by this node to finish.
    pub async fn join(&self) {
        let mut proposals = std::mem::take(&mut *self.proposals.lock());
        while proposals.join_next().await.is_some() {}
    }

    /// Removes the region's raft log, raft meta and data range from the
    /// engine. Only valid once stopped.
    pub async fn destroy(&self) -> Result<(), YggError> {
        if self.state() != NodeState::Stopped {
            return Err(YggError::Internal(format!(
                "region {} replica must be stopped before its data is destroyed",
                self.region.id
            )));
        }
        let log_store = RegionLogStore::new(self.region.id, self.engine.clone());
        let engine = self.engine.clone();
        let range = self.region.range.clone();
        blocking(move || {
            log_store.destroy()?;
            wipe_region_data(&*engine, &range)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Proposals
    // -----------------------------------------------------------------------

    fn running_raft(&self) -> Result<YggRaft, YggError> {
        match *self.state.lock() {
            NodeState::Running => {}
            NodeState::Uninitialized | NodeState::Initializing => {
                return Err(YggError::RaftNotNode(self.region.id))
            }
            NodeState::ShuttingDown | NodeState::Stopped => return Err(YggError::Shutdown),
        }
        self.raft.read().clone().ok_or(YggError::Shutdown)
    }

    /// Proposes `cmd` and returns immediately. `completion` fires once with
    /// the applied result or the reason the proposal failed.
    pub fn commit(&self, ctx: &Context, cmd: RaftCmd, completion: Completion<WriteResponse>) {
        let raft = match self.running_raft() {
            Ok(raft) => raft,
            Err(e) => {
                completion.complete(Err(e));
                return;
            }
        };
        let timeout = ctx.timeout().unwrap_or_else(|| self.options.write_timeout());
        let region_id = self.region.id;

        let mut proposals = self.proposals.lock();
        while proposals.try_join_next().is_some() {}
        proposals.spawn(async move {
            let result = match tokio::time::timeout(timeout, raft.client_write(cmd)).await {
                Ok(Ok(resp)) => Ok(resp.data),
                Ok(Err(e)) => Err(client_write_err(e)),
                Err(_) => Err(YggError::Timeout),
            };
            if let Err(e) = &result {
                tracing::debug!(region_id, error = %e, "proposal failed");
            }
            completion.complete(result);
        });
    }

    /// Replaces the voter set with `peers`, first adding unknown peers as
    /// learners. Only one change may be pending at a time.
    pub fn change_peers(&self, peers: Vec<Peer>, completion: Completion<()>) {
        let raft = match self.running_raft() {
            Ok(raft) => raft,
            Err(e) => {
                completion.complete(Err(e));
                return;
            }
        };
        if peers.is_empty() {
            completion.complete(Err(YggError::InvalidArgument("empty peer set".into())));
            return;
        }
        if self.conf_changing.swap(true, Ordering::AcqRel) {
            completion.complete(Err(YggError::ConfChangeInProgress));
            return;
        }

        let changing = self.conf_changing.clone();
        let (store_id, region_id) = (self.store_id, self.region.id);
        let timeout = self.options.write_timeout();
        self.proposals.lock().spawn(async move {
            let change = change_membership(&raft, store_id, &peers);
            let result = match tokio::time::timeout(timeout, change).await {
                Ok(r) => r,
                Err(_) => Err(YggError::Timeout),
            };
            changing.store(false, Ordering::Release);
            match &result {
                Ok(()) => tracing::info!(region_id, peers = %format_peers(&peers), "peers changed"),
                Err(e) => tracing::warn!(region_id, error = %e, "peer change failed"),
            }
            completion.complete(result);
        });
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Waits until some replica is known to lead the region.
    pub async fn wait_leader(&self, timeout: Duration) -> Result<NodeId, YggError> {
        let raft = self.running_raft()?;
        let metrics = raft
            .wait(Some(timeout))
            .metrics(|m| m.current_leader.is_some(), "leader elected")
            .await
            .map_err(wait_err)?;
        metrics.current_leader.ok_or(YggError::Timeout)
    }

    /// Waits until this replica applied at least `index`.
    pub async fn wait_applied(&self, index: u64, timeout: Duration) -> Result<(), YggError> {
        let raft = self.running_raft()?;
        raft.wait(Some(timeout))
            .metrics(
                |m| m.last_applied.map(|l| l.index).unwrap_or(0) >= index,
                "applied index reached",
            )
            .await
            .map_err(wait_err)?;
        Ok(())
    }

    pub fn metrics(&self) -> Option<RaftMetrics<NodeId, BasicNode>> {
        let raft = self.raft.read().clone()?;
        let metrics = raft.metrics().borrow().clone();
        Some(metrics)
    }

    /// Current voters according to this replica's view of the membership.
    pub fn voter_ids(&self) -> Vec<NodeId> {
        self.metrics()
            .map(|m| m.membership_config.membership().voter_ids().collect())
            .unwrap_or_default()
    }

    /// Asks openraft to build a snapshot now; returns once the request is queued.
    pub async fn trigger_snapshot(&self) -> Result<(), YggError> {
        let raft = self.running_raft()?;
        raft.trigger().snapshot().await.map_err(|e| YggError::Consensus(e.to_string()))
    }
}

fn wait_err(e: WaitError) -> YggError {
    match e {
        WaitError::ShuttingDown => YggError::Shutdown,
        _ => YggError::Timeout,
    }
}

async fn change_membership(
    raft: &YggRaft,
    store_id: StoreId,
    peers: &[Peer],
) -> Result<(), YggError> {
    let metrics = raft.metrics().borrow().clone();
    if metrics.current_leader != Some(store_id) {
        return Err(YggError::NotLeader { leader: metrics.current_leader });
    }
    let known: BTreeSet<NodeId> =
        metrics.membership_config.membership().nodes().map(|(id, _)| *id).collect();
    for peer in peers.iter().filter(|p| !known.contains(&p.store_id)) {
        raft.add_learner(peer.store_id, BasicNode::new(peer.raft_location.to_string()), false)
            .await
            .map_err(client_write_err)?;
    }
    let voters: BTreeSet<NodeId> = peers.iter().map(|p| p.store_id).collect();
    raft.change_membership(voters, false).await.map_err(client_write_err)?;
    Ok(())
}

/// Mirrors openraft metrics into the region status: leadership edges drive
/// `on_leader_start`/`on_leader_stop`, a fatal stop drives `on_error`.
fn spawn_watcher(
    mut rx: watch::Receiver<RaftMetrics<NodeId, BasicNode>>,
    status: Arc<RegionStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_leader = false;
        let mut failed = false;
        loop {
            let (term, leader, is_leader, failure) = {
                let m = rx.borrow_and_update();
                let failure = match &m.running_state {
                    Ok(()) | Err(Fatal::Stopped) => None,
                    Err(f) => Some(f.to_string()),
                };
                (m.current_term, m.current_leader, m.state == ServerState::Leader, failure)
            };
            status.observe(term, leader);
            if is_leader && !was_leader {
                status.on_leader_start(term);
            } else if !is_leader && was_leader {
                status.on_leader_stop();
            }
            was_leader = is_leader;
            if let Some(f) = failure {
                if !failed {
                    status.on_error(&f);
                    failed = true;
                }
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        if was_leader {
            status.on_leader_stop();
        }
    })
}
