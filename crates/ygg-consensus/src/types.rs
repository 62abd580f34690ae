use std::io::Cursor;

use openraft::{AnyError, BasicNode, StorageError, StorageIOError};
use ygg_types::{Mutation, NodeId, RegionId, WriteResponse, YggError};

/// The log entry payload: every mutation of one write, addressed to one region.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RaftCmd {
    pub region_id: RegionId,
    pub mutations: Vec<Mutation>,
}

openraft::declare_raft_types!(
    pub TypeConfig:
        D = RaftCmd,
        R = WriteResponse,
        NodeId = NodeId,
        Node = BasicNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = openraft::TokioRuntime,
);

pub type YggRaft = openraft::Raft<TypeConfig>;

pub(crate) type StoResult<T> = Result<T, StorageError<NodeId>>;

// ---------------------------------------------------------------------------
// YggError -> openraft StorageError
// ---------------------------------------------------------------------------

pub(crate) fn read_logs_err(e: &YggError) -> StorageError<NodeId> {
    StorageError::from(StorageIOError::read_logs(AnyError::new(e)))
}

pub(crate) fn write_logs_err(e: &YggError) -> StorageError<NodeId> {
    StorageError::from(StorageIOError::write_logs(AnyError::new(e)))
}

pub(crate) fn read_vote_err(e: &YggError) -> StorageError<NodeId> {
    StorageError::from(StorageIOError::read_vote(AnyError::new(e)))
}

pub(crate) fn write_vote_err(e: &YggError) -> StorageError<NodeId> {
    StorageError::from(StorageIOError::write_vote(AnyError::new(e)))
}

pub(crate) fn read_sm_err(e: &YggError) -> StorageError<NodeId> {
    StorageError::from(StorageIOError::read_state_machine(AnyError::new(e)))
}

pub(crate) fn write_sm_err(e: &YggError) -> StorageError<NodeId> {
    StorageError::from(StorageIOError::write_state_machine(AnyError::new(e)))
}

/// openraft records are stored as JSON; user payloads inside them are plain serde.
pub(crate) fn to_json<T: serde::Serialize>(val: &T) -> Result<Vec<u8>, YggError> {
    serde_json::to_vec(val).map_err(|e| YggError::Storage(e.to_string()))
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, YggError> {
    serde_json::from_slice(bytes).map_err(|e| YggError::Storage(e.to_string()))
}

/// Runs blocking engine I/O off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, YggError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, YggError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| YggError::Storage(e.to_string()))?
}
