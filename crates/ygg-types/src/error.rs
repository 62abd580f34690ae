use crate::{NodeId, RegionId};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum YggError {
    #[error("region {0} not found")]
    RegionNotFound(RegionId),
    #[error("key is empty")]
    KeyEmpty,
    #[error("key is outside the range of region {region_id}")]
    KeyOutOfRange { region_id: RegionId },
    #[error("not the leader; leader: {leader:?}")]
    NotLeader { leader: Option<NodeId> },
    #[error("raft init failed: {0}")]
    RaftInitFailed(String),
    #[error("no raft node for region {0}")]
    RaftNotNode(RegionId),
    #[error("a membership change is already in progress")]
    ConfChangeInProgress,
    #[error("invalid partition: {0}")]
    InvalidPartition(String),
    #[error("operation timed out")]
    Timeout,
    #[error("raft node is shut down")]
    Shutdown,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("consensus error: {0}")]
    Consensus(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error category carried on every response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Errno {
    Internal,
    IllegalParameters,
    RegionNotFound,
    KeyEmpty,
    KeyOutOfRange,
    NotLeader,
    RaftInitFailed,
    RaftNotNode,
    ConfChangeInProgress,
    InvalidPartition,
    RequestTimeout,
}

impl YggError {
    pub fn errno(&self) -> Errno {
        match self {
            YggError::RegionNotFound(_) => Errno::RegionNotFound,
            YggError::KeyEmpty => Errno::KeyEmpty,
            YggError::KeyOutOfRange { .. } => Errno::KeyOutOfRange,
            YggError::NotLeader { .. } => Errno::NotLeader,
            YggError::RaftInitFailed(_) => Errno::RaftInitFailed,
            YggError::RaftNotNode(_) => Errno::RaftNotNode,
            YggError::ConfChangeInProgress => Errno::ConfChangeInProgress,
            YggError::InvalidPartition(_) => Errno::InvalidPartition,
            YggError::Timeout => Errno::RequestTimeout,
            YggError::InvalidArgument(_) => Errno::IllegalParameters,
            YggError::Shutdown
            | YggError::Storage(_)
            | YggError::Consensus(_)
            | YggError::Internal(_) => Errno::Internal,
        }
    }

    /// Validation failures are detected before anything is proposed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            YggError::RegionNotFound(_)
                | YggError::KeyEmpty
                | YggError::KeyOutOfRange { .. }
                | YggError::InvalidPartition(_)
                | YggError::InvalidArgument(_)
        )
    }

    /// Caller may retry, possibly against the current leader.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            YggError::NotLeader { .. } | YggError::ConfChangeInProgress | YggError::Timeout
        )
    }
}
