mod context;
mod error;
mod region;
mod write;

pub use context::Context;
pub use error::{Errno, YggError};
pub use region::{KeyValue, Location, Peer, Range, Region, RegionState, Store, StoreState};
pub use write::{Mutation, MutationResult, WriteData, WriteResponse};

pub type RegionId = u64;
pub type StoreId = u64;
/// Raft node ids are store ids: a store hosts at most one replica per region.
pub type NodeId = StoreId;

/// Partition holding user data unless a request names another one.
pub const DATA_CF: &str = "default";
/// Partition reserved for region and store descriptors.
pub const META_CF: &str = "meta";
/// Partition holding every region's raft log, keyed `region(8) ++ index(8)`.
pub const RAFT_LOG_CF: &str = "raft_log";
/// Partition holding per-region raft state (vote, purge point, applied state).
pub const RAFT_META_CF: &str = "raft_meta";

/// Partitions the node owns for its own bookkeeping; never exposed to clients.
pub const RESERVED_CFS: [&str; 3] = [META_CF, RAFT_LOG_CF, RAFT_META_CF];

pub fn is_reserved_cf(cf: &str) -> bool {
    RESERVED_CFS.contains(&cf)
}
