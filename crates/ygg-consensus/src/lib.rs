pub mod completion;
pub mod log_store;
pub mod network;
pub mod node;
pub mod options;
pub mod peers;
pub mod state_machine;
pub mod status;
pub mod types;

pub use completion::{Completion, CompletionWaiter};
pub use log_store::RegionLogStore;
pub use network::{LocalRouter, RegionNetwork, RegionNetworkFactory};
pub use node::{NodeState, RaftNode};
pub use options::RaftOptions;
pub use peers::{format_peers, parse_peers};
pub use state_machine::RegionStateMachine;
pub use status::RegionStatus;
pub use types::{RaftCmd, TypeConfig, YggRaft};
