mod control;
mod engine;
mod manager;
mod storage;

pub use control::StoreControl;
pub use engine::{Engine, RaftKvEngine};
pub use manager::RaftNodeManager;
pub use storage::Storage;
