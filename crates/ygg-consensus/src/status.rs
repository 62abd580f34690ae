use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use ygg_types::{NodeId, RegionId};

/// Observed consensus state of one region replica, shared between the node
/// wrapper, its metrics watcher and the state machine.
pub struct RegionStatus {
    region_id: RegionId,
    is_leader: AtomicBool,
    term: AtomicU64,
    leader_id: Mutex<Option<NodeId>>,
    last_error: Mutex<Option<String>>,
}

impl RegionStatus {
    pub fn new(region_id: RegionId) -> Self {
        RegionStatus {
            region_id,
            is_leader: AtomicBool::new(false),
            term: AtomicU64::new(0),
            leader_id: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    pub fn term(&self) -> u64 {
        self.term.load(Ordering::Acquire)
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        *self.leader_id.lock()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub(crate) fn observe(&self, term: u64, leader: Option<NodeId>) {
        self.term.store(term, Ordering::Release);
        *self.leader_id.lock() = leader;
    }

    pub fn on_leader_start(&self, term: u64) {
        self.is_leader.store(true, Ordering::Release);
        tracing::info!(region_id = self.region_id, term, "became leader");
    }

    pub fn on_leader_stop(&self) {
        self.is_leader.store(false, Ordering::Release);
        tracing::info!(region_id = self.region_id, "stepped down");
    }

    pub fn on_error(&self, error: &str) {
        tracing::error!(region_id = self.region_id, error, "region replica failed");
        *self.last_error.lock() = Some(error.to_string());
    }
}
