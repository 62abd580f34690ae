use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use ygg_consensus::RaftNode;
use ygg_types::RegionId;

/// Registry of the consensus nodes this store hosts, one per region.
#[derive(Default)]
pub struct RaftNodeManager {
    nodes: RwLock<HashMap<RegionId, Arc<RaftNode>>>,
}

impl RaftNodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_exist(&self, region_id: RegionId) -> bool {
        self.nodes.read().contains_key(&region_id)
    }

    /// Returns `false` and leaves the registry untouched if the region
    /// already has a node.
    pub fn add_node(&self, node: Arc<RaftNode>) -> bool {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.region_id()) {
            return false;
        }
        nodes.insert(node.region_id(), node);
        true
    }

    pub fn get_node(&self, region_id: RegionId) -> Option<Arc<RaftNode>> {
        self.nodes.read().get(&region_id).cloned()
    }

    pub fn delete_node(&self, region_id: RegionId) -> Option<Arc<RaftNode>> {
        self.nodes.write().remove(&region_id)
    }

    pub fn region_ids(&self) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self.nodes.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn drain(&self) -> Vec<Arc<RaftNode>> {
        self.nodes.write().drain().map(|(_, node)| node).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use ygg_consensus::{LocalRouter, RaftOptions};
    use ygg_storage::{MemEngine, RawEngine};
    use ygg_types::{Range, Region, DATA_CF};

    use super::*;

    fn node(region_id: RegionId) -> Arc<RaftNode> {
        let engine: Arc<dyn RawEngine> = Arc::new(MemEngine::new(&[DATA_CF]));
        let region = Region::new(region_id, Vec::new(), Range::full());
        Arc::new(RaftNode::new(1, region, engine, Arc::new(LocalRouter::new()), RaftOptions::default()))
    }

    #[test]
    fn one_node_per_region() {
        let m = RaftNodeManager::new();
        assert!(m.add_node(node(3)));
        assert!(m.add_node(node(1)));
        assert!(!m.add_node(node(3)));
        assert_eq!(m.region_ids(), vec![1, 3]);

        assert!(m.delete_node(3).is_some());
        assert!(m.delete_node(3).is_none());
        assert!(!m.is_exist(3));
        assert_eq!(m.drain().len(), 1);
        assert!(m.is_empty());
    }
}
