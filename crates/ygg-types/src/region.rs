use std::fmt;

use crate::{RegionId, StoreId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Location {
    pub host: String,
    pub port: u16,
}

impl Location {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Location { host: host.into(), port }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One replica of a region.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Peer {
    pub store_id: StoreId,
    /// Client-facing endpoint of the hosting store.
    pub server_location: Location,
    /// Consensus-facing endpoint of the hosting store.
    pub raft_location: Location,
}

impl Peer {
    pub fn new(store_id: StoreId, server_location: Location, raft_location: Location) -> Self {
        Peer { store_id, server_location, raft_location }
    }
}

/// Half-open key range `[start_key, end_key)`. An empty `end_key` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Range {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
}

impl Range {
    pub fn new(start_key: impl Into<Vec<u8>>, end_key: impl Into<Vec<u8>>) -> Self {
        Range { start_key: start_key.into(), end_key: end_key.into() }
    }

    /// The whole key space.
    pub fn full() -> Self {
        Range::default()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice()
            && (self.end_key.is_empty() || key < self.end_key.as_slice())
    }

    /// True when `[start, end)` lies inside this range. An empty `end` means unbounded.
    pub fn covers(&self, start: &[u8], end: &[u8]) -> bool {
        if start < self.start_key.as_slice() {
            return false;
        }
        if self.end_key.is_empty() {
            return true;
        }
        !end.is_empty() && end <= self.end_key.as_slice()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RegionState {
    New,
    Normal,
    Splitting,
    Merging,
    Deleting,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub id: RegionId,
    /// Bumped on every peer-set or range change; never decreases.
    pub epoch: u64,
    pub state: RegionState,
    pub peers: Vec<Peer>,
    pub range: Range,
}

impl Region {
    pub fn new(id: RegionId, peers: Vec<Peer>, range: Range) -> Self {
        Region { id, epoch: 1, state: RegionState::Normal, peers, range }
    }

    pub fn peer_store_ids(&self) -> Vec<StoreId> {
        self.peers.iter().map(|p| p.store_id).collect()
    }

    pub fn has_peer(&self, store_id: StoreId) -> bool {
        self.peers.iter().any(|p| p.store_id == store_id)
    }

    /// Copy of this region with a new peer set and the epoch bumped.
    pub fn with_peers(&self, peers: Vec<Peer>) -> Self {
        Region { peers, epoch: self.epoch + 1, ..self.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StoreState {
    Normal,
    Offline,
}

/// Identity of this node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub epoch: u64,
    pub state: StoreState,
    pub server_location: Location,
    pub raft_location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        KeyValue { key: key.into(), value: value.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_contains_half_open() {
        let r = Range::new("b", "d");
        assert!(!r.contains(b"a"));
        assert!(r.contains(b"b"));
        assert!(r.contains(b"c"));
        assert!(!r.contains(b"d"));
    }

    #[test]
    fn unbounded_range() {
        let r = Range::new("m", "");
        assert!(r.contains(b"zzzz"));
        assert!(!r.contains(b"a"));
        assert!(Range::full().contains(b""));
    }

    #[test]
    fn range_covers() {
        let r = Range::new("b", "f");
        assert!(r.covers(b"b", b"f"));
        assert!(r.covers(b"c", b"d"));
        assert!(!r.covers(b"a", b"c"));
        assert!(!r.covers(b"c", b"g"));
        assert!(!r.covers(b"c", b""));
        assert!(Range::full().covers(b"", b""));
    }

    #[test]
    fn with_peers_bumps_epoch() {
        let loc = Location::new("127.0.0.1", 20101);
        let region = Region::new(1, vec![Peer::new(1, loc.clone(), loc.clone())], Range::full());
        let changed = region.with_peers(vec![Peer::new(2, loc.clone(), loc)]);
        assert_eq!(changed.epoch, region.epoch + 1);
        assert_eq!(changed.peer_store_ids(), vec![2]);
        assert_eq!(changed.id, region.id);
    }
}
