use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use openraft::storage::{RaftSnapshotBuilder, RaftStateMachine};
use openraft::{
    BasicNode, Entry, EntryPayload, LogId, OptionalSend, Snapshot, SnapshotMeta, StoredMembership,
};
use parking_lot::Mutex;
use tokio::sync::RwLock;
use ygg_storage::codec::{decode, encode};
use ygg_storage::keys::raft_meta_key;
use ygg_storage::{RawEngine, WriteBatch};
use ygg_types::{
    is_reserved_cf, KeyValue, Mutation, MutationResult, NodeId, Range, Region, RegionId,
    WriteResponse, YggError, RAFT_META_CF,
};

use crate::status::RegionStatus;
use crate::types::{
    blocking, from_json, read_sm_err, to_json, write_sm_err, RaftCmd, StoResult, TypeConfig,
};

const LAST_APPLIED: &str = "last_applied";
const LAST_MEMBERSHIP: &str = "last_membership";

#[derive(Debug, Clone, Default)]
struct AppliedState {
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, BasicNode>,
}

/// Snapshot payload: the region's key range in every data partition.
#[derive(serde::Serialize, serde::Deserialize)]
struct SnapshotContents {
    partitions: Vec<(String, Vec<KeyValue>)>,
}

struct StoredSnapshot {
    meta: SnapshotMeta<NodeId, BasicNode>,
    data: Vec<u8>,
}

/// Applies one region's committed entries to the shared engine.
///
/// Data writes and the applied-state records of an entry go into one
/// [`WriteBatch`], so after a crash the engine holds either all of an entry
/// or none of it, and replay resumes right after `last_applied`.
#[derive(Clone)]
pub struct RegionStateMachine {
    region_id: RegionId,
    range: Range,
    engine: Arc<dyn RawEngine>,
    status: Arc<RegionStatus>,
    /// Write-locked while applying; snapshot building read-locks it.
    applied: Arc<RwLock<AppliedState>>,
    current_snapshot: Arc<Mutex<Option<Arc<StoredSnapshot>>>>,
}

impl RegionStateMachine {
    /// Opens the state machine and loads the persisted applied state.
    pub async fn open(
        region: &Region,
        engine: Arc<dyn RawEngine>,
        status: Arc<RegionStatus>,
    ) -> Result<Self, YggError> {
        let region_id = region.id;
        let loader = engine.clone();
        let applied = blocking(move || -> Result<AppliedState, YggError> {
            let read = |label: &str| loader.get(RAFT_META_CF, &raft_meta_key(region_id, label));
            let last_applied = read(LAST_APPLIED)?.map(|b| from_json(&b)).transpose()?;
            let last_membership =
                read(LAST_MEMBERSHIP)?.map(|b| from_json(&b)).transpose()?.unwrap_or_default();
            Ok(AppliedState { last_applied, last_membership })
        })
        .await?;

        if let Some(log_id) = &applied.last_applied {
            tracing::info!(region_id, last_applied = log_id.index, "state machine resumed");
        }
        Ok(RegionStateMachine {
            region_id,
            range: region.range.clone(),
            engine,
            status,
            applied: Arc::new(RwLock::new(applied)),
            current_snapshot: Arc::new(Mutex::new(None)),
        })
    }

    pub async fn last_applied(&self) -> Option<LogId<NodeId>> {
        self.applied.read().await.last_applied
    }
}

/// Removes the region's key range from every data partition.
pub fn wipe_region_data(engine: &dyn RawEngine, range: &Range) -> Result<(), YggError> {
    let mut batch = WriteBatch::new();
    for cf in data_partitions(engine) {
        batch.delete_range(&cf, range.start_key.clone(), range.end_key.clone());
    }
    engine.write(batch)
}

fn data_partitions(engine: &dyn RawEngine) -> Vec<String> {
    engine.partitions().into_iter().filter(|cf| !is_reserved_cf(cf)).collect()
}

// ---------------------------------------------------------------------------
// Mutation evaluation
// ---------------------------------------------------------------------------

/// The engine as seen from inside one entry: earlier mutations of the same
/// entry are visible to later ones before anything is written.
struct EntryView<'a> {
    engine: &'a dyn RawEngine,
    region_id: RegionId,
    range: &'a Range,
    overlay: HashMap<(String, Vec<u8>), Option<Vec<u8>>>,
    cleared: Vec<(String, Range)>,
    batch: WriteBatch,
}

impl<'a> EntryView<'a> {
    fn new(engine: &'a dyn RawEngine, region_id: RegionId, range: &'a Range) -> Self {
        EntryView {
            engine,
            region_id,
            range,
            overlay: HashMap::new(),
            cleared: Vec::new(),
            batch: WriteBatch::new(),
        }
    }

    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, YggError> {
        if let Some(v) = self.overlay.get(&(cf.to_string(), key.to_vec())) {
            return Ok(v.clone());
        }
        if self.cleared.iter().any(|(c, r)| c == cf && r.contains(key)) {
            return Ok(None);
        }
        self.engine.get(cf, key)
    }

    fn put(&mut self, cf: &str, key: Vec<u8>, value: Vec<u8>) {
        self.overlay.insert((cf.to_string(), key.clone()), Some(value.clone()));
        self.batch.put(cf, key, value);
    }

    fn delete(&mut self, cf: &str, key: Vec<u8>) {
        self.overlay.insert((cf.to_string(), key.clone()), None);
        self.batch.delete(cf, key);
    }

    fn delete_range(&mut self, cf: &str, range: Range) {
        for ((c, k), v) in self.overlay.iter_mut() {
            if c == cf && range.contains(k) {
                *v = None;
            }
        }
        self.batch.delete_range(cf, range.start_key.clone(), range.end_key.clone());
        self.cleared.push((cf.to_string(), range));
    }

    fn apply(&mut self, mutation: Mutation) -> Result<MutationResult, YggError> {
        if !self.engine.has_partition(mutation.cf()) || is_reserved_cf(mutation.cf()) {
            return Err(YggError::InvalidPartition(mutation.cf().to_string()));
        }
        // Keys outside the range would escape snapshots and region wipes.
        if !mutation.within(self.range) {
            return Err(YggError::KeyOutOfRange { region_id: self.region_id });
        }
        Ok(match mutation {
            Mutation::Put { cf, kvs } => {
                for kv in kvs {
                    self.put(&cf, kv.key, kv.value);
                }
                MutationResult::Put
            }
            Mutation::PutIfAbsent { cf, kvs, atomic } => {
                let mut absent = Vec::with_capacity(kvs.len());
                for kv in kvs {
                    if self.get(&cf, &kv.key)?.is_none() {
                        absent.push(kv);
                    } else if atomic {
                        return Ok(MutationResult::PutIfAbsent { put_keys: Vec::new() });
                    }
                }
                let mut put_keys = Vec::with_capacity(absent.len());
                for kv in absent {
                    put_keys.push(kv.key.clone());
                    self.put(&cf, kv.key, kv.value);
                }
                MutationResult::PutIfAbsent { put_keys }
            }
            Mutation::Delete { cf, keys } => {
                for key in keys {
                    self.delete(&cf, key);
                }
                MutationResult::Delete
            }
            Mutation::DeleteRange { cf, range } => {
                self.delete_range(&cf, range);
                MutationResult::DeleteRange
            }
            Mutation::CompareAndSet { cf, kv, expected } => {
                let current = self.get(&cf, &kv.key)?;
                let matches = match current {
                    Some(v) => v == expected,
                    None => expected.is_empty(),
                };
                if matches {
                    if kv.value.is_empty() {
                        self.delete(&cf, kv.key);
                    } else {
                        self.put(&cf, kv.key, kv.value);
                    }
                }
                MutationResult::CompareAndSet { success: matches }
            }
        })
    }
}

/// Evaluates one entry and commits it, applied-state records included, as a
/// single batch.
fn apply_entry(
    engine: &dyn RawEngine,
    region_id: RegionId,
    range: &Range,
    entry: Entry<TypeConfig>,
    membership: Option<&StoredMembership<NodeId, BasicNode>>,
) -> Result<WriteResponse, YggError> {
    let mut view = EntryView::new(engine, region_id, range);
    let mut response = WriteResponse::default();
    if let EntryPayload::Normal(RaftCmd { region_id: target, mutations }) = entry.payload {
        if target != region_id {
            return Err(YggError::Storage(format!(
                "command for region {target} reached region {region_id}"
            )));
        }
        for m in mutations {
            response.results.push(view.apply(m)?);
        }
    }

    let mut batch = view.batch;
    batch.put(RAFT_META_CF, raft_meta_key(region_id, LAST_APPLIED), to_json(&entry.log_id)?);
    if let Some(m) = membership {
        batch.put(RAFT_META_CF, raft_meta_key(region_id, LAST_MEMBERSHIP), to_json(m)?);
    }
    engine.write(batch)?;
    Ok(response)
}

// ---------------------------------------------------------------------------
// openraft traits
// ---------------------------------------------------------------------------

impl RaftSnapshotBuilder<TypeConfig> for RegionStateMachine {
    async fn build_snapshot(&mut self) -> StoResult<Snapshot<TypeConfig>> {
        let applied = self.applied.read().await;
        let engine = self.engine.clone();
        let range = self.range.clone();
        let data = blocking(move || {
            let partitions = data_partitions(&*engine)
                .into_iter()
                .map(|cf| {
                    let kvs = engine.scan(&cf, &range.start_key, &range.end_key)?;
                    Ok((cf, kvs))
                })
                .collect::<Result<Vec<_>, YggError>>()?;
            encode(&SnapshotContents { partitions })
        })
        .await
        .map_err(|e| read_sm_err(&e))?;

        let index = applied.last_applied.map(|l| l.index).unwrap_or(0);
        let meta = SnapshotMeta {
            last_log_id: applied.last_applied,
            last_membership: applied.last_membership.clone(),
            snapshot_id: format!("{}-{}-{}", self.region_id, index, uuid::Uuid::new_v4()),
        };
        drop(applied);

        tracing::info!(region_id = self.region_id, index, bytes = data.len(), "snapshot built");
        let stored = Arc::new(StoredSnapshot { meta: meta.clone(), data: data.clone() });
        *self.current_snapshot.lock() = Some(stored);
        Ok(Snapshot { meta, snapshot: Box::new(Cursor::new(data)) })
    }
}

impl RaftStateMachine<TypeConfig> for RegionStateMachine {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> StoResult<(Option<LogId<NodeId>>, StoredMembership<NodeId, BasicNode>)> {
        let applied = self.applied.read().await;
        Ok((applied.last_applied, applied.last_membership.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> StoResult<Vec<WriteResponse>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        let mut applied = self.applied.write().await;
        let mut responses = Vec::with_capacity(entries.len());
        for entry in entries {
            let log_id = entry.log_id;
            let membership = match &entry.payload {
                EntryPayload::Membership(m) => Some(StoredMembership::new(Some(log_id), m.clone())),
                _ => None,
            };
            let engine = self.engine.clone();
            let region_id = self.region_id;
            let range = self.range.clone();
            let stored = membership.clone();
            let result = blocking(move || {
                apply_entry(&*engine, region_id, &range, entry, stored.as_ref())
            })
            .await;
            match result {
                Ok(response) => {
                    applied.last_applied = Some(log_id);
                    if let Some(m) = membership {
                        applied.last_membership = m;
                    }
                    responses.push(response);
                }
                Err(e) => {
                    self.status.on_error(&e.to_string());
                    return Err(write_sm_err(&e));
                }
            }
        }
        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }

    async fn begin_receiving_snapshot(&mut self) -> StoResult<Box<Cursor<Vec<u8>>>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> StoResult<()> {
        let data = snapshot.into_inner();
        let mut applied = self.applied.write().await;

        let engine = self.engine.clone();
        let region_id = self.region_id;
        let range = self.range.clone();
        let bytes = data.clone();
        let last_log_id = meta.last_log_id;
        let membership = meta.last_membership.clone();
        blocking(move || -> Result<(), YggError> {
            let contents: SnapshotContents = decode(&bytes)?;
            let mut batch = WriteBatch::new();
            for cf in data_partitions(&*engine) {
                batch.delete_range(&cf, range.start_key.clone(), range.end_key.clone());
            }
            for (cf, kvs) in contents.partitions {
                for kv in kvs {
                    batch.put(&cf, kv.key, kv.value);
                }
            }
            let meta_key = |label: &str| raft_meta_key(region_id, label);
            batch.put(RAFT_META_CF, meta_key(LAST_APPLIED), to_json(&last_log_id)?);
            batch.put(RAFT_META_CF, meta_key(LAST_MEMBERSHIP), to_json(&membership)?);
            engine.write(batch)
        })
        .await
        .map_err(|e| {
            self.status.on_error(&e.to_string());
            write_sm_err(&e)
        })?;

        applied.last_applied = meta.last_log_id;
        applied.last_membership = meta.last_membership.clone();
        drop(applied);

        tracing::info!(
            region_id,
            snapshot_id = %meta.snapshot_id,
            index = meta.last_log_id.map(|l| l.index).unwrap_or(0),
            "snapshot installed"
        );
        *self.current_snapshot.lock() = Some(Arc::new(StoredSnapshot { meta: meta.clone(), data }));
        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> StoResult<Option<Snapshot<TypeConfig>>> {
        let current = self.current_snapshot.lock().clone();
        Ok(current.map(|s| Snapshot {
            meta: s.meta.clone(),
            snapshot: Box::new(Cursor::new(s.data.clone())),
        }))
    }
}

#[cfg(test)]
mod tests {
    use openraft::{CommittedLeaderId, Membership};
    use ygg_storage::MemEngine;
    use ygg_types::{Location, Peer, DATA_CF, RAFT_LOG_CF};

    use super::*;

    fn engine() -> Arc<dyn RawEngine> {
        Arc::new(MemEngine::new(&[DATA_CF, "lock", RAFT_LOG_CF, RAFT_META_CF]))
    }

    fn region(id: RegionId, range: Range) -> Region {
        let loc = Location::new("127.0.0.1", 20101);
        Region::new(id, vec![Peer::new(1, loc.clone(), loc)], range)
    }

    async fn open(engine: &Arc<dyn RawEngine>, r: &Region) -> RegionStateMachine {
        RegionStateMachine::open(r, engine.clone(), Arc::new(RegionStatus::new(r.id))).await.unwrap()
    }

    fn normal(region_id: RegionId, index: u64, mutations: Vec<Mutation>) -> Entry<TypeConfig> {
        Entry {
            log_id: LogId::new(CommittedLeaderId::new(1, 1), index),
            payload: EntryPayload::Normal(RaftCmd { region_id, mutations }),
        }
    }

    fn put(key: &str, value: &str) -> Mutation {
        Mutation::Put { cf: DATA_CF.into(), kvs: vec![KeyValue::new(key, value)] }
    }

    #[tokio::test]
    async fn apply_in_order_and_persist_last_applied() {
        let engine = engine();
        let r = region(1, Range::full());
        let mut sm = open(&engine, &r).await;
        let out = sm
            .apply(vec![normal(1, 1, vec![put("a", "1")]), normal(1, 2, vec![put("a", "2")])])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(engine.get(DATA_CF, b"a").unwrap(), Some(b"2".to_vec()));

        let mut reopened = open(&engine, &r).await;
        let (last, _) = reopened.applied_state().await.unwrap();
        assert_eq!(last.map(|l| l.index), Some(2));
    }

    #[tokio::test]
    async fn put_if_absent_atomic_and_partial() {
        let engine = engine();
        let r = region(1, Range::full());
        let mut sm = open(&engine, &r).await;
        sm.apply(vec![normal(1, 1, vec![put("b", "old")])]).await.unwrap();

        let kvs = vec![KeyValue::new("a", "1"), KeyValue::new("b", "2"), KeyValue::new("c", "3")];
        let atomic = Mutation::PutIfAbsent { cf: DATA_CF.into(), kvs: kvs.clone(), atomic: true };
        let out = sm.apply(vec![normal(1, 2, vec![atomic])]).await.unwrap();
        assert_eq!(out[0].results, vec![MutationResult::PutIfAbsent { put_keys: vec![] }]);
        assert_eq!(engine.get(DATA_CF, b"a").unwrap(), None);

        let partial = Mutation::PutIfAbsent { cf: DATA_CF.into(), kvs, atomic: false };
        let out = sm.apply(vec![normal(1, 3, vec![partial])]).await.unwrap();
        assert_eq!(
            out[0].results,
            vec![MutationResult::PutIfAbsent { put_keys: vec![b"a".to_vec(), b"c".to_vec()] }]
        );
        assert_eq!(engine.get(DATA_CF, b"b").unwrap(), Some(b"old".to_vec()));
    }

    #[tokio::test]
    async fn later_mutations_see_earlier_ones() {
        let engine = engine();
        let r = region(1, Range::full());
        let mut sm = open(&engine, &r).await;
        let cas = Mutation::CompareAndSet {
            cf: DATA_CF.into(),
            kv: KeyValue::new("k", "2"),
            expected: b"1".to_vec(),
        };
        let clear = Mutation::DeleteRange { cf: DATA_CF.into(), range: Range::new("j", "l") };
        let absent = Mutation::PutIfAbsent {
            cf: DATA_CF.into(),
            kvs: vec![KeyValue::new("k", "3")],
            atomic: true,
        };
        let out = sm.apply(vec![normal(1, 1, vec![put("k", "1"), cas, clear, absent])]).await.unwrap();
        assert_eq!(out[0].results[1], MutationResult::CompareAndSet { success: true });
        assert_eq!(out[0].results[3], MutationResult::PutIfAbsent { put_keys: vec![b"k".to_vec()] });
        assert_eq!(engine.get(DATA_CF, b"k").unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn compare_and_set_against_absent_key() {
        let engine = engine();
        let r = region(1, Range::full());
        let mut sm = open(&engine, &r).await;
        let cas = |expected: &str| Mutation::CompareAndSet {
            cf: DATA_CF.into(),
            kv: KeyValue::new("k", "v"),
            expected: expected.as_bytes().to_vec(),
        };
        let out = sm.apply(vec![normal(1, 1, vec![cas("x")]), normal(1, 2, vec![cas("")])]).await.unwrap();
        assert_eq!(out[0].results, vec![MutationResult::CompareAndSet { success: false }]);
        assert_eq!(out[1].results, vec![MutationResult::CompareAndSet { success: true }]);
        assert_eq!(engine.get(DATA_CF, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn foreign_region_command_is_fatal() {
        let engine = engine();
        let r = region(1, Range::full());
        let status = Arc::new(RegionStatus::new(1));
        let mut sm = RegionStateMachine::open(&r, engine.clone(), status.clone()).await.unwrap();
        assert!(sm.apply(vec![normal(2, 1, vec![put("a", "1")])]).await.is_err());
        assert!(status.last_error().is_some());
        assert_eq!(engine.get(DATA_CF, b"a").unwrap(), None);
        assert_eq!(sm.last_applied().await, None);
    }

    #[tokio::test]
    async fn membership_is_tracked() {
        let engine = engine();
        let r = region(1, Range::full());
        let mut sm = open(&engine, &r).await;
        let members = std::collections::BTreeMap::from([(1u64, BasicNode::new("127.0.0.1:20101"))]);
        let entry = Entry {
            log_id: LogId::new(CommittedLeaderId::new(1, 1), 1),
            payload: EntryPayload::Membership(Membership::new(vec![[1u64].into()], members)),
        };
        sm.apply(vec![entry]).await.unwrap();
        let mut reopened = open(&engine, &r).await;
        let (_, membership) = reopened.applied_state().await.unwrap();
        assert_eq!(membership.log_id().as_ref().map(|l| l.index), Some(1));
    }

    #[tokio::test]
    async fn snapshot_covers_only_region_range() {
        let leader_engine = engine();
        let r = region(1, Range::new("b", "d"));
        let mut sm = open(&leader_engine, &r).await;
        leader_engine.put(DATA_CF, b"a", b"outside").unwrap();
        sm.apply(vec![normal(1, 1, vec![put("b", "1"), put("c", "2")])]).await.unwrap();
        leader_engine.put("lock", b"c", b"lock").unwrap();

        let snapshot = sm.build_snapshot().await.unwrap();
        assert_eq!(snapshot.meta.last_log_id.map(|l| l.index), Some(1));

        // Follower: same region, stale data inside the range, foreign data outside.
        let follower_engine = engine();
        follower_engine.put(DATA_CF, b"bb", b"stale").unwrap();
        follower_engine.put(DATA_CF, b"z", b"keep").unwrap();
        let mut follower = open(&follower_engine, &r).await;
        follower.install_snapshot(&snapshot.meta, snapshot.snapshot).await.unwrap();

        let all = follower_engine.scan(DATA_CF, b"", b"").unwrap();
        let keys: Vec<_> = all.iter().map(|kv| kv.key.clone()).collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec(), b"z".to_vec()]);
        assert_eq!(follower_engine.get("lock", b"c").unwrap(), Some(b"lock".to_vec()));
        assert_eq!(follower.last_applied().await.map(|l| l.index), Some(1));
        assert!(follower.get_current_snapshot().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn out_of_range_mutation_is_fatal() {
        let engine = engine();
        let r = region(1, Range::new("a", "m"));
        let status = Arc::new(RegionStatus::new(1));
        let mut sm = RegionStateMachine::open(&r, engine.clone(), status.clone()).await.unwrap();
        let spill = Mutation::DeleteRange { cf: DATA_CF.into(), range: Range::new("b", "z") };
        assert!(sm.apply(vec![normal(1, 1, vec![put("b", "1"), spill])]).await.is_err());
        assert!(sm.apply(vec![normal(1, 1, vec![put("x", "foreign")])]).await.is_err());
        assert!(status.last_error().is_some());
        assert_eq!(engine.count(DATA_CF, b"", b"").unwrap(), 0);
        assert_eq!(sm.last_applied().await, None);
    }

    #[tokio::test]
    async fn wipe_clears_range_in_every_data_partition() {
        let engine = engine();
        engine.put(DATA_CF, b"b", b"1").unwrap();
        engine.put("lock", b"b", b"1").unwrap();
        engine.put(DATA_CF, b"x", b"1").unwrap();
        wipe_region_data(&*engine, &Range::new("a", "c")).unwrap();
        assert_eq!(engine.count(DATA_CF, b"", b"").unwrap(), 1);
        assert_eq!(engine.count("lock", b"", b"").unwrap(), 0);
    }
}
