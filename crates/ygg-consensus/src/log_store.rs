use std::fmt::Debug;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use openraft::storage::{LogFlushed, RaftLogReader, RaftLogStorage};
use openraft::{Entry, LogId, LogState, OptionalSend, Vote};
use ygg_storage::keys::{raft_log_key, raft_meta_key, region_end, region_prefix};
use ygg_storage::{RawEngine, WriteBatch};
use ygg_types::{NodeId, RegionId, YggError, RAFT_LOG_CF, RAFT_META_CF};

use crate::types::{
    blocking, from_json, read_logs_err, read_vote_err, to_json, write_logs_err, write_vote_err,
    StoResult, TypeConfig,
};

const VOTE: &str = "vote";
const LAST_PURGED: &str = "last_purged";

/// First key past `index` in a region's log.
fn log_key_after(region_id: RegionId, index: u64) -> Vec<u8> {
    match index.checked_add(1) {
        Some(next) => raft_log_key(region_id, next).to_vec(),
        None => region_end(region_id),
    }
}

/// Raft log and vote of one region, stored in the shared engine under
/// region-prefixed keys in `raft_log` and `raft_meta`.
#[derive(Clone)]
pub struct RegionLogStore {
    region_id: RegionId,
    engine: Arc<dyn RawEngine>,
}

impl RegionLogStore {
    pub fn new(region_id: RegionId, engine: Arc<dyn RawEngine>) -> Self {
        RegionLogStore { region_id, engine }
    }

    pub fn region_id(&self) -> RegionId {
        self.region_id
    }

    fn read_meta<T>(&self, label: &str) -> Result<Option<T>, YggError>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.engine.get(RAFT_META_CF, &raft_meta_key(self.region_id, label))? {
            Some(b) => Ok(Some(from_json(&b)?)),
            None => Ok(None),
        }
    }

    fn scan_entries(
        &self,
        start: Vec<u8>,
        end: Vec<u8>,
    ) -> Result<Vec<Entry<TypeConfig>>, YggError> {
        self.engine
            .scan(RAFT_LOG_CF, &start, &end)?
            .into_iter()
            .map(|kv| from_json(&kv.value))
            .collect()
    }

    fn region_log_start(&self) -> Vec<u8> {
        region_prefix(self.region_id).to_vec()
    }

    /// True when the region has never voted nor logged anything on this node.
    pub fn is_pristine(&self) -> Result<bool, YggError> {
        let no_log = self
            .engine
            .count(RAFT_LOG_CF, &self.region_log_start(), &region_end(self.region_id))?
            == 0;
        let no_meta = self
            .engine
            .scan_prefix(RAFT_META_CF, &region_prefix(self.region_id))?
            .is_empty();
        Ok(no_log && no_meta)
    }

    /// Removes every log entry and raft meta record of the region.
    pub fn destroy(&self) -> Result<(), YggError> {
        let start = self.region_log_start();
        let end = region_end(self.region_id);
        let mut batch = WriteBatch::new();
        batch.delete_range(RAFT_LOG_CF, start.clone(), end.clone());
        batch.delete_range(RAFT_META_CF, start, end);
        self.engine.write(batch)
    }
}

impl RaftLogReader<TypeConfig> for RegionLogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> StoResult<Vec<Entry<TypeConfig>>> {
        let region_id = self.region_id;
        let start = match range.start_bound() {
            Bound::Included(&i) => raft_log_key(region_id, i).to_vec(),
            Bound::Excluded(&i) => log_key_after(region_id, i),
            Bound::Unbounded => self.region_log_start(),
        };
        let end = match range.end_bound() {
            Bound::Included(&i) => log_key_after(region_id, i),
            Bound::Excluded(&i) => raft_log_key(region_id, i).to_vec(),
            Bound::Unbounded => region_end(region_id),
        };
        let store = self.clone();
        blocking(move || store.scan_entries(start, end))
            .await
            .map_err(|e| read_logs_err(&e))
    }
}

impl RaftLogStorage<TypeConfig> for RegionLogStore {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> StoResult<LogState<TypeConfig>> {
        let store = self.clone();
        blocking(move || -> Result<LogState<TypeConfig>, YggError> {
            let last_purged_log_id: Option<LogId<NodeId>> = store.read_meta(LAST_PURGED)?;
            let last = store
                .engine
                .scan(RAFT_LOG_CF, &store.region_log_start(), &region_end(store.region_id))?
                .pop();
            let last_log_id = match last {
                Some(kv) => Some(from_json::<Entry<TypeConfig>>(&kv.value)?.log_id),
                None => last_purged_log_id,
            };
            Ok(LogState { last_purged_log_id, last_log_id })
        })
        .await
        .map_err(|e| read_logs_err(&e))
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> StoResult<()> {
        let store = self.clone();
        let vote = vote.clone();
        blocking(move || {
            store
                .engine
                .put(RAFT_META_CF, &raft_meta_key(store.region_id, VOTE), &to_json(&vote)?)
        })
        .await
        .map_err(|e| write_vote_err(&e))
    }

    async fn read_vote(&mut self) -> StoResult<Option<Vote<NodeId>>> {
        let store = self.clone();
        blocking(move || store.read_meta(VOTE)).await.map_err(|e| read_vote_err(&e))
    }

    async fn append<I>(&mut self, entries: I, callback: LogFlushed<TypeConfig>) -> StoResult<()>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let region_id = self.region_id;
        let mut batch = WriteBatch::new();
        for entry in entries {
            let value = to_json(&entry).map_err(|e| write_logs_err(&e))?;
            batch.put(RAFT_LOG_CF, raft_log_key(region_id, entry.log_id.index).to_vec(), value);
        }
        let engine = self.engine.clone();
        blocking(move || engine.write(batch)).await.map_err(|e| write_logs_err(&e))?;
        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: LogId<NodeId>) -> StoResult<()> {
        let store = self.clone();
        tracing::debug!(region_id = store.region_id, index = log_id.index, "truncating raft log");
        blocking(move || {
            store.engine.delete_range(
                RAFT_LOG_CF,
                &raft_log_key(store.region_id, log_id.index),
                &region_end(store.region_id),
            )
        })
        .await
        .map_err(|e| write_logs_err(&e))
    }

    async fn purge(&mut self, log_id: LogId<NodeId>) -> StoResult<()> {
        let store = self.clone();
        tracing::debug!(region_id = store.region_id, index = log_id.index, "purging raft log");
        blocking(move || {
            let mut batch = WriteBatch::new();
            batch.put(RAFT_META_CF, raft_meta_key(store.region_id, LAST_PURGED), to_json(&log_id)?);
            batch.delete_range(
                RAFT_LOG_CF,
                store.region_log_start(),
                log_key_after(store.region_id, log_id.index),
            );
            store.engine.write(batch)
        })
        .await
        .map_err(|e| write_logs_err(&e))
    }
}

#[cfg(test)]
mod tests {
    use openraft::{CommittedLeaderId, EntryPayload};
    use ygg_storage::MemEngine;

    use super::*;

    fn engine() -> Arc<dyn RawEngine> {
        Arc::new(MemEngine::new(&[RAFT_LOG_CF, RAFT_META_CF]))
    }

    fn log_id(term: u64, index: u64) -> LogId<NodeId> {
        LogId::new(CommittedLeaderId::new(term, 1), index)
    }

    fn blank(term: u64, index: u64) -> Entry<TypeConfig> {
        Entry { log_id: log_id(term, index), payload: EntryPayload::Blank }
    }

    // append() needs a LogFlushed callback that only openraft can build, so
    // the tests seed entries through the engine directly.
    fn seed(store: &RegionLogStore, entries: &[Entry<TypeConfig>]) {
        for e in entries {
            store
                .engine
                .put(RAFT_LOG_CF, &raft_log_key(store.region_id, e.log_id.index), &to_json(e).unwrap())
                .unwrap();
        }
    }

    #[tokio::test]
    async fn ranges_and_log_state() {
        let mut store = RegionLogStore::new(7, engine());
        assert!(store.is_pristine().unwrap());
        seed(&store, &[blank(1, 1), blank(1, 2), blank(2, 3), blank(2, 4)]);
        assert!(!store.is_pristine().unwrap());

        let got = store.try_get_log_entries(2..4).await.unwrap();
        assert_eq!(got.iter().map(|e| e.log_id.index).collect::<Vec<_>>(), vec![2, 3]);
        let got = store.try_get_log_entries(3..=4).await.unwrap();
        assert_eq!(got.len(), 2);
        let got = store.try_get_log_entries(..).await.unwrap();
        assert_eq!(got.len(), 4);

        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_log_id, Some(log_id(2, 4)));
        assert_eq!(state.last_purged_log_id, None);
    }

    #[tokio::test]
    async fn truncate_and_purge() {
        let mut store = RegionLogStore::new(7, engine());
        seed(&store, &[blank(1, 1), blank(1, 2), blank(1, 3), blank(1, 4)]);

        store.truncate(log_id(1, 3)).await.unwrap();
        assert_eq!(store.try_get_log_entries(..).await.unwrap().len(), 2);

        store.purge(log_id(1, 2)).await.unwrap();
        assert!(store.try_get_log_entries(..).await.unwrap().is_empty());
        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_purged_log_id, Some(log_id(1, 2)));
        assert_eq!(state.last_log_id, Some(log_id(1, 2)));
    }

    #[tokio::test]
    async fn regions_are_isolated() {
        let engine = engine();
        let mut a = RegionLogStore::new(1, engine.clone());
        let mut b = RegionLogStore::new(2, engine);
        seed(&a, &[blank(1, 1), blank(1, 2)]);
        seed(&b, &[blank(1, 1)]);
        a.save_vote(&Vote::new(3, 1)).await.unwrap();

        assert_eq!(b.try_get_log_entries(..).await.unwrap().len(), 1);
        assert_eq!(b.read_vote().await.unwrap(), None);
        assert_eq!(a.read_vote().await.unwrap(), Some(Vote::new(3, 1)));

        a.destroy().unwrap();
        assert!(a.is_pristine().unwrap());
        assert_eq!(b.try_get_log_entries(..).await.unwrap().len(), 1);
    }
}
