use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use ygg_consensus::{LocalRouter, RaftOptions};
use ygg_engine::{Engine, RaftKvEngine, Storage, StoreControl};
use ygg_meta::{StoreMetaManager, StoreServerMeta};
use ygg_storage::{node_partitions, FjallEngine, MemEngine, RawEngine};
use ygg_types::{
    Context, KeyValue, Location, Peer, Range, Region, RegionId, StoreId, WriteData, YggError,
    DATA_CF,
};

const WAIT: Duration = Duration::from_secs(10);

struct TestStore {
    meta: Arc<StoreMetaManager>,
    engine: Arc<RaftKvEngine>,
    control: StoreControl,
    storage: Storage<RaftKvEngine>,
}

fn location(store_id: StoreId, base: u16) -> Location {
    Location::new("127.0.0.1", base + store_id as u16)
}

fn peer(store_id: StoreId) -> Peer {
    Peer::new(store_id, location(store_id, 20000), location(store_id, 20100))
}

fn region(id: RegionId, stores: &[StoreId]) -> Region {
    Region::new(id, stores.iter().map(|s| peer(*s)).collect(), Range::full())
}

fn options() -> RaftOptions {
    RaftOptions {
        heartbeat_interval_ms: 50,
        election_timeout_min_ms: 150,
        election_timeout_max_ms: 300,
        write_timeout_ms: 3000,
        ..RaftOptions::default()
    }
}

fn mem_engine() -> Arc<dyn RawEngine> {
    Arc::new(MemEngine::new(&node_partitions(&["lock"])))
}

fn fjall_engine(dir: &Path) -> Arc<dyn RawEngine> {
    FjallEngine::open(dir, &node_partitions(&["lock"])).unwrap()
}

/// Opens `dir` again, retrying while the previous database is still closing.
async fn reopen_fjall(dir: &Path) -> Arc<dyn RawEngine> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        match FjallEngine::open(dir, &node_partitions(&["lock"])) {
            Ok(engine) => return engine,
            Err(e) if tokio::time::Instant::now() >= deadline => panic!("fjall reopen failed: {e}"),
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
}

fn open_store(store_id: StoreId, raw: Arc<dyn RawEngine>, router: &Arc<LocalRouter>) -> TestStore {
    let server = StoreServerMeta::new(store_id, location(store_id, 20000), location(store_id, 20100));
    let meta = Arc::new(StoreMetaManager::new(raw.clone(), server).unwrap());
    meta.init().unwrap();
    meta.recover().unwrap();
    let engine = Arc::new(RaftKvEngine::new(raw, meta.clone(), router.clone(), options()));
    TestStore {
        control: StoreControl::new(engine.clone(), meta.clone()),
        storage: Storage::new(engine.clone()),
        meta,
        engine,
    }
}

fn ctx(region_id: RegionId) -> Context {
    Context::new().with_region_id(region_id)
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

async fn single_store_region(region_id: RegionId) -> TestStore {
    let router = Arc::new(LocalRouter::new());
    let store = open_store(1, mem_engine(), &router);
    store.control.add_region(&ctx(region_id), region(region_id, &[1])).await.unwrap();
    store.engine.wait_leader(region_id, WAIT).await.unwrap();
    store
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn put_then_get() {
    let store = single_store_region(1).await;
    assert!(store.meta.is_exist_region(1));

    store.storage.kv_put(&ctx(1), vec![KeyValue::new("key1", "value1")]).await.unwrap();
    let kvs = store.storage.kv_get(&ctx(1), &[b"key1".to_vec(), b"nope".to_vec()]).unwrap();
    assert_eq!(kvs, vec![KeyValue::new("key1", "value1")]);
    store.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn writes_visible_in_commit_order() {
    let store = single_store_region(1).await;
    for v in ["a", "b", "c"] {
        store.engine.write(&ctx(1), WriteData::put_one("k", v)).await.unwrap();
    }
    assert_eq!(store.engine.kv_get(&ctx(1), b"k").unwrap(), Some(b"c".to_vec()));
    store.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conditional_writes() {
    let store = single_store_region(2).await;
    let c = ctx(2);

    let put = store
        .storage
        .kv_put_if_absent(&c, vec![KeyValue::new("a", "1"), KeyValue::new("b", "1")], false)
        .await
        .unwrap();
    assert_eq!(put, vec![b"a".to_vec(), b"b".to_vec()]);
    let put = store
        .storage
        .kv_put_if_absent(&c, vec![KeyValue::new("b", "2"), KeyValue::new("c", "2")], true)
        .await
        .unwrap();
    assert!(put.is_empty());
    assert_eq!(store.engine.kv_get(&c, b"c").unwrap(), None);

    assert!(!store.storage.kv_compare_and_set(&c, KeyValue::new("a", "9"), b"0".to_vec()).await.unwrap());
    assert!(store.storage.kv_compare_and_set(&c, KeyValue::new("a", "9"), b"1".to_vec()).await.unwrap());
    assert!(store.storage.kv_compare_and_set(&c, KeyValue::new("z", "new"), Vec::new()).await.unwrap());
    assert_eq!(store.engine.kv_get(&c, b"a").unwrap(), Some(b"9".to_vec()));

    store.storage.kv_delete_range(&c, Range::new("a", "c")).await.unwrap();
    store.storage.kv_delete(&c, vec![b"z".to_vec()]).await.unwrap();
    assert_eq!(store.engine.kv_count(&c, b"", b"").unwrap(), 0);
    store.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partitions_are_independent() {
    let store = single_store_region(3).await;
    store.storage.kv_put(&ctx(3), vec![KeyValue::new("k", "data")]).await.unwrap();
    let lock = ctx(3).with_cf_name("lock");
    store.storage.kv_put(&lock, vec![KeyValue::new("k", "lock")]).await.unwrap();

    assert_eq!(store.engine.kv_get(&ctx(3), b"k").unwrap(), Some(b"data".to_vec()));
    assert_eq!(store.engine.kv_get(&lock, b"k").unwrap(), Some(b"lock".to_vec()));

    let bad = ctx(3).with_cf_name("missing");
    assert!(matches!(
        store.storage.kv_put(&bad, vec![KeyValue::new("k", "v")]).await,
        Err(YggError::InvalidPartition(_))
    ));
    store.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_key_rejected_before_consensus() {
    let store = single_store_region(4).await;
    let node = store.engine.get_node(4).unwrap();
    let before = node.metrics().unwrap().last_log_index;

    let err = store.storage.kv_put(&ctx(4), vec![KeyValue::new("", "v")]).await.unwrap_err();
    assert_eq!(err, YggError::KeyEmpty);
    assert_eq!(store.storage.kv_get(&ctx(4), &[Vec::new()]), Err(YggError::KeyEmpty));
    assert_eq!(node.metrics().unwrap().last_log_index, before);
    store.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn not_leader_without_corruption() {
    let router = Arc::new(LocalRouter::new());
    let store = open_store(1, mem_engine(), &router);
    store.control.add_region(&ctx(5), region(5, &[1, 2, 3])).await.unwrap();

    let c = ctx(5).with_timeout(Duration::from_millis(500));
    let err = store.engine.write(&c, WriteData::put_one("k", "v")).await.unwrap_err();
    assert!(matches!(err, YggError::NotLeader { .. } | YggError::Timeout), "{err}");
    assert!(err.is_retryable());

    assert_eq!(store.engine.kv_get(&c, b"k").unwrap(), None);
    assert_eq!(store.engine.region_ids(), vec![5]);
    assert!(!store.engine.is_leader(5));
    store.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_recovers_regions_and_data() {
    let dir = tempfile::tempdir().unwrap();
    let raw = fjall_engine(dir.path());
    {
        let router = Arc::new(LocalRouter::new());
        let store = open_store(1, raw.clone(), &router);
        store.control.add_region(&ctx(6), region(6, &[1])).await.unwrap();
        store.engine.wait_leader(6, WAIT).await.unwrap();
        store.storage.kv_put(&ctx(6), vec![KeyValue::new("durable", "yes")]).await.unwrap();
        store.engine.shutdown().await;
    }
    // Raft storage tasks drop their handles after the core stops.
    assert!(eventually(|| Arc::strong_count(&raw) == 1).await, "engine still shared");
    drop(raw);

    let router = Arc::new(LocalRouter::new());
    let store = open_store(1, reopen_fjall(dir.path()).await, &router);
    assert_eq!(store.engine.recover().await, 1);
    store.engine.wait_leader(6, WAIT).await.unwrap();
    assert_eq!(store.engine.kv_get(&ctx(6), b"durable").unwrap(), Some(b"yes".to_vec()));

    store.storage.kv_put(&ctx(6), vec![KeyValue::new("after", "restart")]).await.unwrap();
    assert_eq!(store.engine.kv_count(&ctx(6), b"", b"").unwrap(), 2);
    store.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn destroy_then_readd_is_empty() {
    let store = single_store_region(7).await;
    store.storage.kv_put(&ctx(7), vec![KeyValue::new("k", "v")]).await.unwrap();

    store.control.destroy_region(&ctx(7), 7).await.unwrap();
    assert!(!store.meta.is_exist_region(7));
    assert!(store.engine.region_ids().is_empty());
    assert_eq!(store.engine.kv_get(&ctx(7), b"k").unwrap(), None);

    store.control.add_region(&ctx(7), region(7, &[1])).await.unwrap();
    store.engine.wait_leader(7, WAIT).await.unwrap();
    assert_eq!(store.engine.kv_count(&ctx(7), b"", b"").unwrap(), 0);
    store.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn destroy_of_unknown_region_changes_nothing() {
    let store = single_store_region(8).await;
    assert_eq!(store.control.destroy_region(&ctx(99), 99).await, Err(YggError::RaftNotNode(99)));
    assert_eq!(store.engine.region_ids(), vec![8]);
    assert!(store.meta.is_exist_region(8));
    store.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_replicas_share_writes() {
    let router = Arc::new(LocalRouter::new());
    let stores: Vec<TestStore> = (1..=3).map(|id| open_store(id, mem_engine(), &router)).collect();
    let r = region(10, &[1, 2, 3]);
    for s in &stores {
        s.control.add_region(&ctx(10), r.clone()).await.unwrap();
    }

    let leader_id = stores[0].engine.wait_leader(10, WAIT).await.unwrap();
    let leader = &stores[leader_id as usize - 1];
    assert!(eventually(|| leader.engine.is_leader(10)).await);
    leader.storage.kv_put(&ctx(10), vec![KeyValue::new("shared", "1")]).await.unwrap();

    for s in &stores {
        assert!(eventually(|| s.engine.kv_get(&ctx(10), b"shared").unwrap().is_some()).await);
    }

    let follower = stores.iter().find(|s| s.meta.store_id() != leader_id).unwrap();
    assert!(eventually(|| follower.engine.leader_id(10) == Some(leader_id)).await);
    let err = follower.storage.kv_put(&ctx(10), vec![KeyValue::new("x", "y")]).await.unwrap_err();
    assert_eq!(err, YggError::NotLeader { leader: Some(leader_id) });

    for s in &stores {
        s.engine.shutdown().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn change_region_adds_a_replica() {
    let router = Arc::new(LocalRouter::new());
    let first = open_store(1, mem_engine(), &router);
    let second = open_store(2, mem_engine(), &router);

    first.control.add_region(&ctx(11), region(11, &[1])).await.unwrap();
    first.engine.wait_leader(11, WAIT).await.unwrap();
    first.storage.kv_put(&ctx(11), vec![KeyValue::new("before", "1")]).await.unwrap();

    // Not among the initial peers: waits for the leader to reach it.
    second.control.add_region(&ctx(11), region(11, &[1])).await.unwrap();

    let updated = first.control.change_region(&ctx(11), 11, vec![peer(1), peer(2)]).await.unwrap();
    assert_eq!(updated.epoch, 2);
    assert_eq!(first.meta.get_region(11).unwrap().peer_store_ids(), vec![1, 2]);
    assert_eq!(first.engine.get_node(11).unwrap().voter_ids(), vec![1, 2]);

    assert!(eventually(|| second.engine.kv_get(&ctx(11), b"before").unwrap().is_some()).await);

    let missing = second.control.change_region(&ctx(12), 12, vec![peer(2)]).await;
    assert_eq!(missing, Err(YggError::RegionNotFound(12)));

    first.engine.shutdown().await;
    second.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers() {
    let store = Arc::new(single_store_region(12).await);
    let mut tasks = tokio::task::JoinSet::new();
    for writer in 0..8u32 {
        let store = store.clone();
        tasks.spawn(async move {
            for i in 0..10u32 {
                let value: u64 = rand::thread_rng().gen();
                let key = format!("w{writer:02}-{i:02}");
                store
                    .engine
                    .write(&ctx(12), WriteData::put_one(key, value.to_be_bytes().to_vec()))
                    .await
                    .unwrap();
            }
        });
    }
    while let Some(r) = tasks.join_next().await {
        r.unwrap();
    }
    assert_eq!(store.engine.kv_count(&ctx(12), b"", b"").unwrap(), 80);
    let scanned = store.engine.kv_scan(&ctx(12), b"w03", b"w04").unwrap();
    assert_eq!(scanned.len(), 10);
    assert!(scanned.windows(2).all(|w| w[0].key < w[1].key));
    assert!(store.engine.raw_engine().has_partition(DATA_CF));
    store.engine.shutdown().await;
}
