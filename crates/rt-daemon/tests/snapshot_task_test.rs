use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rt_core::codec;
use rt_core::config::RetentionConfig;
use rt_core::store::{
    ConnectionTarget, DocumentStore, MemoryStore, StoreConnection, StoreError,
};
use rt_core::types::{Collection, RetentionRecord, ServiceKey, Snapshot};
use rt_core::RetentionError;
use rt_daemon::snapshot_task::{SnapshotTask, TaskOutcome};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

const DB: &str = "retention_scheduler";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ServiceState {
    state: String,
    attempt: u32,
    perf: BTreeMap<String, f64>,
}

fn state(s: &str, attempt: u32) -> ServiceState {
    let mut perf = BTreeMap::new();
    perf.insert("rta".to_string(), 0.25 * attempt as f64);
    ServiceState {
        state: s.to_string(),
        attempt,
        perf,
    }
}

fn target() -> ConnectionTarget {
    RetentionConfig {
        endpoint: Some("mem".into()),
        ..RetentionConfig::default()
    }
    .connection_target()
    .expect("valid config")
}

fn snapshot() -> Snapshot<ServiceState> {
    let mut s = Snapshot::new();
    s.hosts.insert("web-01".into(), state("UP", 1));
    s.hosts.insert("db-01".into(), state("DOWN", 3));
    s.services
        .insert(ServiceKey::new("web-01", "HTTP"), state("OK", 1));
    s.services
        .insert(ServiceKey::new("db-01", "bad"), state("CRITICAL", 2));
    s
}

/// Delegates to a memory store but refuses to insert one particular id, and
/// optionally hangs on every insert.
struct FaultyStore {
    inner: MemoryStore,
    reject_id: Option<&'static str>,
    hang_on_insert: bool,
}

struct FaultyConnection {
    inner: Box<dyn StoreConnection>,
    reject_id: Option<&'static str>,
    hang_on_insert: bool,
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<Box<dyn StoreConnection>, StoreError> {
        let inner = self.inner.connect(target).await?;
        Ok(Box::new(FaultyConnection {
            inner,
            reject_id: self.reject_id,
            hang_on_insert: self.hang_on_insert,
        }))
    }
}

#[async_trait]
impl StoreConnection for FaultyConnection {
    async fn find_all(&self, collection: Collection) -> Result<Vec<RetentionRecord>, StoreError> {
        self.inner.find_all(collection).await
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.inner.remove(collection, id).await
    }

    async fn insert(&self, collection: Collection, record: RetentionRecord) -> Result<(), StoreError> {
        if self.hang_on_insert {
            std::future::pending::<()>().await;
        }
        if self.reject_id == Some(record.id.as_str()) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.insert(collection, record).await
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn cycle_writes_every_entity_with_stable_ids() {
    let store = MemoryStore::new();
    let before = Utc::now().timestamp();

    let report = SnapshotTask::new(Arc::new(store.clone()), target(), snapshot())
        .run()
        .await
        .expect("cycle succeeds");
    assert_eq!(report.hosts_written, 2);
    assert_eq!(report.services_written, 2);
    assert!(report.finished_at >= report.started_at);

    let hosts = store.records(DB, Collection::Hosts).await;
    let ids: Vec<_> = hosts.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["HOST-db-01", "HOST-web-01"]);
    assert!(hosts.iter().all(|r| r.timestamp >= before));

    let services = store.records(DB, Collection::Services).await;
    let web = services
        .iter()
        .find(|r| r.id == "SERVICE-web-01,HTTP")
        .expect("service record");
    assert_eq!(
        codec::decode::<ServiceState>(&web.value).expect("decode"),
        state("OK", 1)
    );
    assert_eq!(store.open_connections(), 0, "connection released");
}

#[tokio::test]
async fn second_cycle_overwrites_first() {
    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());

    SnapshotTask::new(Arc::clone(&shared), target(), snapshot())
        .run()
        .await
        .expect("first cycle");

    let mut next = Snapshot::new();
    next.hosts.insert("web-01".to_string(), state("DOWN", 2));
    SnapshotTask::new(shared, target(), next)
        .run()
        .await
        .expect("second cycle");

    let hosts = store.records(DB, Collection::Hosts).await;
    let web: Vec<_> = hosts.iter().filter(|r| r.id == "HOST-web-01").collect();
    assert_eq!(web.len(), 1);
    assert_eq!(
        codec::decode::<ServiceState>(&web[0].value).expect("decode"),
        state("DOWN", 2)
    );
    // Not in the second snapshot, so left untouched.
    assert!(hosts.iter().any(|r| r.id == "HOST-db-01"));
}

#[tokio::test]
async fn empty_snapshot_is_a_successful_no_op() {
    let store = MemoryStore::new();
    let report = SnapshotTask::new(Arc::new(store.clone()), target(), Snapshot::<u8>::new())
        .run()
        .await
        .expect("cycle succeeds");
    assert_eq!((report.hosts_written, report.services_written), (0, 0));
    assert!(store.records(DB, Collection::Hosts).await.is_empty());
}

#[tokio::test]
async fn unreachable_store_writes_nothing() {
    let store = MemoryStore::new();
    store.set_reachable(false).await;

    let err = SnapshotTask::new(Arc::new(store.clone()), target(), snapshot())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, RetentionError::Connection(StoreError::Unreachable(_))));

    store.set_reachable(true).await;
    assert!(store.records(DB, Collection::Hosts).await.is_empty());
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn write_failure_abandons_cycle_and_releases_connection() {
    let memory = MemoryStore::new();
    let store = FaultyStore {
        inner: memory.clone(),
        reject_id: Some("SERVICE-db-01,bad"),
        hang_on_insert: false,
    };

    let handle = SnapshotTask::new(Arc::new(store), target(), snapshot()).spawn(&Handle::current());
    let err = match handle.join().await {
        TaskOutcome::Failed(err) => err,
        other => panic!("expected failure, got {other:?}"),
    };
    assert!(matches!(
        err,
        RetentionError::StoreWrite {
            collection: "service_retentions",
            ..
        }
    ));

    // Hosts went out before the failure; that partial state is kept.
    assert_eq!(memory.records(DB, Collection::Hosts).await.len(), 2);
    assert_eq!(memory.open_connections(), 0);
}

#[tokio::test]
async fn terminated_task_drops_its_connection() {
    let memory = MemoryStore::new();
    let store = FaultyStore {
        inner: memory.clone(),
        reject_id: None,
        hang_on_insert: true,
    };

    let handle = SnapshotTask::new(Arc::new(store), target(), snapshot()).spawn(&Handle::current());
    for _ in 0..100 {
        if memory.open_connections() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(memory.open_connections(), 1);
    assert!(handle.is_running());

    handle.terminate();
    assert!(matches!(handle.join().await, TaskOutcome::Terminated));
    assert_eq!(memory.open_connections(), 0);
}

/// A value whose serializer blows up.
#[derive(Debug, Deserialize)]
struct Exploding;

impl Serialize for Exploding {
    fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        panic!("serializer bug");
    }
}

#[tokio::test]
async fn panicking_cycle_is_contained() {
    let store = MemoryStore::new();
    let mut exploding = Snapshot::new();
    exploding.hosts.insert("web-01".to_string(), Exploding);

    let handle = SnapshotTask::new(Arc::new(store.clone()), target(), exploding)
        .spawn(&Handle::current());
    match handle.join().await {
        TaskOutcome::Panicked(msg) => assert!(msg.contains("panic"), "{msg}"),
        other => panic!("expected panicked outcome, got {other:?}"),
    }
    assert_eq!(store.open_connections(), 0);

    // The runtime is still usable for the next cycle.
    let next = SnapshotTask::new(Arc::new(store.clone()), target(), snapshot())
        .spawn(&Handle::current());
    assert!(matches!(next.join().await, TaskOutcome::Completed(_)));
    assert_eq!(store.records(DB, Collection::Hosts).await.len(), 2);
}
