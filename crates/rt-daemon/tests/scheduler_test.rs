use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rt_core::config::RetentionConfig;
use rt_core::store::{
    ConnectionTarget, DocumentStore, MemoryStore, StoreConnection, StoreError,
};
use rt_core::types::{Collection, ServiceKey, Snapshot};
use rt_core::RetentionError;
use rt_daemon::host::RetentionHost;
use rt_daemon::scheduler::{TickOutcome, TriggerScheduler};
use rt_daemon::snapshot_task::TaskOutcome;
use tokio::runtime::Handle;

/// Host whose only state is how many snapshots it has handed out.
#[derive(Default)]
struct CountingHost {
    snapshots_taken: Cell<u32>,
}

impl RetentionHost for CountingHost {
    type Value = u32;

    fn retention_snapshot(&self) -> Snapshot<u32> {
        let n = self.snapshots_taken.get() + 1;
        self.snapshots_taken.set(n);
        let mut snapshot = Snapshot::new();
        snapshot.hosts.insert("a".to_string(), n);
        snapshot
            .services
            .insert(ServiceKey::new("a", "ping"), n * 10);
        snapshot
    }

    fn apply_retention(&mut self, _restored: Snapshot<u32>) {}

    fn host_names(&self) -> Vec<String> {
        vec!["a".to_string()]
    }

    fn service_keys(&self) -> Vec<ServiceKey> {
        vec![ServiceKey::new("a", "ping")]
    }
}

/// Connect never completes; `in_flight` counts connect futures still alive.
#[derive(Clone, Default)]
struct HangingStore {
    in_flight: Arc<AtomicUsize>,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for HangingStore {
    async fn connect(
        &self,
        _target: &ConnectionTarget,
    ) -> Result<Box<dyn StoreConnection>, StoreError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));
        std::future::pending().await
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

fn scheduler(multiplier: u32, store: Arc<dyn DocumentStore>) -> TriggerScheduler {
    TriggerScheduler::new(multiplier, store, target(), Handle::current())
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test]
async fn dispatches_exactly_on_multiples_of_n() {
    let host = CountingHost::default();
    let mut sched = scheduler(3, Arc::new(MemoryStore::new()));

    let mut dispatch_ticks = Vec::new();
    for tick in 1..=10u32 {
        match sched.on_tick(&host) {
            TickOutcome::Dispatched { .. } => dispatch_ticks.push(tick),
            TickOutcome::Counted { tick: counted } => assert_eq!(counted, tick % 3),
        }
    }

    assert_eq!(dispatch_ticks, vec![3, 6, 9]);
    assert_eq!(sched.cycles_dispatched(), 3);
    assert_eq!(host.snapshots_taken.get(), 3, "snapshot pulled once per dispatch");
    assert_eq!(sched.tick_count(), 1);
}

#[tokio::test]
async fn multiplier_of_one_dispatches_every_tick() {
    let host = CountingHost::default();
    let mut sched = scheduler(1, Arc::new(MemoryStore::new()));
    for _ in 0..4 {
        assert!(matches!(sched.on_tick(&host), TickOutcome::Dispatched { .. }));
    }
}

#[tokio::test]
async fn zero_multiplier_falls_back_to_default() {
    let sched = scheduler(0, Arc::new(MemoryStore::new()));
    assert_eq!(sched.multiplier(), 30);
}

#[tokio::test]
async fn overrunning_task_is_terminated_before_next_dispatch() {
    let store = HangingStore::default();
    let in_flight = Arc::clone(&store.in_flight);
    let host = CountingHost::default();
    let mut sched = scheduler(2, Arc::new(store));

    sched.on_tick(&host);
    let first = sched.on_tick(&host);
    assert!(matches!(
        first,
        TickOutcome::Dispatched {
            terminated_previous: false,
            ..
        }
    ));
    assert!(wait_until(|| in_flight.load(Ordering::SeqCst) == 1).await);
    let first_id = sched.current_task().expect("task").cycle_id();

    sched.on_tick(&host);
    let second = sched.on_tick(&host);
    let TickOutcome::Dispatched {
        cycle_id,
        terminated_previous,
    } = second
    else {
        panic!("expected dispatch, got {second:?}");
    };
    assert!(terminated_previous);
    assert_ne!(cycle_id, first_id);
    assert_eq!(sched.overruns(), 1);
    assert_eq!(sched.current_task().expect("task").cycle_id(), cycle_id);

    // The killed cycle goes away, only the new one is left hanging.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(in_flight.load(Ordering::SeqCst), 1);

    sched.shutdown();
    assert!(sched.current_task().is_none());
    assert!(wait_until(|| in_flight.load(Ordering::SeqCst) == 0).await);
}

#[tokio::test]
async fn finished_previous_task_is_not_an_overrun() {
    let store = MemoryStore::new();
    let host = CountingHost::default();
    let mut sched = scheduler(1, Arc::new(store.clone()));

    sched.on_tick(&host);
    let done = wait_until(|| {
        sched
            .current_task()
            .map(|t| !t.is_running())
            .unwrap_or(false)
    })
    .await;
    assert!(done, "first cycle should finish against the memory store");

    assert!(matches!(
        sched.on_tick(&host),
        TickOutcome::Dispatched {
            terminated_previous: false,
            ..
        }
    ));
    assert_eq!(sched.overruns(), 0);

    let outcome = sched.take_current_task().expect("task").join().await;
    assert!(matches!(outcome, TaskOutcome::Completed(_)), "{outcome:?}");

    let records = store.records("retention_scheduler", Collection::Hosts).await;
    assert_eq!(records.len(), 1, "second cycle replaced the first record");
    assert_eq!(
        rt_core::codec::decode::<u32>(&records[0].value).expect("decode"),
        2
    );
}

#[tokio::test]
async fn unreachable_store_does_not_disturb_ticks() {
    let store = MemoryStore::new();
    store.set_reachable(false).await;
    let host = CountingHost::default();
    let mut sched = scheduler(2, Arc::new(store));

    assert!(matches!(sched.on_tick(&host), TickOutcome::Counted { tick: 1 }));
    assert!(matches!(sched.on_tick(&host), TickOutcome::Dispatched { .. }));

    let outcome = sched.take_current_task().expect("task").join().await;
    assert!(matches!(
        outcome,
        TaskOutcome::Failed(RetentionError::Connection(_))
    ));

    // Next cycle is attempted on schedule.
    assert!(matches!(sched.on_tick(&host), TickOutcome::Counted { tick: 1 }));
    assert!(matches!(sched.on_tick(&host), TickOutcome::Dispatched { .. }));
}

#[tokio::test]
async fn dropping_scheduler_kills_outstanding_task() {
    let store = HangingStore::default();
    let in_flight = Arc::clone(&store.in_flight);
    let host = CountingHost::default();
    {
        let mut sched = scheduler(1, Arc::new(store));
        sched.on_tick(&host);
        assert!(wait_until(|| in_flight.load(Ordering::SeqCst) == 1).await);
    }
    assert!(wait_until(|| in_flight.load(Ordering::SeqCst) == 0).await);
}
