use std::sync::Arc;

use chrono::{DateTime, Utc};
use rt_core::codec::{self, RetentionValue};
use rt_core::store::{ConnectionTarget, DocumentStore, StoreClient};
use rt_core::types::{Collection, EntityId, RetentionRecord, Snapshot};
use rt_core::{Result, RetentionError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Records encoded between two cooperative yields, so an abort lands even
/// while a large snapshot is still being serialized.
const ENCODE_BATCH: usize = 256;

/// Summary of one successful persistence cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub hosts_written: usize,
    pub services_written: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// One full persistence cycle: connect, encode and write both collections,
/// disconnect.
///
/// Owns its snapshot copy and opens its own connection, so it shares nothing
/// mutable with the daemon.
pub struct SnapshotTask<V> {
    cycle_id: Uuid,
    store: Arc<dyn DocumentStore>,
    target: ConnectionTarget,
    snapshot: Snapshot<V>,
}

impl<V: RetentionValue> SnapshotTask<V> {
    pub fn new(store: Arc<dyn DocumentStore>, target: ConnectionTarget, snapshot: Snapshot<V>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            store,
            target,
            snapshot,
        }
    }

    pub fn cycle_id(&self) -> Uuid {
        self.cycle_id
    }

    /// Start the cycle on `runtime` and return immediately.
    pub fn spawn(self, runtime: &Handle) -> TaskHandle {
        let cycle_id = self.cycle_id;
        let join = runtime.spawn(self.run());
        TaskHandle {
            cycle_id,
            started_at: Utc::now(),
            join,
        }
    }

    /// Execute the cycle in place. Errors are logged here; the caller gets
    /// them back only for reporting.
    pub async fn run(self) -> Result<CycleReport> {
        let started_at = Utc::now();
        let cycle_id = self.cycle_id;
        info!(
            %cycle_id,
            hosts = self.snapshot.hosts.len(),
            services = self.snapshot.services.len(),
            "retention update starts"
        );

        let client = match StoreClient::connect(self.store.as_ref(), &self.target).await {
            Ok(client) => client,
            Err(e) => {
                warn!(%cycle_id, kind = e.kind(), error = %e, "retention update ends with error");
                return Err(e);
            }
        };

        let written = write_snapshot(&client, self.snapshot).await;
        client.disconnect().await;

        match written {
            Ok((hosts_written, services_written)) => {
                let report = CycleReport {
                    cycle_id,
                    hosts_written,
                    services_written,
                    started_at,
                    finished_at: Utc::now(),
                };
                info!(
                    %cycle_id,
                    hosts_written,
                    services_written,
                    elapsed_ms = (report.finished_at - started_at).num_milliseconds(),
                    "retention update ends successfully"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(%cycle_id, kind = e.kind(), error = %e, "retention update ends with error");
                Err(e)
            }
        }
    }
}

async fn write_snapshot<V: RetentionValue>(
    client: &StoreClient,
    snapshot: Snapshot<V>,
) -> Result<(usize, usize)> {
    let host_records = encode_all(
        snapshot
            .hosts
            .into_iter()
            .map(|(name, value)| (EntityId::Host(name), value)),
    )
    .await?;
    let hosts = client.write(Collection::Hosts, host_records).await?;
    debug!(records = hosts, collection = %Collection::Hosts, "collection written");

    let service_records = encode_all(
        snapshot
            .services
            .into_iter()
            .map(|(key, value)| (EntityId::Service(key), value)),
    )
    .await?;
    let services = client.write(Collection::Services, service_records).await?;
    debug!(records = services, collection = %Collection::Services, "collection written");

    Ok((hosts, services))
}

async fn encode_all<V: RetentionValue>(
    entries: impl Iterator<Item = (EntityId, V)>,
) -> Result<Vec<RetentionRecord>> {
    let mut records = Vec::new();
    for (i, (id, value)) in entries.enumerate() {
        if i > 0 && i % ENCODE_BATCH == 0 {
            tokio::task::yield_now().await;
        }
        let blob = codec::encode(&value).map_err(|source| RetentionError::Encode {
            id: id.to_string(),
            source,
        })?;
        records.push(RetentionRecord::now(&id, blob));
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// How a cycle ended, as seen by whoever joins its handle.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed(CycleReport),
    Failed(RetentionError),
    /// Aborted from outside before it finished.
    Terminated,
    Panicked(String),
}

/// Handle to the outstanding background cycle.
pub struct TaskHandle {
    cycle_id: Uuid,
    started_at: DateTime<Utc>,
    join: JoinHandle<Result<CycleReport>>,
}

impl TaskHandle {
    pub fn cycle_id(&self) -> Uuid {
        self.cycle_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Liveness poll; never blocks.
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Abort the cycle. No cooperative signal and no rollback: whatever was
    /// written so far stays, the connection is dropped with the task.
    pub fn terminate(&self) {
        self.join.abort();
    }

    /// Wait for the cycle to end.
    pub async fn join(self) -> TaskOutcome {
        match self.join.await {
            Ok(Ok(report)) => TaskOutcome::Completed(report),
            Ok(Err(e)) => TaskOutcome::Failed(e),
            Err(e) if e.is_cancelled() => TaskOutcome::Terminated,
            Err(e) => TaskOutcome::Panicked(e.to_string()),
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cycle_id", &self.cycle_id)
            .field("started_at", &self.started_at)
            .field("running", &self.is_running())
            .finish()
    }
}
