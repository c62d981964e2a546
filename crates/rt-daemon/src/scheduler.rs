use std::sync::Arc;

use rt_core::config::DEFAULT_RETENTION_MULTIPLIER;
use rt_core::store::{ConnectionTarget, DocumentStore};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::host::RetentionHost;
use crate::snapshot_task::{SnapshotTask, TaskHandle};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Counted only; `tick` is the counter after this tick.
    Counted { tick: u32 },
    /// A new cycle was started.
    Dispatched {
        cycle_id: Uuid,
        /// The previous cycle was still running and got killed.
        terminated_previous: bool,
    },
}

/// Decides when to persist, counting daemon ticks rather than wall-clock
/// time, and keeps at most one cycle outstanding.
///
/// Every `multiplier`-th tick the previous cycle is checked: if it is still
/// running it overran the interval and is aborted. Then a fresh snapshot is
/// taken from the host and handed to a new background [`SnapshotTask`].
/// [`on_tick`](Self::on_tick) never waits on the task.
pub struct TriggerScheduler {
    multiplier: u32,
    tick_count: u32,
    current: Option<TaskHandle>,
    store: Arc<dyn DocumentStore>,
    target: ConnectionTarget,
    runtime: Handle,
    cycles_dispatched: u64,
    overruns: u64,
}

impl TriggerScheduler {
    pub fn new(
        multiplier: u32,
        store: Arc<dyn DocumentStore>,
        target: ConnectionTarget,
        runtime: Handle,
    ) -> Self {
        let multiplier = if multiplier == 0 {
            warn!("retention multiplier was 0, defaulting to {DEFAULT_RETENTION_MULTIPLIER}");
            DEFAULT_RETENTION_MULTIPLIER
        } else {
            multiplier
        };
        Self {
            multiplier,
            tick_count: 0,
            current: None,
            store,
            target,
            runtime,
            cycles_dispatched: 0,
            overruns: 0,
        }
    }

    pub fn on_tick<H: RetentionHost>(&mut self, host: &H) -> TickOutcome {
        self.tick_count += 1;
        if self.tick_count < self.multiplier {
            return TickOutcome::Counted {
                tick: self.tick_count,
            };
        }
        self.tick_count = 0;

        let terminated_previous = self.reap_previous();

        let snapshot = host.retention_snapshot();
        let task = SnapshotTask::new(Arc::clone(&self.store), self.target.clone(), snapshot);
        let handle = task.spawn(&self.runtime);
        let cycle_id = handle.cycle_id();
        self.current = Some(handle);
        self.cycles_dispatched += 1;

        info!(%cycle_id, cycle = self.cycles_dispatched, "new retention update begins");
        TickOutcome::Dispatched {
            cycle_id,
            terminated_previous,
        }
    }

    /// Drop the previous handle, killing its task first if it is still alive.
    fn reap_previous(&mut self) -> bool {
        let Some(previous) = self.current.take() else {
            return false;
        };
        if !previous.is_running() {
            debug!(cycle_id = %previous.cycle_id(), "previous retention update finished");
            return false;
        }
        warn!(
            cycle_id = %previous.cycle_id(),
            started_at = %previous.started_at(),
            "previous retention update has not finished, terminating it"
        );
        previous.terminate();
        self.overruns += 1;
        true
    }

    /// Kill any outstanding cycle. Used when the daemon stops.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.current.take() {
            if task.is_running() {
                info!(cycle_id = %task.cycle_id(), "terminating retention update on shutdown");
                task.terminate();
            }
        }
    }

    /// Take ownership of the outstanding handle, e.g. to await it.
    pub fn take_current_task(&mut self) -> Option<TaskHandle> {
        self.current.take()
    }

    pub fn current_task(&self) -> Option<&TaskHandle> {
        self.current.as_ref()
    }

    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn cycles_dispatched(&self) -> u64 {
        self.cycles_dispatched
    }

    /// Cycles that were still running when the next one was due.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

impl Drop for TriggerScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
