//! Retention persistence for a tick-driven monitoring daemon.
//!
//! - [`module::RetentionModule`]: the `init` / `on_start` / `on_tick` surface
//! - [`scheduler::TriggerScheduler`]: tick counting and overrun supervision
//! - [`snapshot_task::SnapshotTask`]: one background persistence cycle
//! - [`loader::ReconciliationLoader`]: the startup load and merge
//! - [`host::RetentionHost`]: what the daemon has to provide

pub mod host;
pub mod loader;
pub mod module;
pub mod scheduler;
pub mod settings;
pub mod simulation;
pub mod snapshot_task;
