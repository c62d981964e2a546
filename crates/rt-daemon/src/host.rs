use rt_core::codec::RetentionValue;
use rt_core::types::{ServiceKey, Snapshot};

/// The seam between the retention subsystem and the monitoring daemon that
/// owns the live host/service state.
pub trait RetentionHost {
    /// Per-entity retention state. Opaque to this crate beyond being
    /// serializable.
    type Value: RetentionValue;

    /// A point-in-time copy of all retention state. Called from the tick
    /// handler, so it must be quick.
    fn retention_snapshot(&self) -> Snapshot<Self::Value>;

    /// Merge restored state into the live entities.
    fn apply_retention(&mut self, restored: Snapshot<Self::Value>);

    /// Names of every host currently configured.
    fn host_names(&self) -> Vec<String>;

    /// Every configured service.
    fn service_keys(&self) -> Vec<ServiceKey>;
}
