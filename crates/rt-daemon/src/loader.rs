use std::collections::HashMap;
use std::sync::Arc;

use rt_core::codec::{self, RetentionValue};
use rt_core::store::{ConnectionTarget, DocumentStore, StoreClient};
use rt_core::types::{Collection, EntityId, RetentionRecord, ServiceKey, Snapshot};
use rt_core::{Result, RetentionError};
use tracing::{debug, info, warn};

use crate::host::RetentionHost;

/// Counts gathered while reconciling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records found in the host collection.
    pub stored_hosts: usize,
    /// Records found in the service collection.
    pub stored_services: usize,
    pub restored_hosts: usize,
    pub restored_services: usize,
}

#[derive(Debug)]
pub enum LoadOutcome {
    /// State was handed to the daemon.
    Applied(LoadReport),
    /// Nothing was applied; the daemon keeps its default state.
    Failed(RetentionError),
}

impl LoadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LoadOutcome::Applied(_))
    }
}

/// One-shot startup load: read everything, match by identity key, decode,
/// and hand the result to the daemon.
pub struct ReconciliationLoader {
    store: Arc<dyn DocumentStore>,
    target: ConnectionTarget,
}

impl ReconciliationLoader {
    pub fn new(store: Arc<dyn DocumentStore>, target: ConnectionTarget) -> Self {
        Self { store, target }
    }

    /// Run the load against `host`. Never fails outward: errors are logged,
    /// `apply_retention` is skipped, and the outcome says why.
    pub async fn load<H: RetentionHost>(&self, host: &mut H) -> LoadOutcome {
        info!("retention load starts");
        let hosts = host.host_names();
        let services = host.service_keys();

        match self.reconcile::<H::Value>(&hosts, &services).await {
            Ok((restored, report)) => {
                host.apply_retention(restored);
                info!(
                    restored_hosts = report.restored_hosts,
                    restored_services = report.restored_services,
                    "retention load ends successfully"
                );
                LoadOutcome::Applied(report)
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "retention load failed, starting without retention");
                LoadOutcome::Failed(e)
            }
        }
    }

    /// Build the restored snapshot for the given known entities. Entities
    /// without a stored record are left out. The first undecodable record
    /// aborts the whole load.
    pub async fn reconcile<V: RetentionValue>(
        &self,
        hosts: &[String],
        services: &[ServiceKey],
    ) -> Result<(Snapshot<V>, LoadReport)> {
        let client = StoreClient::connect(self.store.as_ref(), &self.target).await?;
        let fetched = fetch_all(&client).await;
        client.disconnect().await;
        let (stored_hosts, stored_services) = fetched?;

        let mut report = LoadReport {
            stored_hosts: stored_hosts.len(),
            stored_services: stored_services.len(),
            ..LoadReport::default()
        };
        let mut restored = Snapshot::new();

        for name in hosts {
            let id = EntityId::host(name.as_str());
            if let Some(value) = decode_matched(&stored_hosts, &id)? {
                restored.hosts.insert(name.clone(), value);
            }
        }
        for key in services {
            let id = EntityId::from(key);
            if let Some(value) = decode_matched(&stored_services, &id)? {
                restored.services.insert(key.clone(), value);
            }
        }

        report.restored_hosts = restored.hosts.len();
        report.restored_services = restored.services.len();
        Ok((restored, report))
    }
}

async fn fetch_all(
    client: &StoreClient,
) -> Result<(HashMap<String, String>, HashMap<String, String>)> {
    let hosts = index_by_id(client.read_all(Collection::Hosts).await?);
    let services = index_by_id(client.read_all(Collection::Services).await?);
    debug!(hosts = hosts.len(), services = services.len(), "retention records fetched");
    Ok((hosts, services))
}

fn index_by_id(records: Vec<RetentionRecord>) -> HashMap<String, String> {
    records.into_iter().map(|r| (r.id, r.value)).collect()
}

fn decode_matched<V: RetentionValue>(
    stored: &HashMap<String, String>,
    id: &EntityId,
) -> Result<Option<V>> {
    let key = id.to_string();
    let Some(blob) = stored.get(&key) else {
        return Ok(None);
    };
    codec::decode(blob)
        .map(Some)
        .map_err(|source| RetentionError::Decode { id: key, source })
}
