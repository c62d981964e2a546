use std::collections::HashMap;
use std::sync::Arc;

use rt_core::config::RetentionConfig;
use rt_core::store::{ConnectionTarget, DocumentStore};
use rt_core::Result;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::host::RetentionHost;
use crate::loader::{LoadOutcome, ReconciliationLoader};
use crate::scheduler::{TickOutcome, TriggerScheduler};

/// Retention persistence as the host daemon sees it: `init` once, then
/// `on_start` before the main loop and `on_tick` from inside it.
pub struct RetentionModule {
    target: ConnectionTarget,
    scheduler: TriggerScheduler,
    loader: ReconciliationLoader,
}

impl RetentionModule {
    /// Validate the configuration and build the connection target. No I/O.
    ///
    /// Configuration errors are returned as-is and are meant to abort
    /// startup. Background cycles are spawned on `runtime`.
    pub fn init(
        config: &RetentionConfig,
        store: Arc<dyn DocumentStore>,
        runtime: Handle,
    ) -> Result<Self> {
        info!("initialising retention module");
        let target = config.connection_target()?;
        debug!(uri = %target.redacted_uri(), "retention store target");

        let scheduler = TriggerScheduler::new(
            config.retention_multiplier,
            Arc::clone(&store),
            target.clone(),
            runtime,
        );
        let loader = ReconciliationLoader::new(store, target.clone());
        Ok(Self {
            target,
            scheduler,
            loader,
        })
    }

    /// Same as [`init`](Self::init) from the daemon's flat module options.
    pub fn from_options(
        options: &HashMap<String, String>,
        store: Arc<dyn DocumentStore>,
        runtime: Handle,
    ) -> Result<Self> {
        Self::init(&RetentionConfig::from_options(options), store, runtime)
    }

    /// Tick hook. Returns immediately.
    pub fn on_tick<H: RetentionHost>(&mut self, host: &H) -> TickOutcome {
        self.scheduler.on_tick(host)
    }

    /// Startup hook. Blocks the caller until the load has finished or failed;
    /// a failure never propagates.
    pub async fn on_start<H: RetentionHost>(&mut self, host: &mut H) -> LoadOutcome {
        self.loader.load(host).await
    }

    /// Kill any outstanding cycle.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut TriggerScheduler {
        &mut self.scheduler
    }
}
