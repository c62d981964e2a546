//! rt-daemon: a simulated monitoring daemon with retention persistence.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rt_core::store::{DocumentStore, MemoryStore, SqliteStore, StoreClient};
use rt_core::types::Collection;
use rt_daemon::module::RetentionModule;
use rt_daemon::settings::{ConfigSource, DaemonFileConfig, StoreDriver};
use rt_daemon::simulation::SimulatedMonitor;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Monitoring daemon stand-in that persists its check state between runs.
#[derive(Parser)]
#[command(name = "rt-daemon", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "rt-daemon.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default when no subcommand is given).
    Run,

    /// List the records currently held by the retention store.
    Records {
        /// Only list this collection.
        #[arg(long, value_enum)]
        collection: Option<CollectionArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CollectionArg {
    Hosts,
    Services,
}

impl From<CollectionArg> for Collection {
    fn from(arg: CollectionArg) -> Self {
        match arg {
            CollectionArg::Hosts => Collection::Hosts,
            CollectionArg::Services => Collection::Services,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = DaemonFileConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    rt_telemetry::logging::init(
        "rt-daemon",
        &config.general.log_level,
        config.general.log_format,
    );
    match &source {
        ConfigSource::File(path) => info!(path = %path.display(), "configuration loaded"),
        ConfigSource::Defaults(path) => {
            info!(path = %path.display(), "no config file found, using defaults")
        }
    }

    match cli.command {
        None | Some(Commands::Run) => run(config).await,
        Some(Commands::Records { collection }) => {
            list_records(config, collection.map(Collection::from)).await
        }
    }
}

fn build_store(config: &DaemonFileConfig) -> Arc<dyn DocumentStore> {
    match config.store.driver {
        StoreDriver::Sqlite => Arc::new(SqliteStore::new()),
        StoreDriver::Memory => Arc::new(MemoryStore::new()),
    }
}

async fn run(config: DaemonFileConfig) -> Result<()> {
    info!("rt-daemon starting");
    let store = build_store(&config);
    let mut module = RetentionModule::init(
        &config.retention,
        store,
        tokio::runtime::Handle::current(),
    )
    .context("retention module misconfigured")?;

    let mut monitor = SimulatedMonitor::new(
        config.simulation.hosts,
        config.simulation.services_per_host,
    );
    module.on_start(&mut monitor).await;

    let mut ticker =
        tokio::time::interval(Duration::from_millis(config.daemon.tick_interval_ms.max(1)));
    info!(
        tick_interval_ms = config.daemon.tick_interval_ms,
        multiplier = module.scheduler().multiplier(),
        "main loop running"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                monitor.run_checks();
                module.on_tick(&monitor);
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "failed to listen for ctrl-c");
                }
                info!("ctrl-c received, shutting down");
                break;
            }
        }
    }

    module.shutdown();
    info!(
        cycles = module.scheduler().cycles_dispatched(),
        overruns = module.scheduler().overruns(),
        "rt-daemon stopped"
    );
    Ok(())
}

async fn list_records(config: DaemonFileConfig, only: Option<Collection>) -> Result<()> {
    let target = config
        .retention
        .connection_target()
        .context("retention store misconfigured")?;
    let store = build_store(&config);
    let client = StoreClient::connect(store.as_ref(), &target)
        .await
        .context("cannot reach retention store")?;

    let collections: Vec<Collection> = match only {
        Some(c) => vec![c],
        None => Collection::ALL.to_vec(),
    };
    let mut result = Ok(());
    for collection in collections {
        match client.read_all(collection).await {
            Ok(records) => {
                println!("{collection} ({} records)", records.len());
                for record in records {
                    let when = chrono::DateTime::from_timestamp(record.timestamp, 0)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| record.timestamp.to_string());
                    println!("  {:<48} {when}  {} bytes", record.id, record.value.len());
                }
            }
            Err(e) => {
                result = Err(e).with_context(|| format!("failed to read {collection}"));
                break;
            }
        }
    }
    client.disconnect().await;
    result
}
