use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Output format selected by `[general] log_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match self {
            LogFormat::Human => fmt::layer().with_target(true).with_thread_ids(false).boxed(),
            LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        }
    }
}

/// `RUST_LOG` wins over `default_level` (e.g. "info", "rt_daemon=debug,warn").
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber for `service_name`.
///
/// Returns `false` when a subscriber was already installed; the call is then
/// a no-op, so tests can call it freely.
pub fn init(service_name: &str, default_level: &str, format: LogFormat) -> bool {
    let installed = tracing_subscriber::registry()
        .with(format.layer())
        .with(env_filter(default_level))
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(service = service_name, ?format, "logging initialised");
    }
    installed
}
