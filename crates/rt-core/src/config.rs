use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RetentionError};
use crate::store::{ConnectionTarget, Topology};

/// Ticks between two persistence cycles when nothing else is configured.
pub const DEFAULT_RETENTION_MULTIPLIER: u32 = 30;

/// Options recognised by the retention module.
///
/// **Security**: `password` never appears in `Debug` output or logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Selects the replica-set topology instead of a single endpoint.
    #[serde(default)]
    pub high_availability: bool,
    #[serde(default, alias = "stand_alone")]
    pub endpoint: Option<String>,
    #[serde(default, alias = "replica_set")]
    pub replica_members: Vec<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Raw query-string appended to the connection URI.
    #[serde(default, alias = "url_options")]
    pub connection_options: String,
    #[serde(default = "default_retention_multiplier")]
    pub retention_multiplier: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            high_availability: false,
            endpoint: None,
            replica_members: Vec::new(),
            database: default_database(),
            username: default_username(),
            password: default_password(),
            connection_options: String::new(),
            retention_multiplier: default_retention_multiplier(),
        }
    }
}

impl std::fmt::Debug for RetentionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionConfig")
            .field("high_availability", &self.high_availability)
            .field("endpoint", &self.endpoint)
            .field("replica_members", &self.replica_members)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("connection_options", &self.connection_options)
            .field("retention_multiplier", &self.retention_multiplier)
            .finish()
    }
}

fn default_database() -> String {
    "retention_scheduler".into()
}
fn default_username() -> String {
    "scheduler_retention".into()
}
fn default_password() -> String {
    "scheduler_retention".into()
}
fn default_retention_multiplier() -> u32 {
    DEFAULT_RETENTION_MULTIPLIER
}

impl RetentionConfig {
    /// Build a config from the flat key/value options a host daemon passes to
    /// its modules.
    ///
    /// Lenient like the daemon's own module loader: unknown keys are ignored
    /// and a bad `retention_multiplier` falls back to the default. Structural
    /// problems are left to [`validate`](Self::validate).
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| options.get(*k))
                .map(|v| v.trim().to_string())
        };

        let mut cfg = RetentionConfig::default();

        if let Some(raw) = get(&["high_availability"]) {
            cfg.high_availability = parse_bool(&raw);
        }
        cfg.endpoint = get(&["endpoint", "stand_alone"]).filter(|v| !v.is_empty());
        if let Some(raw) = get(&["replica_members", "replica_set"]) {
            cfg.replica_members = split_members(&raw);
        }
        if let Some(database) = get(&["database"]) {
            cfg.database = database;
        }
        if let Some(username) = get(&["username"]) {
            cfg.username = username;
        }
        if let Some(password) = options.get("password") {
            cfg.password = password.clone();
        }
        if let Some(opts) = get(&["connection_options", "url_options"]) {
            cfg.connection_options = opts;
        }
        if let Some(raw) = get(&["retention_multiplier"]) {
            cfg.retention_multiplier = match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(
                        value = %raw,
                        fallback = DEFAULT_RETENTION_MULTIPLIER,
                        "invalid retention_multiplier, using default"
                    );
                    DEFAULT_RETENTION_MULTIPLIER
                }
            };
        }

        cfg
    }

    /// Fail-fast checks run once at module initialisation.
    pub fn validate(&self) -> Result<()> {
        if self.high_availability {
            if self.replica_members.iter().all(|m| m.trim().is_empty()) {
                return Err(RetentionError::Configuration(
                    "high_availability is enabled but replica_members is empty".into(),
                ));
            }
        } else if self
            .endpoint
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
        {
            return Err(RetentionError::Configuration(
                "high_availability is disabled but endpoint is not configured".into(),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(RetentionError::Configuration("database must not be empty".into()));
        }
        if self.retention_multiplier == 0 {
            return Err(RetentionError::Configuration(
                "retention_multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Validate and assemble the store target. Performs no network or disk I/O.
    pub fn connection_target(&self) -> Result<ConnectionTarget> {
        self.validate()?;
        let topology = if self.high_availability {
            Topology::ReplicaSet(
                self.replica_members
                    .iter()
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect(),
            )
        } else {
            Topology::Standalone(self.endpoint.as_deref().unwrap_or_default().trim().to_string())
        };
        Ok(ConnectionTarget {
            topology,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            options: self.connection_options.clone(),
        })
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_members(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}
