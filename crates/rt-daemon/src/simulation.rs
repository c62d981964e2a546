//! A stand-in monitoring daemon with hosts and services whose check state
//! changes every round. Drives the `rt-daemon` binary.

use std::collections::BTreeMap;

use chrono::Utc;
use rt_core::types::{ServiceKey, Snapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::host::RetentionHost;

const SERVICE_NAMES: [&str; 5] = ["cpu", "disk", "http", "memory", "ping"];
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

/// Retention state of one simulated host or service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckState {
    pub status: CheckStatus,
    pub attempt: u32,
    pub last_check: i64,
    pub output: String,
    pub checks_run: u64,
}

impl Default for CheckState {
    fn default() -> Self {
        Self {
            status: CheckStatus::Unknown,
            attempt: 0,
            last_check: 0,
            output: "pending".into(),
            checks_run: 0,
        }
    }
}

impl CheckState {
    fn advance(&mut self, seed: usize) {
        self.checks_run += 1;
        self.status = match (self.checks_run as usize + seed) % 7 {
            5 => CheckStatus::Warning,
            6 => CheckStatus::Critical,
            _ => CheckStatus::Ok,
        };
        self.attempt = if self.status == CheckStatus::Ok {
            1
        } else {
            (self.attempt + 1).min(MAX_ATTEMPTS)
        };
        self.last_check = Utc::now().timestamp();
        self.output = format!("{:?} after {} checks", self.status, self.checks_run);
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedMonitor {
    hosts: BTreeMap<String, CheckState>,
    services: BTreeMap<ServiceKey, CheckState>,
}

impl SimulatedMonitor {
    pub fn new(hosts: usize, services_per_host: usize) -> Self {
        let mut monitor = Self::default();
        for h in 0..hosts {
            let host_name = format!("host-{:02}", h + 1);
            for s in 0..services_per_host {
                let base = SERVICE_NAMES[s % SERVICE_NAMES.len()];
                let description = if s < SERVICE_NAMES.len() {
                    base.to_string()
                } else {
                    format!("{base}-{}", s / SERVICE_NAMES.len())
                };
                monitor
                    .services
                    .insert(ServiceKey::new(host_name.clone(), description), CheckState::default());
            }
            monitor.hosts.insert(host_name, CheckState::default());
        }
        monitor
    }

    /// One round of checks over every entity.
    pub fn run_checks(&mut self) {
        for (i, state) in self.hosts.values_mut().enumerate() {
            state.advance(i);
        }
        for (i, state) in self.services.values_mut().enumerate() {
            state.advance(i);
        }
    }

    pub fn host_state(&self, host_name: &str) -> Option<&CheckState> {
        self.hosts.get(host_name)
    }

    pub fn service_state(&self, key: &ServiceKey) -> Option<&CheckState> {
        self.services.get(key)
    }
}

impl RetentionHost for SimulatedMonitor {
    type Value = CheckState;

    fn retention_snapshot(&self) -> Snapshot<CheckState> {
        Snapshot {
            hosts: self.hosts.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            services: self
                .services
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn apply_retention(&mut self, restored: Snapshot<CheckState>) {
        let mut applied = 0usize;
        for (name, state) in restored.hosts {
            if let Some(slot) = self.hosts.get_mut(&name) {
                *slot = state;
                applied += 1;
            }
        }
        for (key, state) in restored.services {
            if let Some(slot) = self.services.get_mut(&key) {
                *slot = state;
                applied += 1;
            }
        }
        debug!(applied, "retention applied to simulated monitor");
    }

    fn host_names(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }

    fn service_keys(&self) -> Vec<ServiceKey> {
        self.services.keys().cloned().collect()
    }
}
