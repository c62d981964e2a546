use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ServiceKey
// ---------------------------------------------------------------------------

/// A service is identified by the host it runs on plus its description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    pub host_name: String,
    pub service_description: String,
}

impl ServiceKey {
    pub fn new(host_name: impl Into<String>, service_description: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            service_description: service_description.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

const HOST_PREFIX: &str = "HOST-";
const SERVICE_PREFIX: &str = "SERVICE-";

/// Stable document key for one host or one host+service pair.
///
/// Renders as `HOST-<host_name>` or `SERVICE-<host_name>,<service_description>`.
/// Renaming a service description yields a different key; the old record is
/// simply never matched again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    Host(String),
    Service(ServiceKey),
}

impl EntityId {
    pub fn host(host_name: impl Into<String>) -> Self {
        EntityId::Host(host_name.into())
    }

    pub fn service(host_name: impl Into<String>, service_description: impl Into<String>) -> Self {
        EntityId::Service(ServiceKey::new(host_name, service_description))
    }

    /// Parse a stored `_id`. Services split on the first comma, so a
    /// description may itself contain commas.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(host) = raw.strip_prefix(HOST_PREFIX) {
            return Some(EntityId::host(host));
        }
        let rest = raw.strip_prefix(SERVICE_PREFIX)?;
        let (host, description) = rest.split_once(',')?;
        Some(EntityId::service(host, description))
    }

    /// The collection a record with this key belongs to.
    pub fn collection(&self) -> Collection {
        match self {
            EntityId::Host(_) => Collection::Hosts,
            EntityId::Service(_) => Collection::Services,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Host(name) => write!(f, "{HOST_PREFIX}{name}"),
            EntityId::Service(key) => write!(
                f,
                "{SERVICE_PREFIX}{},{}",
                key.host_name, key.service_description
            ),
        }
    }
}

impl From<&ServiceKey> for EntityId {
    fn from(key: &ServiceKey) -> Self {
        EntityId::Service(key.clone())
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// The two record collections kept in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Hosts,
    Services,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Hosts, Collection::Services];

    /// Collection name inside the store.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Hosts => "host_retentions",
            Collection::Services => "service_retentions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// RetentionRecord
// ---------------------------------------------------------------------------

/// One persisted document: `{_id, value, timestamp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRecord {
    #[serde(rename = "_id")]
    pub id: String,
    /// Text-safe encoded blob, see [`crate::codec`].
    pub value: String,
    /// Unix seconds at which the record was built.
    pub timestamp: i64,
}

impl RetentionRecord {
    pub fn new(id: &EntityId, value: String, timestamp: i64) -> Self {
        Self {
            id: id.to_string(),
            value,
            timestamp,
        }
    }

    /// Build a record stamped with the current time.
    pub fn now(id: &EntityId, value: String) -> Self {
        Self::new(id, value, Utc::now().timestamp())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of every host and service retention value.
///
/// The daemon hands this over by value; nothing in it points back into live
/// daemon state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<V> {
    pub hosts: HashMap<String, V>,
    pub services: HashMap<ServiceKey, V>,
}

impl<V> Snapshot<V> {
    pub fn new() -> Self {
        Self {
            hosts: HashMap::new(),
            services: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.services.is_empty()
    }

    /// Total number of entities carried.
    pub fn len(&self) -> usize {
        self.hosts.len() + self.services.len()
    }
}

impl<V> Default for Snapshot<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_service_keys_render_with_prefix() {
        assert_eq!(EntityId::host("web-01").to_string(), "HOST-web-01");
        assert_eq!(
            EntityId::service("web-01", "HTTP").to_string(),
            "SERVICE-web-01,HTTP"
        );
    }

    #[test]
    fn same_host_name_always_maps_to_same_key() {
        assert_eq!(
            EntityId::host("db").to_string(),
            EntityId::host(String::from("db")).to_string()
        );
    }

    #[test]
    fn renamed_service_gets_a_new_key() {
        let before = EntityId::service("web-01", "HTTP");
        let after = EntityId::service("web-01", "HTTPS");
        assert_ne!(before.to_string(), after.to_string());
    }

    #[test]
    fn parse_splits_service_on_first_comma() {
        let id = EntityId::parse("SERVICE-web-01,Disk /var, /tmp").expect("parse");
        assert_eq!(id, EntityId::service("web-01", "Disk /var, /tmp"));
        assert_eq!(id.collection(), Collection::Services);
    }

    #[test]
    fn parse_rejects_unknown_prefix() {
        assert!(EntityId::parse("CONTACT-bob").is_none());
        assert!(EntityId::parse("SERVICE-no-comma").is_none());
    }

    #[test]
    fn parse_inverts_display() {
        for id in [EntityId::host("a"), EntityId::service("a", "svc1")] {
            assert_eq!(EntityId::parse(&id.to_string()), Some(id));
        }
    }

    #[test]
    fn record_serializes_id_as_underscore_id() {
        let rec = RetentionRecord::new(&EntityId::host("a"), "blob".into(), 42);
        let json = serde_json::to_value(&rec).expect("serialize");
        assert_eq!(json["_id"], "HOST-a");
        assert_eq!(json["timestamp"], 42);
    }
}
