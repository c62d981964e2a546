use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ConnectionTarget, DocumentStore, StoreConnection, StoreError};
use crate::types::{Collection, RetentionRecord};

type Documents = BTreeMap<String, RetentionRecord>;

#[derive(Default)]
struct MemoryState {
    databases: HashMap<String, HashMap<Collection, Documents>>,
    offline: HashSet<String>,
    unreachable: bool,
}

/// Process-local document store.
///
/// Clones share the same data, so a test can keep one handle for inspection
/// while the code under test connects through another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    open_connections: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every address unreachable (or reachable again).
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.unreachable = !reachable;
    }

    /// Mark a single address as down.
    pub async fn take_offline(&self, address: impl Into<String>) {
        self.state.lock().await.offline.insert(address.into());
    }

    pub async fn bring_online(&self, address: &str) {
        self.state.lock().await.offline.remove(address);
    }

    /// Connections handed out and not yet closed or dropped.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// All records of one collection, ordered by id.
    pub async fn records(&self, database: &str, collection: Collection) -> Vec<RetentionRecord> {
        let state = self.state.lock().await;
        state
            .databases
            .get(database)
            .and_then(|db| db.get(&collection))
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Put a record in place directly, replacing any existing one.
    pub async fn seed(&self, database: &str, collection: Collection, record: RetentionRecord) {
        let mut state = self.state.lock().await;
        state
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(collection)
            .or_default()
            .insert(record.id.clone(), record);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<Box<dyn StoreConnection>, StoreError> {
        let addresses = target.topology.addresses();
        if addresses.is_empty() || addresses.iter().any(|a| a.trim().is_empty()) {
            return Err(StoreError::InvalidTarget(target.redacted_uri()));
        }

        let state = self.state.lock().await;
        if state.unreachable {
            return Err(StoreError::Unreachable(addresses.join(",")));
        }
        if addresses.iter().all(|a| state.offline.contains(*a)) {
            return Err(StoreError::Unreachable(addresses.join(",")));
        }
        drop(state);

        self.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            database: target.database.clone(),
            open_connections: Arc::clone(&self.open_connections),
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    database: String,
    open_connections: Arc<AtomicUsize>,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn find_all(&self, collection: Collection) -> Result<Vec<RetentionRecord>, StoreError> {
        let state = self.state.lock().await;
        if state.unreachable {
            return Err(StoreError::Unreachable(self.database.clone()));
        }
        Ok(state
            .databases
            .get(&self.database)
            .and_then(|db| db.get(&collection))
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.unreachable {
            return Err(StoreError::Unreachable(self.database.clone()));
        }
        if let Some(docs) = state
            .databases
            .get_mut(&self.database)
            .and_then(|db| db.get_mut(&collection))
        {
            docs.remove(id);
        }
        Ok(())
    }

    async fn insert(&self, collection: Collection, record: RetentionRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.unreachable {
            return Err(StoreError::Unreachable(self.database.clone()));
        }
        let docs = state
            .databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection)
            .or_default();
        if docs.contains_key(&record.id) {
            return Err(StoreError::DuplicateKey(record.id));
        }
        docs.insert(record.id.clone(), record);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        // Drop does the bookkeeping.
        Ok(())
    }
}
