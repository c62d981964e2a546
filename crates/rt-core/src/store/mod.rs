//! Document-store access.
//!
//! Drivers implement [`DocumentStore`] and hand out [`StoreConnection`]s.
//! Callers never touch a connection directly; they go through [`StoreClient`],
//! which owns one connection for its whole lifetime and releases it on every
//! exit path (explicit [`StoreClient::disconnect`] or drop).

mod memory;
mod sqlite;
mod target;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use target::{ConnectionTarget, Topology};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Result, RetentionError};
use crate::types::{Collection, RetentionRecord};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("backend: {0}")]
    Backend(String),
    #[error("connection closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Driver traits
// ---------------------------------------------------------------------------

/// A document-store driver.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a fresh connection. Topology resolution is the driver's business.
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> std::result::Result<Box<dyn StoreConnection>, StoreError>;
}

/// One open connection to a store database.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    async fn find_all(
        &self,
        collection: Collection,
    ) -> std::result::Result<Vec<RetentionRecord>, StoreError>;

    /// Remove the record with this id, if any.
    async fn remove(&self, collection: Collection, id: &str) -> std::result::Result<(), StoreError>;

    /// Insert a new record. Fails with [`StoreError::DuplicateKey`] when the
    /// id is already present.
    async fn insert(
        &self,
        collection: Collection,
        record: RetentionRecord,
    ) -> std::result::Result<(), StoreError>;

    async fn close(self: Box<Self>) -> std::result::Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// StoreClient
// ---------------------------------------------------------------------------

/// Owns a single store connection.
pub struct StoreClient {
    conn: Option<Box<dyn StoreConnection>>,
}

impl StoreClient {
    pub async fn connect(store: &dyn DocumentStore, target: &ConnectionTarget) -> Result<Self> {
        let conn = store.connect(target).await.map_err(|e| {
            warn!(uri = %target.redacted_uri(), error = %e, "cannot connect to retention store");
            RetentionError::Connection(e)
        })?;
        debug!(database = %target.database, "retention store connected");
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&self) -> std::result::Result<&dyn StoreConnection, StoreError> {
        self.conn.as_deref().ok_or(StoreError::Closed)
    }

    /// Replace every record: remove any existing document with the same id,
    /// then insert the new one. Not atomic per record; a crash between the
    /// two leaves that id absent until the next full cycle.
    pub async fn write(&self, collection: Collection, records: Vec<RetentionRecord>) -> Result<usize> {
        let write_err = |source| RetentionError::StoreWrite {
            collection: collection.name(),
            source,
        };
        let conn = self.conn().map_err(write_err)?;
        let mut written = 0;
        for record in records {
            conn.remove(collection, &record.id).await.map_err(write_err)?;
            conn.insert(collection, record).await.map_err(write_err)?;
            written += 1;
        }
        Ok(written)
    }

    pub async fn read_all(&self, collection: Collection) -> Result<Vec<RetentionRecord>> {
        let read_err = |source| RetentionError::StoreRead {
            collection: collection.name(),
            source,
        };
        let conn = self.conn().map_err(read_err)?;
        conn.find_all(collection).await.map_err(read_err)
    }

    /// Close the connection. Errors while closing are only logged.
    pub async fn disconnect(mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "error while closing retention store connection");
            } else {
                debug!("retention store disconnected");
            }
        }
    }
}
