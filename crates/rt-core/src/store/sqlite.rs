use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use super::{ConnectionTarget, DocumentStore, StoreConnection, StoreError};
use crate::types::{Collection, RetentionRecord};

/// SQLite-backed document store.
///
/// Every topology address is a directory; the database file is
/// `<address>/<database>.sqlite3` and each collection is a table keyed by
/// `_id`. Replica members are tried in order and the first one that opens is
/// used. Credentials and URI options have no meaning for SQLite and are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct SqliteStore;

impl SqliteStore {
    pub fn new() -> Self {
        Self
    }

    /// Path of the database file for one address.
    pub fn database_path(address: &str, database: &str) -> PathBuf {
        Path::new(address).join(format!("{database}.sqlite3"))
    }

    async fn open(address: &str, database: &str) -> Result<Connection, StoreError> {
        tokio::fs::create_dir_all(address)
            .await
            .map_err(|e| StoreError::Unreachable(format!("{address}: {e}")))?;
        let conn = Connection::open(Self::database_path(address, database))
            .await
            .map_err(|e| StoreError::Unreachable(format!("{address}: {e}")))?;
        init_schema(&conn).await.map_err(backend)?;
        Ok(conn)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<Box<dyn StoreConnection>, StoreError> {
        if target.database.trim().is_empty()
            || target.database.contains(['/', '\\'])
        {
            return Err(StoreError::InvalidTarget(format!(
                "bad database name {:?}",
                target.database
            )));
        }
        let addresses = target.topology.addresses();
        if addresses.is_empty() || addresses.iter().any(|a| a.trim().is_empty()) {
            return Err(StoreError::InvalidTarget(target.redacted_uri()));
        }

        let mut last_err = None;
        for address in addresses {
            match Self::open(address, &target.database).await {
                Ok(conn) => {
                    debug!(address, database = %target.database, "sqlite retention store opened");
                    return Ok(Box::new(SqliteConnection { conn }));
                }
                Err(e) => {
                    warn!(address, error = %e, "retention store member unusable");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Unreachable(target.redacted_uri())))
    }
}

async fn init_schema(conn: &Connection) -> Result<(), tokio_rusqlite::Error> {
    let ddl: String = Collection::ALL
        .iter()
        .map(|c| {
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    _id       TEXT PRIMARY KEY,
                    value     TEXT NOT NULL,
                    timestamp INTEGER NOT NULL
                );",
                c.name()
            )
        })
        .collect();

    conn.call(move |conn| {
        conn.execute_batch(&format!(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;
            {ddl}
            "
        ))?;
        Ok(())
    })
    .await
}

fn backend(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::ConnectionClosed => StoreError::Closed,
        other => StoreError::Backend(other.to_string()),
    }
}

fn is_constraint_violation(e: &tokio_rusqlite::Error) -> bool {
    matches!(
        e,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

struct SqliteConnection {
    conn: Connection,
}

#[async_trait]
impl StoreConnection for SqliteConnection {
    async fn find_all(&self, collection: Collection) -> Result<Vec<RetentionRecord>, StoreError> {
        let table = collection.name();
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT _id, value, timestamp FROM {table} ORDER BY _id"))?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(RetentionRecord {
                        id: row.get(0)?,
                        value: row.get(1)?,
                        timestamp: row.get(2)?,
                    });
                }
                Ok(out)
            })
            .await
            .map_err(backend)
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let table = collection.name();
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!("DELETE FROM {table} WHERE _id = ?1"),
                    rusqlite::params![id],
                )?;
                Ok(())
            })
            .await
            .map_err(backend)
    }

    async fn insert(&self, collection: Collection, record: RetentionRecord) -> Result<(), StoreError> {
        let table = collection.name();
        let id = record.id.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!("INSERT INTO {table} (_id, value, timestamp) VALUES (?1, ?2, ?3)"),
                    rusqlite::params![record.id, record.value, record.timestamp],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::DuplicateKey(id)
                } else {
                    backend(e)
                }
            })
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.conn.close().await.map_err(backend)
    }
}
