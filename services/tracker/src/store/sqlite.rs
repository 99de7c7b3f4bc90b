//! SQLite-based status store.
//!
//! This provides durable storage for the latest task and device statuses,
//! enabling the tracker to hydrate its cache after a restart.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{KeyValueStore, StoreError};

/// SQLite status store. Queries run on the blocking thread pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a status store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS statuses (
                    key TEXT PRIMARY KEY,
                    value BLOB NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                "#,
            )?;
            Ok(())
        })?;

        debug!("Status store schema initialized");
        Ok(())
    }

    /// Number of persisted statuses.
    pub fn len(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM statuses", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// Returns true if nothing has been persisted.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        f(&*lock(&self.conn)?)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store query task failed: {e}")))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT value FROM statuses WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound(key))
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let key = key.to_string();
        let now = chrono::Utc::now().timestamp();
        self.blocking(move |conn| {
            conn.execute(
                r#"
                INSERT INTO statuses (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
                params![key, value, now],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_store_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.is_empty().unwrap());

        store.set("task_status/1", b"first".to_vec()).await.unwrap();
        store.set("task_status/1", b"second".to_vec()).await.unwrap();

        assert_eq!(store.get("task_status/1").await.unwrap(), b"second");
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_status_store_missing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.get("device_status/nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_status_store_concurrent_writers() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let writers: Vec<_> = (0..16u8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.set(&format!("task_status/{i}"), vec![i]).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        assert_eq!(store.len().unwrap(), 16);
        assert_eq!(store.get("task_status/7").await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_status_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("status.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("device_status/dev1", b"{}".to_vec()).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("device_status/dev1").await.unwrap(), b"{}");
    }
}
