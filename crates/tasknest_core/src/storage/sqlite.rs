//! SQLite-backed key/value gateway.
//!
//! # Invariants
//! - Writes are upserts; `write_count` increments on every accepted write.
//! - Async reads and writes run on tokio's blocking pool, never on the
//!   auto-save worker's thread.

use super::{PersistenceGateway, StorageError, StorageResult};
use crate::db::{open_db, open_db_in_memory};
use futures::future::{BoxFuture, FutureExt};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SqliteKvGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKvGateway {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Number of accepted writes for `key` (0 when never written).
    pub fn write_count(&self, key: &str) -> StorageResult<u64> {
        let conn = lock(&self.conn)?;
        let count = conn
            .query_row(
                "SELECT write_count FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(count.map_or(0, |value| value.max(0) as u64))
    }

    fn run_blocking<T, F>(&self, op: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        async move {
            tokio::task::spawn_blocking(move || op(&*lock(&conn)?))
                .await
                .map_err(|err| StorageError::Unavailable(format!("sqlite task failed: {err}")))?
        }
        .boxed()
    }
}

fn lock(conn: &Mutex<Connection>) -> StorageResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".to_string()))
}

fn read_value(conn: &Connection, key: &str) -> StorageResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM kv_entries WHERE key = ?1;",
            [key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

fn write_value(conn: &Connection, key: &str, value: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO kv_entries (key, value, updated_at, write_count)
         VALUES (?1, ?2, (strftime('%s', 'now') * 1000), 1)
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at,
            write_count = kv_entries.write_count + 1;",
        params![key, value],
    )?;
    debug!(
        "event=kv_write module=storage status=ok key={} bytes={}",
        key,
        value.len()
    );
    Ok(())
}

impl PersistenceGateway for SqliteKvGateway {
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<Option<String>>> {
        let key = key.to_string();
        self.run_blocking(move |conn| read_value(conn, &key))
    }

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StorageResult<()>> {
        let key = key.to_string();
        self.run_blocking(move |conn| write_value(conn, &key, &value))
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteKvGateway;
    use crate::storage::PersistenceGateway;

    #[tokio::test]
    async fn set_then_get_roundtrip_and_counts_writes() {
        let gateway = SqliteKvGateway::open_in_memory().expect("in-memory gateway");
        assert_eq!(gateway.get_item("tasks").await.unwrap(), None);

        gateway.set_item("tasks", "[]".to_string()).await.unwrap();
        gateway.set_item("tasks", "[1]".to_string()).await.unwrap();

        assert_eq!(
            gateway.get_item("tasks").await.unwrap().as_deref(),
            Some("[1]")
        );
        assert_eq!(gateway.write_count("tasks").unwrap(), 2);
        assert_eq!(gateway.write_count("other").unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writes_from_tasks_are_all_counted() {
        let gateway = std::sync::Arc::new(SqliteKvGateway::open_in_memory().unwrap());
        let mut handles = Vec::new();
        for n in 0..8 {
            let gateway = std::sync::Arc::clone(&gateway);
            handles.push(tokio::spawn(async move {
                gateway.set_item("tasks", format!("[{n}]")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(gateway.write_count("tasks").unwrap(), 8);
    }
}
