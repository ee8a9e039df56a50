//! SQLite-backed extension registry.
//!
//! # Responsibility
//! - Keep SQL details inside the registry persistence boundary.
//! - Store each record as an opaque JSON document keyed by tag.
//!
//! # Invariants
//! - The connection is opened lazily on first use and reused afterwards.
//! - SQLite work, including the open and migrations, runs on the blocking
//!   pool; async callers only await it.
//! - Read paths reject undecodable persisted records instead of masking them.

use super::{ExtensionStore, StoreError, StoreResult};
use crate::db::{open_db, open_db_in_memory, EXTENSIONS_TABLE};
use crate::model::extension::ExtensionMetadata;
use async_trait::async_trait;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where the registry database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// SQLite extension store.
pub struct SqliteExtensionStore {
    inner: Arc<Shared>,
}

struct Shared {
    location: StoreLocation,
    conn: Mutex<Option<Connection>>,
}

impl SqliteExtensionStore {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            inner: Arc::new(Shared {
                location,
                conn: Mutex::new(None),
            }),
        }
    }

    pub fn open_file(path: impl Into<PathBuf>) -> Self {
        Self::new(StoreLocation::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::new(StoreLocation::Memory)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.inner.location
    }

    /// Runs `op` against the open connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut slot = inner.lock();
            inner.ensure_open(&mut slot)?;
            match slot.as_ref() {
                Some(conn) => op(conn),
                None => Err(StoreError::Unavailable("connection not open".to_string())),
            }
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("store task failed: {err}")))?
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self, slot: &mut Option<Connection>) -> StoreResult<()> {
        if slot.is_some() {
            return Ok(());
        }
        let opened = match &self.location {
            StoreLocation::File(path) => open_db(path),
            StoreLocation::Memory => open_db_in_memory(),
        };
        match opened {
            Ok(conn) => {
                *slot = Some(conn);
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=store_init module=store status=warn error_code=storage_unavailable error={err}"
                );
                Err(StoreError::Unavailable(err.to_string()))
            }
        }
    }
}

#[async_trait]
impl ExtensionStore for SqliteExtensionStore {
    async fn init(&self) -> StoreResult<()> {
        self.with_conn(|_| Ok(())).await
    }

    async fn is_empty(&self) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {EXTENSIONS_TABLE};"),
                [],
                |row| row.get(0),
            )?;
            Ok(count == 0)
        })
        .await
    }

    async fn list(&self) -> StoreResult<Vec<ExtensionMetadata>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT tag, record FROM {EXTENSIONS_TABLE};"))?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let tag: String = row.get(0)?;
                let raw: String = row.get(1)?;
                records.push(decode_record(&tag, &raw)?);
            }
            Ok(records)
        })
        .await
    }

    async fn get(&self, tag: &str) -> StoreResult<Option<ExtensionMetadata>> {
        let tag = tag.to_string();
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    &format!("SELECT record FROM {EXTENSIONS_TABLE} WHERE tag = ?1;"),
                    [tag.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|raw| decode_record(&tag, &raw)).transpose()
        })
        .await
    }

    async fn save(&self, record: &ExtensionMetadata) -> StoreResult<()> {
        let raw = serde_json::to_string(record).map_err(|err| {
            StoreError::InvalidData(format!("cannot encode record `{}`: {err}", record.tag))
        })?;
        let tag = record.tag.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {EXTENSIONS_TABLE} (tag, record) VALUES (?1, ?2)
                     ON CONFLICT(tag) DO UPDATE SET
                        record = excluded.record,
                        updated_at = (strftime('%s', 'now') * 1000);"
                ),
                params![tag.as_str(), raw],
            )?;
            debug!("event=store_save module=store status=ok tag={tag}");
            Ok(())
        })
        .await
    }

    async fn remove(&self, tag: &str) -> StoreResult<()> {
        let tag = tag.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                &format!("DELETE FROM {EXTENSIONS_TABLE} WHERE tag = ?1;"),
                [tag.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(&format!("DELETE FROM {EXTENSIONS_TABLE};"), [])?;
            Ok(())
        })
        .await
    }
}

fn decode_record(tag: &str, raw: &str) -> StoreResult<ExtensionMetadata> {
    let record: ExtensionMetadata = serde_json::from_str(raw).map_err(|err| {
        StoreError::InvalidData(format!("record for `{tag}` is not decodable: {err}"))
    })?;
    if record.tag != tag {
        return Err(StoreError::InvalidData(format!(
            "record stored under `{tag}` carries tag `{}`",
            record.tag
        )));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::SqliteExtensionStore;
    use crate::model::extension::ExtensionMetadata;
    use crate::store::{ExtensionStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn init_is_idempotent_and_starts_empty() {
        let store = SqliteExtensionStore::in_memory();
        store.init().await.unwrap();
        store.init().await.unwrap();
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn save_is_an_upsert_by_tag() {
        let store = SqliteExtensionStore::in_memory();
        store
            .save(&ExtensionMetadata::new("ext-a", "A").with_version("1.0.0"))
            .await
            .unwrap();
        store
            .save(&ExtensionMetadata::new("ext-a", "A").with_version("1.1.0"))
            .await
            .unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].version.as_deref(), Some("1.1.0"));
    }

    #[tokio::test]
    async fn unopenable_file_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteExtensionStore::open_file(dir.path().join("missing/nested/registry.db"));
        let err = store.init().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        let err = store.list().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn store_io_leaves_the_runtime_thread_free() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteExtensionStore::open_file(dir.path().join("registry.db")));
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        for i in 0..20 {
            store
                .save(&ExtensionMetadata::new(format!("ext-{i}"), "x"))
                .await
                .unwrap();
        }
        ticker.abort();

        assert_eq!(store.list().await.unwrap().len(), 20);
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }
}
