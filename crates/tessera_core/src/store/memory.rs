//! In-memory extension registry.
//!
//! Used as the fallback when the durable store cannot be opened, and by
//! tests that need a registry without SQLite.

use super::{ExtensionStore, StoreResult};
use crate::model::extension::{ExtensionMetadata, Tag};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryExtensionStore {
    records: Mutex<BTreeMap<Tag, ExtensionMetadata>>,
}

impl MemoryExtensionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = ExtensionMetadata>) -> Self {
        let store = Self::default();
        {
            let mut map = store.lock();
            for record in records {
                map.insert(record.tag.clone(), record);
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Tag, ExtensionMetadata>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ExtensionStore for MemoryExtensionStore {
    async fn init(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.lock().is_empty())
    }

    async fn list(&self) -> StoreResult<Vec<ExtensionMetadata>> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn get(&self, tag: &str) -> StoreResult<Option<ExtensionMetadata>> {
        Ok(self.lock().get(tag).cloned())
    }

    async fn save(&self, record: &ExtensionMetadata) -> StoreResult<()> {
        self.lock().insert(record.tag.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, tag: &str) -> StoreResult<()> {
        self.lock().remove(tag);
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.lock().clear();
        Ok(())
    }
}
