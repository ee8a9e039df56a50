//! In-memory mirror of the registry with per-tag load state.
//!
//! # Invariants
//! - At most one in-flight load per tag; it is identified by a load id so a
//!   completion that lost a race with `upsert`/`remove` cannot mark the
//!   replacement entry loaded.
//! - `loaded` only becomes true after the import for the current entry
//!   resolved successfully.
//! - `rebuild` clears before inserting; no stale entry survives it.

use super::loader::LoadError;
use crate::model::extension::{ExtensionMetadata, Tag};
use futures::future::{BoxFuture, Shared};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) type LoadFuture = Shared<BoxFuture<'static, Result<(), LoadError>>>;

struct RuntimeEntry {
    metadata: Arc<ExtensionMetadata>,
    loaded: bool,
    in_flight: Option<(u64, LoadFuture)>,
}

impl RuntimeEntry {
    fn new(metadata: ExtensionMetadata) -> Self {
        Self {
            metadata: Arc::new(metadata.with_defaults()),
            loaded: false,
            in_flight: None,
        }
    }
}

/// What `load` must do for a tag.
pub(crate) enum LoadState {
    Unknown,
    MissingPath,
    Loaded,
    Pending(LoadFuture),
}

#[derive(Default)]
pub struct ExtensionDirectory {
    entries: Mutex<BTreeMap<Tag, RuntimeEntry>>,
}

impl ExtensionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole directory with `records`.
    pub fn rebuild(&self, records: impl IntoIterator<Item = ExtensionMetadata>) {
        let mut entries = self.lock();
        entries.clear();
        for record in records {
            entries.insert(record.tag.clone(), RuntimeEntry::new(record));
        }
    }

    /// Inserts or replaces one entry; the replacement starts unloaded.
    pub fn upsert(&self, metadata: ExtensionMetadata) {
        self.lock()
            .insert(metadata.tag.clone(), RuntimeEntry::new(metadata));
    }

    pub fn remove(&self, tag: &str) -> bool {
        self.lock().remove(tag).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn get(&self, tag: &str) -> Option<Arc<ExtensionMetadata>> {
        self.lock()
            .get(tag)
            .map(|entry| Arc::clone(&entry.metadata))
    }

    pub fn list_available(&self) -> Vec<Arc<ExtensionMetadata>> {
        self.lock()
            .values()
            .map(|entry| Arc::clone(&entry.metadata))
            .collect()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.lock().keys().cloned().collect()
    }

    pub fn is_loaded(&self, tag: &str) -> bool {
        self.lock().get(tag).is_some_and(|entry| entry.loaded)
    }

    pub fn is_loading(&self, tag: &str) -> bool {
        self.lock()
            .get(tag)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves the load state of `tag`, registering a new in-flight load
    /// built by `start(code_path)` when none exists.
    pub(crate) fn claim_load(
        &self,
        tag: &str,
        id: u64,
        start: impl FnOnce(&str) -> LoadFuture,
    ) -> LoadState {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(tag) else {
            return LoadState::Unknown;
        };
        if entry.loaded {
            return LoadState::Loaded;
        }
        if let Some((_, pending)) = &entry.in_flight {
            return LoadState::Pending(pending.clone());
        }
        let Some(code_path) = entry.metadata.code_path() else {
            return LoadState::MissingPath;
        };
        let pending = start(code_path);
        entry.in_flight = Some((id, pending.clone()));
        LoadState::Pending(pending)
    }

    /// Settles load `id`; ignored when the entry has since been replaced.
    pub(crate) fn finish_load(&self, tag: &str, id: u64, succeeded: bool) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(tag) else {
            return;
        };
        if !matches!(&entry.in_flight, Some((current, _)) if *current == id) {
            return;
        }
        entry.in_flight = None;
        entry.loaded = succeeded;
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Tag, RuntimeEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
