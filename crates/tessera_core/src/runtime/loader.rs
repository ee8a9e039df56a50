//! At-most-once extension code loading.
//!
//! # Responsibility
//! - Resolve a tag's code entry and import it exactly once.
//! - Share one in-flight import between every concurrent caller of a tag.
//!
//! # Invariants
//! - Unknown tags and tags without a code path are warned no-ops.
//! - A failed import is reported to every awaiting caller, then forgotten;
//!   the next `load` retries.

use super::components::{CodeLoader, ComponentRegistry};
use super::directory::{ExtensionDirectory, LoadFuture, LoadState};
use crate::assets::AssetPaths;
use crate::model::extension::{ExtensionMetadata, Tag};
use futures::future::try_join_all;
use futures::FutureExt;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Import of a tag's code failed; shared by every awaiter of that import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub tag: Tag,
    pub entry: String,
    pub message: String,
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "extension {} failed to load from {}: {}",
            self.tag, self.entry, self.message
        )
    }
}

impl Error for LoadError {}

pub struct ExtensionLoader {
    directory: Arc<ExtensionDirectory>,
    code: Arc<dyn CodeLoader>,
    components: Arc<ComponentRegistry>,
    paths: AssetPaths,
    next_id: AtomicU64,
}

impl ExtensionLoader {
    pub fn new(
        directory: Arc<ExtensionDirectory>,
        code: Arc<dyn CodeLoader>,
        components: Arc<ComponentRegistry>,
        paths: AssetPaths,
    ) -> Self {
        Self {
            directory,
            code,
            components,
            paths,
            next_id: AtomicU64::new(1),
        }
    }

    /// Loads the code of `tag`, joining an import already in flight.
    pub async fn load(&self, tag: &str) -> Result<(), LoadError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = self
            .directory
            .claim_load(tag, id, |code_path| self.start_import(tag, id, code_path));

        match state {
            LoadState::Loaded => Ok(()),
            LoadState::Pending(pending) => pending.await,
            LoadState::Unknown => {
                warn!(
                    "event=extension_load module=runtime status=warn error_code=extension_not_registered tag={tag}"
                );
                Ok(())
            }
            LoadState::MissingPath => {
                warn!(
                    "event=extension_load module=runtime status=warn error_code=extension_path_missing tag={tag}"
                );
                Ok(())
            }
        }
    }

    /// Loads every dependency of `metadata` concurrently.
    pub async fn load_dependencies(&self, metadata: &ExtensionMetadata) -> Result<(), LoadError> {
        if metadata.dependencies.is_empty() {
            return Ok(());
        }
        try_join_all(metadata.dependencies.iter().map(|dep| self.load(dep))).await?;
        Ok(())
    }

    fn start_import(&self, tag: &str, id: u64, code_path: &str) -> LoadFuture {
        let tag = tag.to_string();
        let entry = self.paths.component_path(code_path);
        let directory = Arc::clone(&self.directory);
        let code = Arc::clone(&self.code);
        let components = Arc::clone(&self.components);

        async move {
            info!("event=extension_load module=runtime status=start tag={tag} entry={entry}");
            let result = code
                .import(&tag, &entry, &components)
                .await
                .map_err(|err| LoadError {
                    tag: tag.clone(),
                    entry: entry.clone(),
                    message: err.to_string(),
                });
            directory.finish_load(&tag, id, result.is_ok());

            match &result {
                Ok(()) => info!("event=extension_load module=runtime status=ok tag={tag}"),
                Err(err) => error!(
                    "event=extension_load module=runtime status=error error_code=extension_load_failed tag={tag} error={err}"
                ),
            }
            result
        }
        .boxed()
        .shared()
    }
}
