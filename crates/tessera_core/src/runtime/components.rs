//! Typed component registration and the code-loading seam.
//!
//! # Responsibility
//! - Associate each tag with its static metadata and a view factory.
//! - Abstract "import extension code by path" behind [`CodeLoader`].
//!
//! # Invariants
//! - At most one registration per tag; re-registering requires `unregister`.
//! - A registration's metadata tag equals the tag it is registered under.

use crate::model::extension::{ExtensionMetadata, Tag};
use crate::render::ComponentView;
use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Builds a fresh view for one mounted instance.
pub type ComponentFactory = Arc<dyn Fn(&ExtensionMetadata) -> Box<dyn ComponentView> + Send + Sync>;

/// In-process module initializer; registers the module's components.
pub type ModuleInit = Arc<dyn Fn(&ComponentRegistry) -> Result<(), ImportError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    AlreadyRegistered(Tag),
    TagMismatch { tag: Tag, metadata_tag: Tag },
}

impl Display for ComponentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRegistered(tag) => write!(f, "component already registered: {tag}"),
            Self::TagMismatch { tag, metadata_tag } => write!(
                f,
                "component {tag} registered with metadata for {metadata_tag}"
            ),
        }
    }
}

impl Error for ComponentError {}

/// Extension code could not be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    ModuleNotFound(String),
    Registration(ComponentError),
    Failed(String),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModuleNotFound(entry) => write!(f, "no module at {entry}"),
            Self::Registration(err) => write!(f, "{err}"),
            Self::Failed(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registration(err) => Some(err),
            Self::ModuleNotFound(_) | Self::Failed(_) => None,
        }
    }
}

impl From<ComponentError> for ImportError {
    fn from(value: ComponentError) -> Self {
        Self::Registration(value)
    }
}

struct Registration {
    metadata: Arc<ExtensionMetadata>,
    factory: ComponentFactory,
}

/// Tag-keyed registry of component types.
#[derive(Default)]
pub struct ComponentRegistry {
    entries: Mutex<HashMap<Tag, Registration>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_component<F>(
        &self,
        tag: impl Into<String>,
        metadata: ExtensionMetadata,
        factory: F,
    ) -> Result<(), ComponentError>
    where
        F: Fn(&ExtensionMetadata) -> Box<dyn ComponentView> + Send + Sync + 'static,
    {
        let tag = tag.into();
        if metadata.tag != tag {
            return Err(ComponentError::TagMismatch {
                tag,
                metadata_tag: metadata.tag,
            });
        }

        let mut entries = self.lock();
        if entries.contains_key(&tag) {
            return Err(ComponentError::AlreadyRegistered(tag));
        }
        debug!("event=component_register module=runtime status=ok tag={tag}");
        entries.insert(
            tag,
            Registration {
                metadata: Arc::new(metadata),
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.lock().contains_key(tag)
    }

    /// Metadata the component was registered with.
    pub fn metadata(&self, tag: &str) -> Option<Arc<ExtensionMetadata>> {
        self.lock()
            .get(tag)
            .map(|registration| Arc::clone(&registration.metadata))
    }

    /// Instantiates a view for `tag`; the factory runs outside the lock.
    pub fn create(&self, tag: &str, metadata: &ExtensionMetadata) -> Option<Box<dyn ComponentView>> {
        let factory = self
            .lock()
            .get(tag)
            .map(|registration| Arc::clone(&registration.factory))?;
        Some(factory(metadata))
    }

    pub fn unregister(&self, tag: &str) -> bool {
        self.lock().remove(tag).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.lock().keys().cloned().collect();
        tags.sort();
        tags
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Tag, Registration>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Imports extension code from a resolved entry path.
///
/// A successful import is expected to register the extension's component
/// in `registry`; callers do not verify it.
#[async_trait]
pub trait CodeLoader: Send + Sync {
    async fn import(
        &self,
        tag: &str,
        entry: &str,
        registry: &ComponentRegistry,
    ) -> Result<(), ImportError>;
}

/// Code loader backed by module initializers compiled into the host.
#[derive(Default)]
pub struct ModuleCatalog {
    modules: Mutex<BTreeMap<String, ModuleInit>>,
    imports: AtomicUsize,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the initializer served at `entry` (a resolved component path).
    pub fn register_module<F>(&self, entry: impl Into<String>, init: F)
    where
        F: Fn(&ComponentRegistry) -> Result<(), ImportError> + Send + Sync + 'static,
    {
        self.lock().insert(entry.into(), Arc::new(init));
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.lock().contains_key(entry)
    }

    /// Imports attempted so far, successful or not.
    pub fn import_count(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, ModuleInit>> {
        self.modules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CodeLoader for ModuleCatalog {
    async fn import(
        &self,
        tag: &str,
        entry: &str,
        registry: &ComponentRegistry,
    ) -> Result<(), ImportError> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        let init = self.lock().get(entry).cloned();
        // Import is a suspension point even for in-process modules.
        tokio::task::yield_now().await;
        let Some(init) = init else {
            return Err(ImportError::ModuleNotFound(entry.to_string()));
        };
        debug!("event=module_import module=runtime status=start tag={tag} entry={entry}");
        init(registry)
    }
}
