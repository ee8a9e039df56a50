//! Runtime context: the one coordinating authority of a host session.
//!
//! # Responsibility
//! - Own the registry, directory, loader, component registry, template
//!   cache and frame clock of one session.
//! - Run startup reconciliation and expose the management operations.
//! - Drive the mount sequence of a component instance.
//!
//! # Invariants
//! - The registry and directory are only mutated through this type.
//! - Storage and manifest failures degrade to an empty registry; they never
//!   fail `init`.

use super::components::{CodeLoader, ComponentRegistry, ModuleCatalog};
use super::directory::ExtensionDirectory;
use super::loader::{ExtensionLoader, LoadError};
use crate::assets::{AssetFetcher, AssetPaths};
use crate::config::RuntimeConfig;
use crate::manifest::{ManifestSynchronizer, SyncReport};
use crate::model::extension::{ExtensionMetadata, MetadataError, Tag};
use crate::render::{ComponentInstance, FrameClock, RenderSurface};
use crate::store::{ExtensionStore, MemoryExtensionStore, SqliteExtensionStore, StoreError};
use crate::template::{PlaceholderCompiler, TemplateCache, TemplateCompiler, TemplateError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub enum RuntimeError {
    Store(StoreError),
    InvalidMetadata(MetadataError),
    Load(LoadError),
    Template(TemplateError),
    /// Code loaded (or had none) but no component is registered for the tag.
    ComponentNotRegistered(Tag),
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidMetadata(err) => write!(f, "{err}"),
            Self::Load(err) => write!(f, "{err}"),
            Self::Template(err) => write!(f, "{err}"),
            Self::ComponentNotRegistered(tag) => {
                write!(f, "no component registered for extension {tag}")
            }
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::InvalidMetadata(err) => Some(err),
            Self::Load(err) => Some(err),
            Self::Template(err) => Some(err),
            Self::ComponentNotRegistered(_) => None,
        }
    }
}

impl From<StoreError> for RuntimeError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<MetadataError> for RuntimeError {
    fn from(value: MetadataError) -> Self {
        Self::InvalidMetadata(value)
    }
}

impl From<LoadError> for RuntimeError {
    fn from(value: LoadError) -> Self {
        Self::Load(value)
    }
}

impl From<TemplateError> for RuntimeError {
    fn from(value: TemplateError) -> Self {
        Self::Template(value)
    }
}

/// Assembles a [`Runtime`]; unset collaborators get built-in defaults.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    fetcher: Arc<dyn AssetFetcher>,
    store: Option<Arc<dyn ExtensionStore>>,
    code: Option<Arc<dyn CodeLoader>>,
    compiler: Option<Arc<dyn TemplateCompiler>>,
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            config,
            fetcher,
            store: None,
            code: None,
            compiler: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn ExtensionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn code_loader(mut self, code: Arc<dyn CodeLoader>) -> Self {
        self.code = Some(code);
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn TemplateCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn build(self) -> Runtime {
        let store: Arc<dyn ExtensionStore> = match (self.store, &self.config.db_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(SqliteExtensionStore::open_file(path.clone())),
            (None, None) => Arc::new(SqliteExtensionStore::in_memory()),
        };
        let code: Arc<dyn CodeLoader> = match self.code {
            Some(code) => code,
            None => Arc::new(ModuleCatalog::new()),
        };
        let compiler: Arc<dyn TemplateCompiler> = match self.compiler {
            Some(compiler) => compiler,
            None => Arc::new(PlaceholderCompiler),
        };

        let paths = self.config.asset_paths();
        let directory = Arc::new(ExtensionDirectory::new());
        let components = Arc::new(ComponentRegistry::new());
        let loader = ExtensionLoader::new(
            Arc::clone(&directory),
            code,
            Arc::clone(&components),
            paths.clone(),
        );
        let templates = TemplateCache::new(self.config.template_cache.max_size);

        Runtime {
            config: self.config,
            paths,
            store: Mutex::new(store),
            fetcher: self.fetcher,
            compiler,
            directory,
            components,
            loader,
            templates,
            frames: Arc::new(FrameClock::new()),
        }
    }
}

pub struct Runtime {
    config: RuntimeConfig,
    paths: AssetPaths,
    store: Mutex<Arc<dyn ExtensionStore>>,
    fetcher: Arc<dyn AssetFetcher>,
    compiler: Arc<dyn TemplateCompiler>,
    directory: Arc<ExtensionDirectory>,
    components: Arc<ComponentRegistry>,
    loader: ExtensionLoader,
    templates: TemplateCache,
    frames: Arc<FrameClock>,
}

impl Runtime {
    pub fn builder(config: RuntimeConfig, fetcher: Arc<dyn AssetFetcher>) -> RuntimeBuilder {
        RuntimeBuilder::new(config, fetcher)
    }

    /// Opens the registry, reconciles the manifest and rebuilds the directory.
    pub async fn init(&self) -> SyncReport {
        let store = self.open_store().await;
        let synchronizer = ManifestSynchronizer::new(
            Arc::clone(&store),
            Arc::clone(&self.fetcher),
            self.paths.clone(),
        );
        let report = match synchronizer.run().await {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    "event=runtime_init module=runtime status=warn error_code=manifest_sync_failed error={err}"
                );
                SyncReport::skipped()
            }
        };

        self.rebuild_directory(store.as_ref()).await;
        info!(
            "event=runtime_init module=runtime status=ok extensions={} added={} updated={} skipped={}",
            self.directory.len(),
            report.added.len(),
            report.updated.len(),
            report.skipped
        );
        report
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn paths(&self) -> &AssetPaths {
        &self.paths
    }

    pub fn directory(&self) -> &ExtensionDirectory {
        &self.directory
    }

    pub fn loader(&self) -> &ExtensionLoader {
        &self.loader
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    pub fn frames(&self) -> &Arc<FrameClock> {
        &self.frames
    }

    /// Registry contents.
    pub async fn list(&self) -> Result<Vec<ExtensionMetadata>, RuntimeError> {
        Ok(self.store().list().await?)
    }

    pub fn list_available(&self) -> Vec<Arc<ExtensionMetadata>> {
        self.directory.list_available()
    }

    pub fn get(&self, tag: &str) -> Option<Arc<ExtensionMetadata>> {
        self.directory.get(tag)
    }

    pub fn get_tags(&self) -> Vec<Tag> {
        self.directory.tags()
    }

    pub fn is_loaded(&self, tag: &str) -> bool {
        self.directory.is_loaded(tag)
    }

    pub async fn load(&self, tag: &str) -> Result<(), LoadError> {
        self.loader.load(tag).await
    }

    /// Persists `metadata` and refreshes its directory entry (unloaded).
    pub async fn save(&self, metadata: ExtensionMetadata) -> Result<(), RuntimeError> {
        metadata.validate()?;
        self.store().save(&metadata).await?;
        self.components.unregister(&metadata.tag);
        info!(
            "event=extension_save module=runtime status=ok tag={}",
            metadata.tag
        );
        self.directory.upsert(metadata);
        Ok(())
    }

    /// Marks `tag` disabled; returns false when it is not in the registry.
    pub async fn disable(&self, tag: &str) -> Result<bool, RuntimeError> {
        let Some(mut metadata) = self.store().get(tag).await? else {
            warn!("event=extension_disable module=runtime status=warn error_code=extension_not_registered tag={tag}");
            return Ok(false);
        };
        metadata.enabled = false;
        self.save(metadata).await?;
        Ok(true)
    }

    pub async fn remove(&self, tag: &str) -> Result<(), RuntimeError> {
        self.store().remove(tag).await?;
        self.directory.remove(tag);
        self.components.unregister(tag);
        info!("event=extension_remove module=runtime status=ok tag={tag}");
        Ok(())
    }

    /// Empties the registry and the directory.
    pub async fn reset(&self) -> Result<(), RuntimeError> {
        self.store().clear().await?;
        self.directory.clear();
        self.components.clear();
        info!("event=runtime_reset module=runtime status=ok");
        Ok(())
    }

    /// Fetches the manifest and saves every valid entry; returns how many.
    pub async fn reload_manifest(&self) -> Result<usize, RuntimeError> {
        let synchronizer = ManifestSynchronizer::new(
            self.store(),
            Arc::clone(&self.fetcher),
            self.paths.clone(),
        );
        let Some(manifest) = synchronizer.fetch().await else {
            return Ok(0);
        };

        let mut saved = 0;
        for entry in manifest.records {
            match self.save(entry).await {
                Ok(()) => saved += 1,
                Err(RuntimeError::InvalidMetadata(err)) => warn!(
                    "event=manifest_reload module=runtime status=warn action=skip error={err}"
                ),
                Err(err) => return Err(err),
            }
        }
        info!("event=manifest_reload module=runtime status=ok saved={saved}");
        Ok(saved)
    }

    pub fn configure_template_cache(&self, max_size: usize) {
        self.templates.configure_caching(max_size);
    }

    /// Mounts `tag` onto `surface` and schedules its first render.
    ///
    /// Returns `Ok(None)` for unknown or disabled extensions.
    pub async fn mount(
        &self,
        tag: &str,
        surface: Arc<dyn RenderSurface>,
    ) -> Result<Option<ComponentInstance>, RuntimeError> {
        let Some(metadata) = self.directory.get(tag) else {
            warn!("event=component_mount module=runtime status=warn error_code=extension_not_registered tag={tag}");
            return Ok(None);
        };
        if !metadata.enabled {
            warn!("event=component_mount module=runtime status=warn reason=disabled tag={tag}");
            return Ok(None);
        }

        self.loader.load_dependencies(&metadata).await?;
        self.loader.load(tag).await?;

        let view = self
            .components
            .create(tag, &metadata)
            .ok_or_else(|| RuntimeError::ComponentNotRegistered(tag.to_string()))?;
        let render_fn = self
            .templates
            .load_template(
                &self.paths.template_path(&metadata),
                self.config.template_cache.enabled,
                self.fetcher.as_ref(),
                self.compiler.as_ref(),
            )
            .await?;

        let instance = ComponentInstance::new(
            tag,
            view,
            surface,
            Arc::clone(&self.frames),
            self.config.render,
        );
        instance.connect(Some(render_fn));
        // First paint happens on the next frame; the ticket is not awaited.
        drop(instance.refresh());
        instance.view().on_init();
        info!(
            "event=component_mount module=runtime status=ok tag={tag} instance={}",
            instance.id()
        );
        Ok(Some(instance))
    }

    /// Tears the session down: directory, templates and components.
    pub fn shutdown(&self) {
        self.directory.clear();
        self.templates.clear_caches();
        self.components.clear();
        info!("event=runtime_shutdown module=runtime status=ok");
    }

    fn store(&self) -> Arc<dyn ExtensionStore> {
        self.lock_store().clone()
    }

    fn lock_store(&self) -> MutexGuard<'_, Arc<dyn ExtensionStore>> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn open_store(&self) -> Arc<dyn ExtensionStore> {
        let store = self.store();
        match store.init().await {
            Ok(()) => store,
            Err(err) => {
                warn!(
                    "event=runtime_init module=runtime status=warn error_code=storage_unavailable fallback=memory error={err}"
                );
                let fallback: Arc<dyn ExtensionStore> = Arc::new(MemoryExtensionStore::new());
                *self.lock_store() = Arc::clone(&fallback);
                fallback
            }
        }
    }

    async fn rebuild_directory(&self, store: &dyn ExtensionStore) {
        match store.list().await {
            Ok(records) => self.directory.rebuild(records),
            Err(err) => {
                warn!(
                    "event=runtime_init module=runtime status=warn error_code=storage_unavailable error={err}"
                );
                self.directory.rebuild(Vec::new());
            }
        }
    }
}
