//! Core extension runtime for Tessera.
//! Discovers, persists, loads on demand and renders independently packaged
//! UI extensions inside a host.

pub mod assets;
pub mod config;
pub mod db;
pub mod logging;
pub mod manifest;
pub mod model;
pub mod render;
pub mod runtime;
pub mod store;
pub mod template;

pub use assets::{AssetFetcher, AssetPaths, DirFetcher, FetchError, HttpFetcher};
pub use config::{ConfigError, RenderConfig, RuntimeConfig, TemplateCacheConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use manifest::{Manifest, ManifestError, ManifestSynchronizer, SyncReport};
pub use model::extension::{ExtensionMetadata, MetadataError, Tag};
pub use render::{
    ComponentInstance, ComponentView, FrameClock, RenderData, RenderError, RenderOutcome,
    RenderSurface, RenderTree,
};
pub use runtime::{
    CodeLoader, ComponentRegistry, ExtensionDirectory, ExtensionLoader, ImportError, LoadError,
    ModuleCatalog, Runtime, RuntimeBuilder, RuntimeError,
};
pub use store::{
    ExtensionStore, MemoryExtensionStore, SqliteExtensionStore, StoreError, StoreResult,
};
pub use template::{PlaceholderCompiler, RenderFn, TemplateCache, TemplateCompiler, TemplateError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
