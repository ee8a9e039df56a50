//! Extension runtime: directory, loader, components and session context.

mod components;
mod context;
mod directory;
mod loader;

pub use components::{
    CodeLoader, ComponentError, ComponentFactory, ComponentRegistry, ImportError, ModuleCatalog,
    ModuleInit,
};
pub use context::{Runtime, RuntimeBuilder, RuntimeError};
pub use directory::ExtensionDirectory;
pub use loader::{ExtensionLoader, LoadError};
