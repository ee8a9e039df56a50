//! View template compilation and caching.
//!
//! # Responsibility
//! - Turn raw template text into a reusable render function.
//! - Avoid refetching/recompiling identical template paths.

use crate::assets::FetchError;
use crate::render::{RenderData, RenderError, RenderTree};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod cache;
mod compiler;

pub use cache::TemplateCache;
pub use compiler::PlaceholderCompiler;

/// Compiled template: data mapping in, render tree out.
pub type RenderFn = Arc<dyn Fn(&RenderData) -> Result<RenderTree, RenderError> + Send + Sync>;

/// Rendering backend seam that compiles template text.
pub trait TemplateCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<RenderFn, TemplateError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Template text could not be fetched (absent or transport failure).
    NotFound {
        path: String,
        cause: Option<FetchError>,
    },
    Compile { path: String, message: String },
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { path, cause: None } => write!(f, "template not found: {path}"),
            Self::NotFound {
                path,
                cause: Some(cause),
            } => write!(f, "template not found: {path} ({cause})"),
            Self::Compile { path, message } => {
                write!(f, "template {path} failed to compile: {message}")
            }
        }
    }
}

impl Error for TemplateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound {
                cause: Some(cause), ..
            } => Some(cause),
            _ => None,
        }
    }
}
