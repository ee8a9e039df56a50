//! Asset location and retrieval.
//!
//! # Responsibility
//! - Resolve runtime resource paths against the deployment base path.
//! - Fetch raw text (manifest, templates) through one async seam.
//!
//! # Invariants
//! - `fetch_text` returns `Ok(None)` for absent resources, never an empty string stand-in.

use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod fetch;
mod paths;

pub use fetch::{DirFetcher, HttpFetcher};
pub use paths::AssetPaths;

/// Asset fetch errors other than "not found".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    InvalidPath(String),
    Io { path: String, message: String },
    Status { path: String, status: u16 },
    Transport { path: String, message: String },
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "asset path is invalid: {path}"),
            Self::Io { path, message } => write!(f, "cannot read asset {path}: {message}"),
            Self::Status { path, status } => {
                write!(f, "asset {path} responded with status {status}")
            }
            Self::Transport { path, message } => {
                write!(f, "asset {path} could not be fetched: {message}")
            }
        }
    }
}

impl Error for FetchError {}

/// Raw text retrieval for resolved asset paths.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Returns `Ok(None)` when the asset does not exist.
    async fn fetch_text(&self, path: &str) -> Result<Option<String>, FetchError>;
}
