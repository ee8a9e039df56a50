//! Persistent extension registry.
//!
//! # Responsibility
//! - Durable key-value storage of extension metadata keyed by tag.
//! - Pure storage: no reconciliation or load policy lives here.
//!
//! # Invariants
//! - `save` is an upsert keyed by `tag`.
//! - `init` is idempotent and safe to call repeatedly.
//! - Every operation fails with `StoreError::Unavailable` when the durable
//!   medium cannot be opened; callers treat that as recoverable.

use crate::db::DbError;
use crate::model::extension::ExtensionMetadata;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
mod sqlite;

pub use memory::MemoryExtensionStore;
pub use sqlite::{SqliteExtensionStore, StoreLocation};

pub type StoreResult<T> = Result<T, StoreError>;

/// Registry storage errors.
#[derive(Debug)]
pub enum StoreError {
    /// The durable medium could not be opened.
    Unavailable(String),
    Db(DbError),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "extension store unavailable: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid stored extension record: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Unavailable(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable registry contract.
#[async_trait]
pub trait ExtensionStore: Send + Sync {
    async fn init(&self) -> StoreResult<()>;
    async fn is_empty(&self) -> StoreResult<bool>;
    /// All records; order is not significant.
    async fn list(&self) -> StoreResult<Vec<ExtensionMetadata>>;
    async fn get(&self, tag: &str) -> StoreResult<Option<ExtensionMetadata>>;
    async fn save(&self, record: &ExtensionMetadata) -> StoreResult<()>;
    async fn remove(&self, tag: &str) -> StoreResult<()>;
    async fn clear(&self) -> StoreResult<()>;
}
