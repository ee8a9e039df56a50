//! Extension metadata model.
//!
//! # Responsibility
//! - Define the canonical record persisted by the registry and carried by manifests.
//!
//! # Invariants
//! - `tag` is the only identity used for lookup, cache keys and code import targets.

pub mod extension;
