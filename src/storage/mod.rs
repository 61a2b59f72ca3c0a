//! Pluggable persistent storage layer.
//!
//! Three name-spaces (nodes, outputs, metadata) behind one [`Storage`]
//! trait, with a volatile [`memory::MemoryStorage`] and a durable
//! [`sled_store::SledStorage`]. Callers obtain a handle from [`open`] and
//! never branch on which backend they got.

pub mod memory;
pub mod sled_store;
pub mod traits;

pub use memory::MemoryStorage;
pub use sled_store::SledStorage;
pub use traits::{Storage, StorageError, StorageKind, StorageResult};

use std::path::Path;
use std::sync::Arc;

/// Constructs a `Storage` handle for the given kind. `path` is ignored
/// for `StorageKind::Memory`.
pub fn open(kind: StorageKind, path: &Path) -> StorageResult<Arc<dyn Storage>> {
    match kind {
        StorageKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageKind::Sled => Ok(Arc::new(SledStorage::open(path)?)),
    }
}
