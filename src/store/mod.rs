//! Entity store
//!
//! The single owner of canonical client state. Both write paths (the
//! optimistic engine and the push reconcilers) go through a shared
//! [`StoreHandle`]; every operation is synchronous and keyed by entity id,
//! and no lock is ever held across an `.await`.

mod entity_store;
mod pagination;

pub use entity_store::EntityStore;
pub use pagination::Pagination;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// An entity the store can hold
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Store version stamped at the last write
    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);
}

/// Shared handle to an [`EntityStore`]
pub struct StoreHandle<E: Entity> {
    inner: Arc<RwLock<EntityStore<E>>>,
}

impl<E: Entity> Clone for StoreHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> Default for StoreHandle<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> StoreHandle<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(EntityStore::new())),
        }
    }

    // A panicking writer leaves the table in whatever state its last
    // completed operation produced, so a poisoned lock is still usable.
    pub fn read(&self) -> RwLockReadGuard<'_, EntityStore<E>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, EntityStore<E>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cloned copy of one entity
    pub fn get(&self, id: &str) -> Option<E> {
        self.read().get(id).cloned()
    }

    /// Cloned copy of the list in display order
    pub fn snapshot(&self) -> Vec<E> {
        self.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
