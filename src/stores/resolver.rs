// ABOUTME: Resolves the store of an entity type, preferring explicitly registered stores
// ABOUTME: Falls back to the in-memory adapter and caches each constructed store once

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use oidc_forge_core::errors::{ForgeError, ForgeResult};
use oidc_forge_core::models::Entity;
use tracing::debug;

use super::memory::MemoryStoreAdapter;
use super::Store;

/// Maps entity types to store instances
///
/// Resolution order for `E`:
/// 1. a store registered with [`StoreResolver::register_store`] is returned as is;
/// 2. otherwise the adapter builds a generic store, once, and the result is cached.
#[derive(Default)]
pub struct StoreResolver {
    explicit: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    cache: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    adapter: Option<MemoryStoreAdapter>,
}

impl StoreResolver {
    /// Resolver without adapter; only explicit stores resolve
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver falling back to an adapter
    #[must_use]
    pub fn with_adapter(adapter: MemoryStoreAdapter) -> Self {
        Self {
            adapter: Some(adapter),
            ..Self::default()
        }
    }

    /// Register a custom store for `E`
    pub fn register_store<E: Entity>(&self, store: Arc<dyn Store<E>>) {
        self.explicit.insert(TypeId::of::<E>(), Arc::new(store));
    }

    /// Builder-style variant of [`StoreResolver::register_store`]
    #[must_use]
    pub fn with_store<E: Entity>(self, store: Arc<dyn Store<E>>) -> Self {
        self.register_store(store);
        self
    }

    /// Adapter used for generic stores, if any
    #[must_use]
    pub const fn adapter(&self) -> Option<&MemoryStoreAdapter> {
        self.adapter.as_ref()
    }

    /// Resolve the store of `E`
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `E` has no explicit store and the
    /// adapter is missing, was not told about `E`, or has no database
    pub fn get<E: Entity>(&self) -> ForgeResult<Arc<dyn Store<E>>> {
        let key = TypeId::of::<E>();

        if let Some(store) = self.explicit.get(&key).and_then(|entry| downcast::<E>(entry.value())) {
            return Ok(store);
        }

        let Some(adapter) = &self.adapter else {
            return Err(ForgeError::configuration(format!(
                "no store was registered for '{}' and no store adapter is configured",
                type_name::<E>()
            )));
        };

        match self.cache.entry(key) {
            Entry::Occupied(entry) => downcast::<E>(entry.get()).ok_or_else(|| mismatch::<E>()),
            Entry::Vacant(entry) => {
                let store = adapter.create_store::<E>()?;
                debug!(entity = %E::KIND, "store resolved and cached");
                entry.insert(Arc::new(Arc::clone(&store)));
                Ok(store)
            }
        }
    }
}

fn downcast<E: Entity>(value: &Arc<dyn Any + Send + Sync>) -> Option<Arc<dyn Store<E>>> {
    value.downcast_ref::<Arc<dyn Store<E>>>().map(Arc::clone)
}

fn mismatch<E: Entity>() -> ForgeError {
    ForgeError::InvalidState(format!(
        "cached store for '{}' has an unexpected type",
        type_name::<E>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::{MemoryDatabase, MemoryStore};
    use oidc_forge_core::models::{Scope, Token};

    #[test]
    fn test_cached_store_is_reused() {
        let resolver = StoreResolver::with_adapter(
            MemoryStoreAdapter::new()
                .with_database(Arc::new(MemoryDatabase::new("cache")))
                .register_entity::<Scope>(),
        );

        let first = resolver.get::<Scope>().unwrap();
        let second = resolver.get::<Scope>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unregistered_entity_is_a_configuration_error() {
        let resolver = StoreResolver::with_adapter(
            MemoryStoreAdapter::new()
                .with_database(Arc::new(MemoryDatabase::new("partial")))
                .register_entity::<Scope>(),
        );

        let error = resolver.get::<Token>().err().unwrap();
        assert!(error.is_configuration());
        assert!(error.to_string().contains("Token"));
    }

    #[test]
    fn test_explicit_store_without_adapter() {
        let database = MemoryDatabase::new("explicit");
        let store: Arc<dyn Store<Scope>> = Arc::new(MemoryStore::<Scope>::new(&database));
        let resolver = StoreResolver::new().with_store(Arc::clone(&store));

        assert!(Arc::ptr_eq(&resolver.get::<Scope>().unwrap(), &store));
    }
}
