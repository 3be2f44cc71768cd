// ABOUTME: Persistence capability for applications, authorizations, scopes and tokens
// ABOUTME: Async Store trait, scalar projections, the in-memory adapter and the store resolver
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

/// In-memory reference adapter
pub mod memory;
/// Entity type to store resolution
pub mod resolver;

pub use memory::{MemoryDatabase, MemoryStore, MemoryStoreAdapter};
pub use resolver::StoreResolver;

use std::future::Future;

use async_trait::async_trait;
use oidc_forge_core::errors::ForgeResult;
use oidc_forge_core::models::Entity;
use oidc_forge_core::pagination::Page;

/// Predicate used by [`Store::list_where`]
pub type EntityPredicate<'a, E> = &'a (dyn Fn(&E) -> bool + Send + Sync);

/// Persistence capability for one entity type
///
/// Missing entities are reported as `Ok(None)`; `Err` always means the
/// backend failed.
#[async_trait]
pub trait Store<E: Entity>: Send + Sync {
    /// Number of stored entities
    async fn count(&self) -> ForgeResult<usize>;

    /// Persist a new entity, assigning its identifier
    async fn create(&self, entity: E) -> ForgeResult<E>;

    /// Replace an entity; fails with a concurrency conflict when the
    /// concurrency token no longer matches the stored one
    async fn update(&self, entity: E) -> ForgeResult<E>;

    /// Delete an entity
    async fn delete(&self, entity: &E) -> ForgeResult<()>;

    /// Find an entity by identifier
    async fn find_by_id(&self, id: &str) -> ForgeResult<Option<E>>;

    /// Entities belonging to a client identifier
    async fn find_by_client_id(&self, client_id: &str) -> ForgeResult<Vec<E>>;

    /// One page of entities, in creation order
    async fn list(&self, page: Page) -> ForgeResult<Vec<E>>;

    /// One page of the entities matching `predicate`, in creation order
    async fn list_where(&self, predicate: EntityPredicate<'_, E>, page: Page)
        -> ForgeResult<Vec<E>>;
}

/// Convenience operations available on every store
pub trait StoreExt<E: Entity>: Store<E> {
    /// Project each entity of a page to a scalar value
    fn project<T, F>(&self, page: Page, projection: F) -> impl Future<Output = ForgeResult<Vec<T>>> + Send
    where
        T: Send,
        F: Fn(&E) -> T + Send,
    {
        async move {
            let entities = self.list(page).await?;
            Ok(entities.iter().map(projection).collect())
        }
    }

    /// First entity matching `predicate`
    fn find_first_where<'a>(
        &'a self,
        predicate: EntityPredicate<'a, E>,
    ) -> impl Future<Output = ForgeResult<Option<E>>> + Send + 'a {
        async move {
            let mut matches = self.list_where(predicate, Page::first(1)).await?;
            Ok(matches.pop())
        }
    }
}

impl<E: Entity, S: Store<E> + ?Sized> StoreExt<E> for S {}
