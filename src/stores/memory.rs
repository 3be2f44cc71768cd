// ABOUTME: In-memory store adapter used for tests, tooling and single-node deployments
// ABOUTME: A named database holds one concurrent table per entity type

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use oidc_forge_core::errors::{ForgeError, ForgeResult};
use oidc_forge_core::models::{new_concurrency_token, Entity, EntityKind};
use oidc_forge_core::pagination::Page;
use tracing::debug;
use uuid::Uuid;

use super::{EntityPredicate, Store};

struct Row<E> {
    sequence: u64,
    entity: E,
}

struct MemoryTable<E> {
    rows: DashMap<String, Row<E>>,
    sequence: AtomicU64,
}

impl<E: Entity> MemoryTable<E> {
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    fn ordered(&self) -> Vec<E> {
        let mut rows: Vec<(u64, E)> = self
            .rows
            .iter()
            .map(|row| (row.sequence, row.entity.clone()))
            .collect();
        rows.sort_by_key(|(sequence, _)| *sequence);
        rows.into_iter().map(|(_, entity)| entity).collect()
    }
}

/// Named in-memory database
pub struct MemoryDatabase {
    name: String,
    tables: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl MemoryDatabase {
    /// Create an empty database
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: DashMap::new(),
        }
    }

    /// Database name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn table<E: Entity>(&self) -> Arc<MemoryTable<E>> {
        let table = Arc::clone(
            self.tables
                .entry(TypeId::of::<E>())
                .or_insert_with(|| Arc::new(MemoryTable::<E>::new()))
                .value(),
        );
        // The map is keyed by the entity's TypeId, so the downcast cannot miss.
        table
            .downcast::<MemoryTable<E>>()
            .unwrap_or_else(|_| Arc::new(MemoryTable::new()))
    }
}

/// Store keeping entities of type `E` in a [`MemoryDatabase`]
pub struct MemoryStore<E: Entity> {
    table: Arc<MemoryTable<E>>,
}

impl<E: Entity> MemoryStore<E> {
    /// Open the table of `E` in the given database
    #[must_use]
    pub fn new(database: &MemoryDatabase) -> Self {
        Self {
            table: database.table::<E>(),
        }
    }
}

#[async_trait]
impl<E: Entity> Store<E> for MemoryStore<E> {
    async fn count(&self) -> ForgeResult<usize> {
        Ok(self.table.rows.len())
    }

    async fn create(&self, mut entity: E) -> ForgeResult<E> {
        let id = entity.id().map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);
        if self.table.rows.contains_key(&id) {
            return Err(ForgeError::store(
                E::KIND,
                "create",
                format!("an entity with identifier '{id}' already exists"),
            ));
        }
        entity.set_id(id.clone());
        let sequence = self.table.sequence.fetch_add(1, Ordering::Relaxed);
        self.table.rows.insert(
            id,
            Row {
                sequence,
                entity: entity.clone(),
            },
        );
        Ok(entity)
    }

    async fn update(&self, mut entity: E) -> ForgeResult<E> {
        let Some(id) = entity.id().map(str::to_owned) else {
            return Err(ForgeError::store(E::KIND, "update", "entity has no identifier"));
        };
        let Some(mut row) = self.table.rows.get_mut(&id) else {
            return Err(ForgeError::store(
                E::KIND,
                "update",
                format!("no entity with identifier '{id}'"),
            ));
        };
        if row.entity.concurrency_token() != entity.concurrency_token() {
            return Err(ForgeError::ConcurrencyConflict {
                entity: E::KIND,
                id,
            });
        }
        entity.set_concurrency_token(new_concurrency_token());
        row.entity = entity.clone();
        Ok(entity)
    }

    async fn delete(&self, entity: &E) -> ForgeResult<()> {
        if let Some(id) = entity.id() {
            self.table.rows.remove(id);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ForgeResult<Option<E>> {
        Ok(self.table.rows.get(id).map(|row| row.entity.clone()))
    }

    async fn find_by_client_id(&self, client_id: &str) -> ForgeResult<Vec<E>> {
        Ok(self
            .table
            .ordered()
            .into_iter()
            .filter(|entity| entity.client_id() == Some(client_id))
            .collect())
    }

    async fn list(&self, page: Page) -> ForgeResult<Vec<E>> {
        Ok(page.apply(self.table.ordered()))
    }

    async fn list_where(
        &self,
        predicate: EntityPredicate<'_, E>,
        page: Page,
    ) -> ForgeResult<Vec<E>> {
        Ok(page.apply(self.table.ordered().into_iter().filter(|entity| predicate(entity))))
    }
}

type StoreConstructor = fn(&MemoryDatabase) -> Arc<dyn Any + Send + Sync>;

fn construct<E: Entity>(database: &MemoryDatabase) -> Arc<dyn Any + Send + Sync> {
    let store: Arc<dyn Store<E>> = Arc::new(MemoryStore::<E>::new(database));
    Arc::new(store)
}

/// Adapter building [`MemoryStore`]s for the entity types registered with it
#[derive(Default)]
pub struct MemoryStoreAdapter {
    database: Option<Arc<MemoryDatabase>>,
    entities: HashMap<TypeId, (EntityKind, &'static str, StoreConstructor)>,
}

impl MemoryStoreAdapter {
    /// Create an adapter without a database
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given database
    #[must_use]
    pub fn with_database(mut self, database: Arc<MemoryDatabase>) -> Self {
        self.database = Some(database);
        self
    }

    /// Declare `E` storable by this adapter
    #[must_use]
    pub fn register_entity<E: Entity>(mut self) -> Self {
        self.entities
            .insert(TypeId::of::<E>(), (E::KIND, type_name::<E>(), construct::<E>));
        self
    }

    /// Declare the four built-in entities storable
    #[must_use]
    pub fn register_default_entities(self) -> Self {
        use oidc_forge_core::models::{Application, Authorization, Scope, Token};

        self.register_entity::<Application>()
            .register_entity::<Authorization>()
            .register_entity::<Scope>()
            .register_entity::<Token>()
    }

    /// Database used by the stores, if configured
    #[must_use]
    pub fn database(&self) -> Option<&Arc<MemoryDatabase>> {
        self.database.as_ref()
    }

    /// Build the store of `E`
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `E` was not registered or when no
    /// database was specified
    pub fn create_store<E: Entity>(&self) -> ForgeResult<Arc<dyn Store<E>>> {
        let Some((_, name, constructor)) = self.entities.get(&TypeId::of::<E>()) else {
            return Err(ForgeError::configuration(format!(
                "the specified type '{}' is not a registered {} entity; register it with \
                 MemoryStoreAdapter::register_entity so it is stored as a '{}' entity",
                type_name::<E>(),
                E::KIND,
                E::KIND.base_type_name()
            )));
        };
        let Some(database) = &self.database else {
            return Err(ForgeError::configuration(
                "no in-memory database was specified; configure one with \
                 MemoryStoreAdapter::with_database",
            ));
        };

        debug!(entity = name, database = database.name(), "constructing in-memory store");
        constructor(database)
            .downcast::<Arc<dyn Store<E>>>()
            .map(|store| Arc::clone(&*store))
            .map_err(|_| {
                ForgeError::configuration(format!(
                    "store constructor registered for '{name}' produced another entity type"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidc_forge_core::models::{Application, Token, TokenType};

    fn store<E: Entity>() -> MemoryStore<E> {
        MemoryStore::new(&MemoryDatabase::new("tests"))
    }

    #[tokio::test]
    async fn test_create_assigns_identifier_and_lists_in_order() {
        let store = store::<Token>();
        let first = store.create(Token::new(TokenType::AccessToken)).await.unwrap();
        let second = store.create(Token::new(TokenType::RefreshToken)).await.unwrap();

        assert!(first.id.is_some());
        assert_eq!(store.count().await.unwrap(), 2);
        let listed = store.list(Page::default()).await.unwrap();
        assert_eq!(listed, vec![first, second]);
    }

    #[tokio::test]
    async fn test_update_detects_stale_concurrency_token() {
        let store = store::<Application>();
        let created = store.create(Application::new("app")).await.unwrap();

        let mut renamed = created.clone();
        renamed.display_name = Some("App".to_owned());
        let updated = store.update(renamed).await.unwrap();
        assert_ne!(updated.concurrency_token, created.concurrency_token);

        let error = store.update(created).await.unwrap_err();
        assert!(matches!(error, ForgeError::ConcurrencyConflict { .. }));
    }

    #[tokio::test]
    async fn test_find_by_client_id_and_predicate() {
        let store = store::<Application>();
        store.create(Application::new("one")).await.unwrap();
        store.create(Application::new("two").public()).await.unwrap();

        assert_eq!(store.find_by_client_id("two").await.unwrap().len(), 1);
        let public = store
            .list_where(&|app: &Application| app.is_public(), Page::default())
            .await
            .unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].client_id, "two");
    }

    #[test]
    fn test_unregistered_entity_names_its_base_type() {
        let adapter = MemoryStoreAdapter::new()
            .with_database(Arc::new(MemoryDatabase::new("tests")))
            .register_entity::<Application>();

        let error = adapter.create_store::<Token>().err().unwrap();
        assert!(error.is_configuration());
        assert!(error.to_string().contains("'Token' entity"));
        assert!(adapter.create_store::<Application>().is_ok());
    }

    #[test]
    fn test_missing_database_is_a_configuration_error() {
        let adapter = MemoryStoreAdapter::new().register_entity::<Token>();
        let error = adapter.create_store::<Token>().err().unwrap();
        assert!(error.to_string().contains("no in-memory database was specified"));
    }
}
