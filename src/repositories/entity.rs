//! Generic repository: create, read, update, deactivate and delete for any
//! [`GraphEntity`] kind.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::{AppStore, Context};
use crate::di::FromContext;
use crate::error::{EntityError, StoreError};
use crate::graph::{Mutation, NodeQuery, NodeRef};
use crate::keyed_lock::{lock_key, KeyGuard, KeyedLocks};
use crate::models::{validate_language, GraphEntity};

/// Blank label of the node a Create mutation introduces.
const NEW_NODE: &str = "node";

/// Repository for one entity kind.
///
/// Every call is one short-lived store transaction. Reads expand the
/// kind's relations one level deep.
#[derive(FromContext)]
pub struct Repository<E> {
    pub(super) store: AppStore,
    pub(super) locks: Arc<KeyedLocks>,
    #[from_context(default)]
    kind: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            locks: self.locks.clone(),
            kind: PhantomData,
        }
    }
}

impl<E: GraphEntity> Repository<E> {
    pub fn new(store: AppStore, locks: Arc<KeyedLocks>) -> Self {
        Self {
            store,
            locks,
            kind: PhantomData,
        }
    }

    /// Declares the indexed predicates of this kind.
    pub async fn setup(&self) -> Result<(), EntityError> {
        self.store
            .alter(&E::schema())
            .await
            .map_err(|source| self.store_error(source))?;
        tracing::info!(kind = %E::KIND, "schema declared");
        Ok(())
    }

    /// Stores a new entity and returns it with its assigned id.
    ///
    /// For kinds with unique names an active entity with the same name and
    /// language makes this fail with `AlreadyExists`, carrying the stored id.
    /// The check and the write run under a per-name lock.
    pub async fn create(&self, entity: &E) -> Result<E, EntityError> {
        let mut entity = entity.clone();
        let _guard = self.lock_name(&entity).await?;

        if E::UNIQUE_NAME {
            if let Some((name, language)) = entity.name() {
                let existing = self
                    .find_by_name(name, Some(language))
                    .await
                    .map_err(|source| EntityError::CanNotBeCreated {
                        kind: E::KIND,
                        source,
                    })?;
                if let Some(found) = existing.first() {
                    let id = found.id().unwrap_or_default().to_string();
                    tracing::debug!(kind = %E::KIND, name, id = %id, "create rejected, name taken");
                    return Err(EntityError::AlreadyExists {
                        kind: E::KIND,
                        name: name.to_string(),
                        id,
                    });
                }
            }
        }

        entity.set_active(true);
        let mutation = Mutation::new().set_node(entity.to_node(NodeRef::blank(NEW_NODE)));
        let created = |source: StoreError| EntityError::CanNotBeCreated {
            kind: E::KIND,
            source,
        };
        let assigned = self.store.mutate(mutation).await.map_err(created)?;
        let id = assigned.require(NEW_NODE).map_err(created)?.to_string();

        tracing::debug!(kind = %E::KIND, id = %id, "created");
        entity.set_id(id);
        Ok(entity)
    }

    /// Every active entity whose name in `language` (any language if `None`)
    /// equals `name`, in creation order. Never empty.
    pub async fn read_by_name(
        &self,
        name: &str,
        language: Option<&str>,
    ) -> Result<Vec<E>, EntityError> {
        if let Some(language) = language {
            validate_language(language)?;
        }
        let found = self
            .find_by_name(name, language)
            .await
            .map_err(|source| self.store_error(source))?;

        if found.is_empty() {
            return Err(EntityError::ByNameNotFound {
                kind: E::KIND,
                name: name.to_string(),
            });
        }
        Ok(found)
    }

    /// The active entity with `id`. Deactivated entities read as missing.
    pub async fn read_by_id(&self, id: &str, language: Option<&str>) -> Result<E, EntityError> {
        if let Some(language) = language {
            validate_language(language)?;
        }
        let query = self.query(language).by_uid(id).active_only();
        self.fetch(&query)
            .await
            .map_err(|source| self.store_error(source))?
            .into_iter()
            .next()
            .ok_or_else(|| self.missing(id))
    }

    /// All active entities of this kind, in creation order.
    pub async fn read_all(&self, language: Option<&str>) -> Result<Vec<E>, EntityError> {
        if let Some(language) = language {
            validate_language(language)?;
        }
        self.fetch(&self.query(language).active_only())
            .await
            .map_err(|source| self.store_error(source))
    }

    /// Writes the full state of `entity` and returns the stored state.
    ///
    /// Properties and the name in the entity's language are replaced.
    /// Relations listed on the entity are added; use the linker to remove one.
    pub async fn update(&self, entity: &E) -> Result<E, EntityError> {
        if E::IMMUTABLE {
            return Err(EntityError::Immutable { kind: E::KIND });
        }
        let id = entity.id().ok_or(EntityError::CanNotBeWithoutId {
            kind: E::KIND,
            operation: "updated",
        })?;
        let language = entity.name().map(|(_, language)| language);
        if let Some(language) = language {
            validate_language(language)?;
        }

        let mutation = Mutation::new().set_node(entity.to_node(NodeRef::uid(id)));
        self.store.mutate(mutation).await.map_err(|source| match source {
            StoreError::UnknownNode(uid) if uid == id => self.missing(id),
            source => EntityError::CanNotBeUpdated {
                kind: E::KIND,
                source,
            },
        })?;

        tracing::debug!(kind = %E::KIND, id, "updated");
        self.read_stored(id, language).await
    }

    /// Marks the entity inactive. It stays addressable until deleted.
    pub async fn deactivate(&self, entity: &E) -> Result<E, EntityError> {
        if E::IMMUTABLE {
            return Err(EntityError::Immutable { kind: E::KIND });
        }
        if entity.id().is_none() {
            return Err(EntityError::CanNotBeWithoutId {
                kind: E::KIND,
                operation: "deactivated",
            });
        }

        let mut inactive = entity.clone();
        inactive.set_active(false);
        self.update(&inactive).await.map_err(|err| match err {
            EntityError::CanNotBeUpdated { kind, source } => {
                EntityError::CanNotBeDeactivated { kind, source }
            }
            other => other,
        })
    }

    /// Removes the node. Edges other nodes hold towards it are left in place
    /// and skipped on read.
    pub async fn delete(&self, entity: &E) -> Result<(), EntityError> {
        let id = entity.id().ok_or(EntityError::CanNotBeWithoutId {
            kind: E::KIND,
            operation: "deleted",
        })?;

        self.store
            .mutate(Mutation::new().delete_node(id, E::label()))
            .await
            .map_err(|source| match source {
                StoreError::UnknownNode(uid) if uid == id => self.missing(id),
                source => EntityError::CanNotBeDeleted {
                    kind: E::KIND,
                    source,
                },
            })?;

        tracing::debug!(kind = %E::KIND, id, "deleted");
        Ok(())
    }

    /// Reads by id regardless of the active flag.
    pub(super) async fn read_stored(&self, id: &str, language: Option<&str>) -> Result<E, EntityError> {
        let query = self.query(language).by_uid(id);
        self.fetch(&query)
            .await
            .map_err(|source| self.store_error(source))?
            .into_iter()
            .next()
            .ok_or_else(|| self.missing(id))
    }

    pub(super) async fn find_by_name(
        &self,
        name: &str,
        language: Option<&str>,
    ) -> Result<Vec<E>, StoreError> {
        let query = self.query(language).name_equals(name).active_only();
        self.fetch(&query).await
    }

    pub(super) fn query(&self, language: Option<&str>) -> NodeQuery {
        let query = NodeQuery::new(E::label()).expand(E::RELATIONS);
        match language {
            Some(language) => query.in_language(language),
            None => query,
        }
    }

    pub(super) async fn fetch(&self, query: &NodeQuery) -> Result<Vec<E>, StoreError> {
        let records = self.store.query(query).await?;
        records.iter().map(E::from_record).collect()
    }

    pub(super) fn store_error(&self, source: StoreError) -> EntityError {
        EntityError::Store {
            kind: E::KIND,
            source,
        }
    }

    pub(super) fn missing(&self, id: &str) -> EntityError {
        EntityError::DoesNotExist {
            kind: E::KIND,
            id: id.to_string(),
        }
    }

    async fn lock_name(&self, entity: &E) -> Result<Option<KeyGuard>, EntityError> {
        let Some((name, language)) = entity.name() else {
            return Ok(None);
        };
        validate_language(language)?;
        if !E::UNIQUE_NAME {
            return Ok(None);
        }
        let key = lock_key(&[E::label(), name, language]);
        Ok(Some(self.locks.lock(key).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::backends::memory::MemoryStore;
    use crate::models::{Category, City, Company, EntityKind, Price};
    use chrono::Utc;

    fn repo<E: GraphEntity>(store: &Arc<MemoryStore>) -> Repository<E> {
        Repository::new(store.clone(), Arc::new(KeyedLocks::new()))
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_activates() {
        let store = Arc::new(MemoryStore::new());
        let cities = repo::<City>(&store);
        let mut city = City::new("Berlin", "en");
        city.is_active = false;

        let created = cities.create(&city).await.unwrap();
        assert_eq!(created.id.as_deref(), Some("0x1"));
        assert!(created.is_active);
    }

    #[tokio::test]
    async fn test_create_duplicate_name_returns_existing_id() {
        let store = Arc::new(MemoryStore::new());
        let companies = repo::<Company>(&store);
        let first = companies
            .create(&Company::new("Acme", "en", "https://acme.test"))
            .await
            .unwrap();

        let err = companies
            .create(&Company::new("Acme", "en", "https://other.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, EntityError::AlreadyExists { .. }));
        assert_eq!(err.existing_id(), first.id.as_deref());
        assert_eq!(store.node_count("Company").await, 1);
    }

    #[tokio::test]
    async fn test_same_name_in_other_language_is_not_a_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let cities = repo::<City>(&store);
        cities.create(&City::new("Wien", "de")).await.unwrap();
        assert!(cities.create(&City::new("Wien", "en")).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_language() {
        let store = Arc::new(MemoryStore::new());
        let err = repo::<City>(&store)
            .create(&City::new("Berlin", "English"))
            .await
            .unwrap_err();
        assert!(matches!(err, EntityError::InvalidLanguage(tag) if tag == "English"));
    }

    #[tokio::test]
    async fn test_create_with_unknown_relation_fails() {
        let store = Arc::new(MemoryStore::new());
        let mut company = Company::new("Acme", "en", "https://acme.test");
        let mut ghost = Category::new("Ghost", "en");
        ghost.id = Some("0x99".to_string());
        company.categories.push(ghost);

        let err = repo::<Company>(&store).create(&company).await.unwrap_err();
        assert!(matches!(
            err,
            EntityError::CanNotBeCreated {
                source: StoreError::UnknownNode(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_read_by_name_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = repo::<City>(&store)
            .read_by_name("Atlantis", Some("en"))
            .await
            .unwrap_err();
        assert!(matches!(err, EntityError::ByNameNotFound { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_requires_id() {
        let store = Arc::new(MemoryStore::new());
        let err = repo::<City>(&store)
            .update(&City::new("Berlin", "en"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EntityError::CanNotBeWithoutId {
                operation: "updated",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_replaces_properties_and_rereads() {
        let store = Arc::new(MemoryStore::new());
        let companies = repo::<Company>(&store);
        let mut company = companies
            .create(&Company::new("Acme", "en", "https://acme.test"))
            .await
            .unwrap();

        company.iri = "https://acme.example".to_string();
        let updated = companies.update(&company).await.unwrap();
        assert_eq!(updated.iri, "https://acme.example");
        assert_eq!(updated.id, company.id);
    }

    #[tokio::test]
    async fn test_update_unknown_id_does_not_exist() {
        let store = Arc::new(MemoryStore::new());
        let mut city = City::new("Berlin", "en");
        city.id = Some("0x42".to_string());

        let err = repo::<City>(&store).update(&city).await.unwrap_err();
        assert!(matches!(err, EntityError::DoesNotExist { id, .. } if id == "0x42"));
    }

    #[tokio::test]
    async fn test_deactivate_hides_from_reads_but_keeps_node() {
        let store = Arc::new(MemoryStore::new());
        let cities = repo::<City>(&store);
        let city = cities.create(&City::new("Berlin", "en")).await.unwrap();
        let id = city.id.clone().unwrap();

        let inactive = cities.deactivate(&city).await.unwrap();
        assert!(!inactive.is_active);

        let err = cities.read_by_id(&id, None).await.unwrap_err();
        assert!(matches!(err, EntityError::DoesNotExist { .. }));
        assert_eq!(store.node_count("City").await, 1);
    }

    #[tokio::test]
    async fn test_delete_then_read_does_not_exist() {
        let store = Arc::new(MemoryStore::new());
        let cities = repo::<City>(&store);
        let city = cities.create(&City::new("Berlin", "en")).await.unwrap();
        let id = city.id.clone().unwrap();

        cities.delete(&city).await.unwrap();

        let err = cities.read_by_id(&id, None).await.unwrap_err();
        assert!(matches!(err, EntityError::DoesNotExist { .. }));
        assert_eq!(store.node_count("City").await, 0);
    }

    #[tokio::test]
    async fn test_delete_with_id_of_other_kind_leaves_node() {
        let store = Arc::new(MemoryStore::new());
        let companies = repo::<Company>(&store);
        let acme = companies
            .create(&Company::new("Acme", "en", "https://acme.test"))
            .await
            .unwrap();
        let id = acme.id.clone().unwrap();

        let mut impostor = City::new("Berlin", "en");
        impostor.id = Some(id.clone());
        let err = repo::<City>(&store).delete(&impostor).await.unwrap_err();

        assert!(matches!(err, EntityError::DoesNotExist { kind: EntityKind::City, .. }));
        assert_eq!(companies.read_by_id(&id, None).await.unwrap().name, "Acme");
    }

    #[tokio::test]
    async fn test_delete_requires_id() {
        let store = Arc::new(MemoryStore::new());
        let err = repo::<City>(&store)
            .delete(&City::new("Berlin", "en"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EntityError::CanNotBeWithoutId {
                operation: "deleted",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_price_is_immutable() {
        let store = Arc::new(MemoryStore::new());
        let prices = repo::<Price>(&store);
        let price = prices.create(&Price::new(10.0, Utc::now())).await.unwrap();

        assert!(matches!(
            prices.update(&price).await.unwrap_err(),
            EntityError::Immutable { .. }
        ));
        assert!(matches!(
            prices.deactivate(&price).await.unwrap_err(),
            EntityError::Immutable { .. }
        ));
        prices.delete(&price).await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_declares_schema() {
        let store = Arc::new(MemoryStore::new());
        repo::<Company>(&store).setup().await.unwrap();
        let schema = store.schema("Company").await.unwrap();
        assert!(schema.predicates().any(|p| p == "iri"));
    }
}
