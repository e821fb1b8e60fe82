//! Additional language-tagged names on existing nodes.

use crate::error::{EntityError, StoreError};
use crate::graph::{Mutation, NodeRef};
use crate::keyed_lock::lock_key;
use crate::models::{validate_language, GraphEntity};

use super::Repository;

impl<E: GraphEntity> Repository<E> {
    /// Attaches `name` in `language` to the entity with `id`.
    ///
    /// Writes only the one tagged value: names in other languages and the
    /// rest of the entity are untouched. A name already stored in `language`
    /// is replaced. For kinds with unique names, another active entity using
    /// the same name in that language makes this fail with `AlreadyExists`.
    pub async fn add_language_of_name(
        &self,
        id: &str,
        name: &str,
        language: &str,
    ) -> Result<E, EntityError> {
        if !E::NAMED {
            return Err(EntityError::InvalidField {
                kind: E::KIND,
                field: "name",
                reason: "this kind carries no name".to_string(),
            });
        }
        validate_language(language)?;

        let _guard = if E::UNIQUE_NAME {
            Some(self.locks.lock(lock_key(&[E::label(), name, language])).await)
        } else {
            None
        };

        if E::UNIQUE_NAME {
            let taken = self
                .find_by_name(name, Some(language))
                .await
                .map_err(|source| self.store_error(source))?
                .into_iter()
                .find(|other| other.id() != Some(id));
            if let Some(other) = taken {
                return Err(EntityError::AlreadyExists {
                    kind: E::KIND,
                    name: name.to_string(),
                    id: other.id().unwrap_or_default().to_string(),
                });
            }
        }

        let mutation = Mutation::new().set_name(NodeRef::uid(id), language, name);
        self.store.mutate(mutation).await.map_err(|source| match source {
            StoreError::UnknownNode(uid) if uid == id => self.missing(id),
            source => EntityError::CanNotBeUpdated {
                kind: E::KIND,
                source,
            },
        })?;

        tracing::debug!(kind = %E::KIND, id, language, "name added");
        self.read_stored(id, Some(language)).await
    }
}
