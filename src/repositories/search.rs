//! Name search with page slicing.

use crate::error::EntityError;
use crate::models::{validate_language, GraphEntity, Page};

use super::Repository;

impl<E: GraphEntity> Repository<E> {
    /// Active entities whose name in `language` contains `term`, ignoring case.
    ///
    /// `page` is 1-based. `total_matches` comes from a separate count, so a
    /// page past the end is empty but still reports the full total.
    pub async fn search_by_name_with_pagination(
        &self,
        term: &str,
        language: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Page<E>, EntityError> {
        if page == 0 || page_size == 0 {
            return Err(EntityError::InvalidPagination { page, page_size });
        }
        validate_language(language)?;

        let query = self.query(Some(language)).name_contains(term).active_only();
        let total_matches = self
            .store
            .count(&query)
            .await
            .map_err(|source| self.store_error(source))?;

        let offset = (page - 1).saturating_mul(page_size);
        let items = if (offset as u64) < total_matches {
            self.fetch(&query.slice(offset, Some(page_size)))
                .await
                .map_err(|source| self.store_error(source))?
        } else {
            Vec::new()
        };

        tracing::debug!(
            kind = %E::KIND,
            term,
            page,
            returned = items.len(),
            total_matches,
            "search"
        );

        Ok(Page {
            items,
            total_matches,
            page_size: page_size as u64,
            current_page: page as u64,
        })
    }
}
