//! Search command handler.

use color_eyre::Result;
use serde_json::json;

use crate::context::Context;
use crate::di::FromRef;
use crate::repositories::ProductRepository;

use super::App;

impl App {
    /// Prints one page of products matching `term` as JSON.
    pub async fn run_search(
        &self,
        ctx: &Context,
        term: &str,
        language: &str,
        page: usize,
        size: usize,
    ) -> Result<()> {
        let products = ProductRepository::from_ref(ctx);
        let found = products
            .search_by_name_with_pagination(term, language, page, size)
            .await?;

        let output = json!({
            "total_pages": found.total_pages(),
            "has_next": found.has_next(),
            "total_matches": found.total_matches,
            "page_size": found.page_size,
            "current_page": found.current_page,
            "items": found.items,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}
