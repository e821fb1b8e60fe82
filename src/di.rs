//! Compile-time wiring of repositories and services.
//!
//! [`crate::context::Context`] derives `Context`, so each of its fields
//! (store, broker, locks, config) can be pulled out with [`FromRef`].
//! Repositories and services derive `FromContext` and are assembled from
//! those fields:
//!
//! ```ignore
//! #[derive(FromContext, Clone)]
//! pub struct Reconciler {
//!     products: ProductRepository, // itself FromContext
//!     store: AppStore,             // a Context field
//! }
//!
//! let ctx = Context::in_memory(Config::default());
//! let reconciler = Reconciler::from_ref(&ctx);
//! ```

/// Builds `Self` from a borrowed `T`.
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

impl<T: Clone> FromRef<T> for T {
    fn from_ref(input: &T) -> Self {
        input.clone()
    }
}

pub use di_macros::{Context, FromContext};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::FromRef;
    use crate::config::Config;
    use crate::context::Context;
    use crate::models::Company;
    use crate::repositories::CompanyRepository;

    #[test]
    fn resolves_context_fields() {
        let ctx = Context::in_memory(Config::default());
        let config = <Arc<Config> as FromRef<Context>>::from_ref(&ctx);
        assert!(Arc::ptr_eq(&config, &ctx.config));
    }

    #[tokio::test]
    async fn repositories_share_the_context_store() {
        let ctx = Context::in_memory(Config::default());
        let writer = CompanyRepository::from_ref(&ctx);
        let reader = CompanyRepository::from_ref(&ctx);

        let acme = writer
            .create(&Company::new("Acme", "en", "https://acme.test"))
            .await
            .unwrap();
        let id = acme.id.unwrap();
        assert_eq!(reader.read_by_id(&id, None).await.unwrap().name, "Acme");
    }
}
