//! Product/price reconciliation: decides whether an observed product already
//! exists, creates it if not, and appends the observed price.

use std::sync::Arc;

use crate::context::{AppStore, Context};
use crate::di::FromContext;
use crate::error::{EntityError, StoreError};
use crate::graph::{Mutation, NodeRef};
use crate::keyed_lock::{lock_key, KeyedLocks};
use crate::models::{
    validate_language, EntityKind, GraphEntity, Price, PriceObservation, Product,
    ProductObservation,
};
use crate::repositories::{
    CategoryRepository, CityRepository, CompanyRepository, ProductRepository, PRICE_CITIES,
    PRICE_COMPANIES, PRODUCT_CATEGORIES, PRODUCT_COMPANIES, PRODUCT_PRICES,
};

const NEW_PRODUCT: &str = "product";
const NEW_PRICE: &str = "price";

/// Upserts products and appends price history.
#[derive(FromContext, Clone)]
pub struct Reconciler {
    products: ProductRepository,
    categories: CategoryRepository,
    companies: CompanyRepository,
    cities: CityRepository,
    store: AppStore,
    locks: Arc<KeyedLocks>,
}

impl Reconciler {
    /// Records one observation and returns the product it resolved to.
    ///
    /// The product is reused when an active product with the same name and
    /// language is already linked to the observed category; otherwise a new
    /// one is created and linked to the category and company. A new price is
    /// always created and linked to the company, the product and the city.
    /// Everything is written in one mutation, under a lock on the product's
    /// name and language.
    pub async fn reconcile(
        &self,
        product: &ProductObservation,
        price: &PriceObservation,
    ) -> Result<Product, EntityError> {
        validate_language(&product.language)?;
        if !price.value.is_finite() || price.value < 0.0 {
            return Err(EntityError::InvalidField {
                kind: EntityKind::Price,
                field: "value",
                reason: format!("{} is not a non-negative number", price.value),
            });
        }

        let _guard = self
            .locks
            .lock(lock_key(&[Product::label(), &product.name, &product.language]))
            .await;

        self.categories.read_by_id(&product.category_id, None).await?;
        self.companies.read_by_id(&product.company_id, None).await?;
        self.cities.read_by_id(&price.city_id, None).await?;

        let existing = self.find_in_category(product).await?;
        let reused = existing.is_some();

        let category = NodeRef::uid(&product.category_id);
        let company = NodeRef::uid(&product.company_id);
        let city = NodeRef::uid(&price.city_id);
        let price_node = NodeRef::blank(NEW_PRICE);

        let mut mutation = Mutation::new();
        let product_node = match existing.as_ref().and_then(|p| p.id.as_deref()) {
            Some(id) => NodeRef::uid(id),
            None => {
                let new_product = Product::new(&product.name, &product.language, &product.iri)
                    .with_preview(product.preview_url.clone());
                mutation = mutation
                    .set_node(new_product.to_node(NodeRef::blank(NEW_PRODUCT)))
                    .set_edge(
                        NodeRef::blank(NEW_PRODUCT),
                        PRODUCT_CATEGORIES.predicate,
                        category,
                    )
                    .set_edge(
                        NodeRef::blank(NEW_PRODUCT),
                        PRODUCT_COMPANIES.predicate,
                        company.clone(),
                    );
                NodeRef::blank(NEW_PRODUCT)
            }
        };

        mutation = mutation
            .set_node(Price::new(price.value, price.observed_at).to_node(price_node.clone()))
            .set_edge(price_node.clone(), PRICE_COMPANIES.predicate, company)
            .set_edge(
                product_node.clone(),
                PRODUCT_PRICES.predicate,
                price_node.clone(),
            );
        if let Some(inverse) = PRODUCT_PRICES.inverse {
            mutation = mutation.set_edge(price_node.clone(), inverse, product_node.clone());
        }
        mutation = mutation.set_edge(price_node, PRICE_CITIES.predicate, city);

        let kind = if reused {
            EntityKind::Price
        } else {
            EntityKind::Product
        };
        let created = |source: StoreError| EntityError::CanNotBeCreated { kind, source };
        let assigned = self.store.mutate(mutation).await.map_err(created)?;
        let product_id = assigned.resolve(&product_node).map_err(created)?;
        let price_id = assigned.require(NEW_PRICE).map_err(created)?;

        tracing::debug!(
            product = %product_id,
            price = %price_id,
            reused,
            name = %product.name,
            "observation reconciled"
        );

        self.products
            .read_by_id(&product_id, Some(&product.language))
            .await
    }

    /// The first active product with the observed name and language that is
    /// already linked to the observed category.
    ///
    /// Every candidate is checked, so a name shared across categories never
    /// hides the match in the observed one.
    async fn find_in_category(
        &self,
        product: &ProductObservation,
    ) -> Result<Option<Product>, EntityError> {
        let candidates = match self
            .products
            .read_by_name(&product.name, Some(&product.language))
            .await
        {
            Ok(candidates) => candidates,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        Ok(candidates
            .into_iter()
            .find(|candidate| candidate.is_linked_to_category(&product.category_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::di::FromRef;
    use crate::models::{Category, City, Company};
    use chrono::Utc;

    struct Fixture {
        reconciler: Reconciler,
        category: String,
        company: String,
        city: String,
    }

    async fn fixture() -> Fixture {
        let ctx = Context::in_memory(Config::default());
        let reconciler = Reconciler::from_ref(&ctx);
        let category = reconciler
            .categories
            .create(&Category::new("Phones", "en"))
            .await
            .unwrap();
        let company = reconciler
            .companies
            .create(&Company::new("Acme", "en", "https://acme.test"))
            .await
            .unwrap();
        let city = reconciler
            .cities
            .create(&City::new("Berlin", "en"))
            .await
            .unwrap();

        Fixture {
            reconciler,
            category: category.id.unwrap(),
            company: company.id.unwrap(),
            city: city.id.unwrap(),
        }
    }

    fn observed(f: &Fixture, name: &str) -> (ProductObservation, PriceObservation) {
        (
            ProductObservation {
                name: name.to_string(),
                iri: format!("https://acme.test/{name}"),
                preview_url: None,
                language: "en".to_string(),
                category_id: f.category.clone(),
                company_id: f.company.clone(),
            },
            PriceObservation {
                value: 499.0,
                observed_at: Utc::now(),
                city_id: f.city.clone(),
            },
        )
    }

    #[tokio::test]
    async fn test_new_product_is_created_and_linked() {
        let f = fixture().await;
        let (product, price) = observed(&f, "Pixel");

        let stored = f.reconciler.reconcile(&product, &price).await.unwrap();
        assert_eq!(stored.name, "Pixel");
        assert!(stored.is_linked_to_category(&f.category));
        assert_eq!(stored.companies.len(), 1);
        assert_eq!(stored.prices.len(), 1);
        assert_eq!(stored.prices[0].value, 499.0);
    }

    #[tokio::test]
    async fn test_missing_city_fails_before_writing() {
        let f = fixture().await;
        let (product, mut price) = observed(&f, "Pixel");
        price.city_id = "0x99".to_string();

        let err = f.reconciler.reconcile(&product, &price).await.unwrap_err();
        assert!(matches!(
            err,
            EntityError::DoesNotExist {
                kind: EntityKind::City,
                ..
            }
        ));
        let found = f.reconciler.products.read_by_name("Pixel", Some("en")).await;
        assert!(found.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_non_finite_price() {
        let f = fixture().await;
        let (product, mut price) = observed(&f, "Pixel");
        price.value = f64::NAN;

        let err = f.reconciler.reconcile(&product, &price).await.unwrap_err();
        assert!(matches!(err, EntityError::InvalidField { field: "value", .. }));
    }

    #[tokio::test]
    async fn test_candidate_in_other_category_is_skipped() {
        let f = fixture().await;
        let tablets = f
            .reconciler
            .categories
            .create(&Category::new("Tablets", "en"))
            .await
            .unwrap()
            .id
            .unwrap();

        let (mut product, price) = observed(&f, "Galaxy");
        product.category_id = tablets.clone();
        let tablet = f.reconciler.reconcile(&product, &price).await.unwrap();

        let (product, price) = observed(&f, "Galaxy");
        let phone = f.reconciler.reconcile(&product, &price).await.unwrap();
        assert_ne!(tablet.id, phone.id);

        // both candidates exist now; the phone one is found past the tablet one
        let (product, price) = observed(&f, "Galaxy");
        let again = f.reconciler.reconcile(&product, &price).await.unwrap();
        assert_eq!(again.id, phone.id);
        assert_eq!(again.prices.len(), 2);
    }
}
