//! Typed edges between entity kinds.
//!
//! A [`Relation`] names the forward predicate and, for bidirectional
//! relations, the predicate of the back-edge. [`RelationLinker`] writes both
//! directions in one mutation, so a link is never left half applied.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::{AppStore, Context};
use crate::di::FromContext;
use crate::error::EntityError;
use crate::graph::{Mutation, NodeRef};
use crate::keyed_lock::KeyedLocks;
use crate::models::{
    Category, City, Company, GraphEntity, Instruction, PageInstruction, Price, Product,
};

use super::Repository;

/// A directed relation from `A` to `B`.
pub struct Relation<A, B> {
    pub predicate: &'static str,
    /// Predicate of the edge written back from `B` to `A`, if any.
    pub inverse: Option<&'static str>,
    kinds: PhantomData<fn() -> (A, B)>,
}

impl<A, B> Clone for Relation<A, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, B> Copy for Relation<A, B> {}

impl<A, B> Relation<A, B> {
    pub const fn one_way(predicate: &'static str) -> Self {
        Self {
            predicate,
            inverse: None,
            kinds: PhantomData,
        }
    }

    pub const fn both_ways(predicate: &'static str, inverse: &'static str) -> Self {
        Self {
            predicate,
            inverse: Some(inverse),
            kinds: PhantomData,
        }
    }
}

pub const COMPANY_CATEGORIES: Relation<Company, Category> =
    Relation::both_ways("categories", "companies");
pub const INSTRUCTION_COMPANIES: Relation<Instruction, Company> = Relation::one_way("companies");
pub const INSTRUCTION_CATEGORIES: Relation<Instruction, Category> =
    Relation::one_way("categories");
pub const INSTRUCTION_CITIES: Relation<Instruction, City> = Relation::one_way("cities");
pub const INSTRUCTION_PAGES: Relation<Instruction, PageInstruction> =
    Relation::one_way("page_instructions");
pub const PRODUCT_CATEGORIES: Relation<Product, Category> = Relation::one_way("categories");
pub const PRODUCT_COMPANIES: Relation<Product, Company> = Relation::one_way("companies");
pub const PRODUCT_PRICES: Relation<Product, Price> = Relation::both_ways("prices", "products");
pub const PRICE_CITIES: Relation<Price, City> = Relation::one_way("cities");
pub const PRICE_COMPANIES: Relation<Price, Company> = Relation::one_way("companies");

/// Adds and removes edges between stored entities.
#[derive(FromContext, Clone)]
pub struct RelationLinker {
    store: AppStore,
    locks: Arc<KeyedLocks>,
}

impl RelationLinker {
    pub fn new(store: AppStore, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }

    /// Links `from_id` to `to_id` and returns the updated source entity.
    ///
    /// Both endpoints must be active. Linking twice is harmless.
    pub async fn link<A: GraphEntity, B: GraphEntity>(
        &self,
        relation: Relation<A, B>,
        from_id: &str,
        to_id: &str,
    ) -> Result<A, EntityError> {
        let (from, _) = self.endpoints::<A, B>(from_id, to_id).await?;

        let mut mutation = Mutation::new().set_edge(
            NodeRef::uid(from_id),
            relation.predicate,
            NodeRef::uid(to_id),
        );
        if let Some(inverse) = relation.inverse {
            mutation = mutation.set_edge(NodeRef::uid(to_id), inverse, NodeRef::uid(from_id));
        }
        self.commit::<A>(mutation).await?;

        tracing::debug!(from = %A::KIND, to = %B::KIND, from_id, to_id, predicate = relation.predicate, "linked");
        from.read_by_id(from_id, None).await
    }

    /// Removes the edge in both directions. Removing an absent edge is a no-op.
    pub async fn unlink<A: GraphEntity, B: GraphEntity>(
        &self,
        relation: Relation<A, B>,
        from_id: &str,
        to_id: &str,
    ) -> Result<A, EntityError> {
        let (from, _) = self.endpoints::<A, B>(from_id, to_id).await?;

        let mut mutation = Mutation::new().delete_edge(
            NodeRef::uid(from_id),
            relation.predicate,
            NodeRef::uid(to_id),
        );
        if let Some(inverse) = relation.inverse {
            mutation = mutation.delete_edge(NodeRef::uid(to_id), inverse, NodeRef::uid(from_id));
        }
        self.commit::<A>(mutation).await?;

        tracing::debug!(from = %A::KIND, to = %B::KIND, from_id, to_id, predicate = relation.predicate, "unlinked");
        from.read_by_id(from_id, None).await
    }

    pub async fn add_category_to_company(
        &self,
        company_id: &str,
        category_id: &str,
    ) -> Result<Company, EntityError> {
        self.link(COMPANY_CATEGORIES, company_id, category_id).await
    }

    pub async fn remove_category_from_company(
        &self,
        company_id: &str,
        category_id: &str,
    ) -> Result<Company, EntityError> {
        self.unlink(COMPANY_CATEGORIES, company_id, category_id)
            .await
    }

    pub async fn add_company_to_instruction(
        &self,
        instruction_id: &str,
        company_id: &str,
    ) -> Result<Instruction, EntityError> {
        self.link(INSTRUCTION_COMPANIES, instruction_id, company_id)
            .await
    }

    pub async fn add_category_to_instruction(
        &self,
        instruction_id: &str,
        category_id: &str,
    ) -> Result<Instruction, EntityError> {
        self.link(INSTRUCTION_CATEGORIES, instruction_id, category_id)
            .await
    }

    pub async fn add_city_to_instruction(
        &self,
        instruction_id: &str,
        city_id: &str,
    ) -> Result<Instruction, EntityError> {
        self.link(INSTRUCTION_CITIES, instruction_id, city_id).await
    }

    pub async fn remove_city_from_instruction(
        &self,
        instruction_id: &str,
        city_id: &str,
    ) -> Result<Instruction, EntityError> {
        self.unlink(INSTRUCTION_CITIES, instruction_id, city_id)
            .await
    }

    pub async fn add_page_instruction_to_instruction(
        &self,
        instruction_id: &str,
        page_instruction_id: &str,
    ) -> Result<Instruction, EntityError> {
        self.link(INSTRUCTION_PAGES, instruction_id, page_instruction_id)
            .await
    }

    pub async fn add_category_to_product(
        &self,
        product_id: &str,
        category_id: &str,
    ) -> Result<Product, EntityError> {
        self.link(PRODUCT_CATEGORIES, product_id, category_id)
            .await
    }

    pub async fn add_company_to_product(
        &self,
        product_id: &str,
        company_id: &str,
    ) -> Result<Product, EntityError> {
        self.link(PRODUCT_COMPANIES, product_id, company_id).await
    }

    pub async fn add_price_to_product(
        &self,
        product_id: &str,
        price_id: &str,
    ) -> Result<Product, EntityError> {
        self.link(PRODUCT_PRICES, product_id, price_id).await
    }

    pub async fn remove_price_from_product(
        &self,
        product_id: &str,
        price_id: &str,
    ) -> Result<Product, EntityError> {
        self.unlink(PRODUCT_PRICES, product_id, price_id).await
    }

    pub async fn add_city_to_price(
        &self,
        price_id: &str,
        city_id: &str,
    ) -> Result<Price, EntityError> {
        self.link(PRICE_CITIES, price_id, city_id).await
    }

    pub async fn add_company_to_price(
        &self,
        price_id: &str,
        company_id: &str,
    ) -> Result<Price, EntityError> {
        self.link(PRICE_COMPANIES, price_id, company_id).await
    }

    async fn endpoints<A: GraphEntity, B: GraphEntity>(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> Result<(Repository<A>, Repository<B>), EntityError> {
        let from = Repository::<A>::new(self.store.clone(), self.locks.clone());
        let to = Repository::<B>::new(self.store.clone(), self.locks.clone());
        from.read_by_id(from_id, None).await?;
        to.read_by_id(to_id, None).await?;
        Ok((from, to))
    }

    async fn commit<A: GraphEntity>(&self, mutation: Mutation) -> Result<(), EntityError> {
        self.store
            .mutate(mutation)
            .await
            .map(|_| ())
            .map_err(|source| EntityError::CanNotBeUpdated {
                kind: A::KIND,
                source,
            })
    }
}
