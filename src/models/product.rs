//! Products observed in company catalogs.

use serde::{Deserialize, Serialize};

use super::entity::{edge_refs, GraphEntity, NAME_INDEX};
use super::language::default_language;
use super::{Category, Company, EntityKind, Price};
use crate::graph::{IndexKind, NodeDoc, NodeRef, IS_ACTIVE};

/// A product as sold by one or more companies in one category.
///
/// Names are not unique: two products may share a name when they belong to
/// different categories. Product identity is decided by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub iri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub prices: Vec<Price>,
}

impl Product {
    pub fn new(name: &str, language: &str, iri: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            language: language.to_string(),
            iri: iri.to_string(),
            preview_url: None,
            is_active: true,
            categories: Vec::new(),
            companies: Vec::new(),
            prices: Vec::new(),
        }
    }

    pub fn with_preview(mut self, preview_url: Option<String>) -> Self {
        self.preview_url = preview_url;
        self
    }

    pub fn is_linked_to_category(&self, category_id: &str) -> bool {
        self.categories
            .iter()
            .any(|category| category.id.as_deref() == Some(category_id))
    }
}

impl GraphEntity for Product {
    const KIND: EntityKind = EntityKind::Product;
    const NAMED: bool = true;
    const RELATIONS: &'static [&'static str] = &["categories", "companies", "prices"];
    const INDEXES: &'static [(&'static str, IndexKind)] = &[NAME_INDEX, ("iri", IndexKind::Exact)];

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    fn name(&self) -> Option<(&str, &str)> {
        Some((&self.name, &self.language))
    }

    fn to_node(&self, node: NodeRef) -> NodeDoc {
        let mut doc = NodeDoc::new(node, Self::label())
            .property(IS_ACTIVE, self.is_active)
            .property("iri", self.iri.as_str())
            .name(&self.language, &self.name);
        if let Some(preview) = &self.preview_url {
            doc = doc.property("preview_url", preview.as_str());
        }
        doc.edges("categories", edge_refs(&self.categories))
            .edges("companies", edge_refs(&self.companies))
            .edges("prices", edge_refs(&self.prices))
    }
}
