//! Companies whose catalogs are scraped.

use serde::{Deserialize, Serialize};

use super::entity::{edge_refs, GraphEntity, NAME_INDEX};
use super::language::default_language;
use super::{Category, EntityKind};
use crate::graph::{IndexKind, NodeDoc, NodeRef, IS_ACTIVE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Company {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Canonical URL of the company site.
    pub iri: String,
    pub is_active: bool,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Company {
    pub fn new(name: &str, language: &str, iri: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            language: language.to_string(),
            iri: iri.to_string(),
            is_active: true,
            categories: Vec::new(),
        }
    }

    pub fn has_category(&self, category_id: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.id.as_deref() == Some(category_id))
    }
}

impl GraphEntity for Company {
    const KIND: EntityKind = EntityKind::Company;
    const NAMED: bool = true;
    const UNIQUE_NAME: bool = true;
    const RELATIONS: &'static [&'static str] = &["categories"];
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
        NodeDoc::new(node, Self::label())
            .property(IS_ACTIVE, self.is_active)
            .property("iri", self.iri.as_str())
            .name(&self.language, &self.name)
            .edges("categories", edge_refs(&self.categories))
    }
}
