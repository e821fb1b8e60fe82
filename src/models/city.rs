//! Cities in which prices are observed.

use serde::{Deserialize, Serialize};

use super::entity::{GraphEntity, NAME_INDEX};
use super::language::default_language;
use super::EntityKind;
use crate::graph::{IndexKind, NodeDoc, NodeRef, IS_ACTIVE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct City {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub is_active: bool,
}

impl City {
    pub fn new(name: &str, language: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            language: language.to_string(),
            is_active: true,
        }
    }
}

impl GraphEntity for City {
    const KIND: EntityKind = EntityKind::City;
    const NAMED: bool = true;
    const UNIQUE_NAME: bool = true;
    const INDEXES: &'static [(&'static str, IndexKind)] = &[NAME_INDEX];

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
            .name(&self.language, &self.name)
    }
}
