//! Price observations. Append-only: a price is created once and never changed.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{edge_refs, GraphEntity};
use super::{City, Company, EntityKind, Product};
use crate::graph::{IndexKind, NodeDoc, NodeRef, IS_ACTIVE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Price {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub cities: Vec<City>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub companies: Vec<Company>,
}

impl Price {
    pub fn new(value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            value,
            observed_at,
            is_active: true,
            cities: Vec::new(),
            products: Vec::new(),
            companies: Vec::new(),
        }
    }
}

impl GraphEntity for Price {
    const KIND: EntityKind = EntityKind::Price;
    const IMMUTABLE: bool = true;
    const RELATIONS: &'static [&'static str] = &["cities", "products", "companies"];
    const INDEXES: &'static [(&'static str, IndexKind)] = &[("observed_at", IndexKind::Exact)];

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

    fn to_node(&self, node: NodeRef) -> NodeDoc {
        NodeDoc::new(node, Self::label())
            .property(IS_ACTIVE, self.is_active)
            .property("value", self.value)
            .property(
                "observed_at",
                self.observed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            )
            .edges("cities", edge_refs(&self.cities))
            .edges("products", edge_refs(&self.products))
            .edges("companies", edge_refs(&self.companies))
    }
}
