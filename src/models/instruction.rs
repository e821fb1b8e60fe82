//! Scrape instructions and the per-page selectors they carry.

use serde::{Deserialize, Serialize};

use super::entity::{edge_refs, GraphEntity};
use super::language::default_language;
use super::{Category, City, Company, EntityKind};
use crate::graph::{IndexKind, NodeDoc, NodeRef, IS_ACTIVE};

/// Where and how to scrape one listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageInstruction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub is_active: bool,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_selector: Option<String>,
    pub item_selector: String,
    pub name_selector: String,
    pub price_selector: String,
    pub link_selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_selector: Option<String>,
}

impl PageInstruction {
    pub fn new(path: &str, item_selector: &str) -> Self {
        Self {
            id: None,
            is_active: true,
            path: path.to_string(),
            pagination_selector: None,
            item_selector: item_selector.to_string(),
            name_selector: String::new(),
            price_selector: String::new(),
            link_selector: String::new(),
            preview_selector: None,
        }
    }

    pub fn selectors(mut self, name: &str, price: &str, link: &str) -> Self {
        self.name_selector = name.to_string();
        self.price_selector = price.to_string();
        self.link_selector = link.to_string();
        self
    }
}

impl GraphEntity for PageInstruction {
    const KIND: EntityKind = EntityKind::PageInstruction;
    const INDEXES: &'static [(&'static str, IndexKind)] = &[("path", IndexKind::Exact)];

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
        let mut doc = NodeDoc::new(node, Self::label())
            .property(IS_ACTIVE, self.is_active)
            .property("path", self.path.as_str())
            .property("item_selector", self.item_selector.as_str())
            .property("name_selector", self.name_selector.as_str())
            .property("price_selector", self.price_selector.as_str())
            .property("link_selector", self.link_selector.as_str());
        if let Some(selector) = &self.pagination_selector {
            doc = doc.property("pagination_selector", selector.as_str());
        }
        if let Some(selector) = &self.preview_selector {
            doc = doc.property("preview_selector", selector.as_str());
        }
        doc
    }
}

/// A scrape job: which companies, categories and cities to cover, in which
/// language, and the pages to visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Instruction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    pub is_active: bool,
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub cities: Vec<City>,
    #[serde(default)]
    pub page_instructions: Vec<PageInstruction>,
}

impl Instruction {
    pub fn new(language: &str) -> Self {
        Self {
            id: None,
            language: language.to_string(),
            is_active: true,
            companies: Vec::new(),
            categories: Vec::new(),
            cities: Vec::new(),
            page_instructions: Vec::new(),
        }
    }
}

impl GraphEntity for Instruction {
    const KIND: EntityKind = EntityKind::Instruction;
    const RELATIONS: &'static [&'static str] =
        &["companies", "categories", "cities", "page_instructions"];

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
            .property("language", self.language.as_str())
            .edges("companies", edge_refs(&self.companies))
            .edges("categories", edge_refs(&self.categories))
            .edges("cities", edge_refs(&self.cities))
            .edges("page_instructions", edge_refs(&self.page_instructions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeRecord;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_page_instruction_optional_selectors_omitted() {
        let page = PageInstruction::new("/phones", ".item").selectors(".name", ".price", "a");
        let doc = page.to_node(NodeRef::blank("page"));
        assert!(!doc.properties.contains_key("pagination_selector"));
        assert!(!doc.properties.contains_key("preview_selector"));
        assert_eq!(doc.properties["path"], json!("/phones"));
    }

    #[test]
    fn test_instruction_decodes_language_property_and_relations() {
        let page = NodeRecord {
            uid: "0x2".to_string(),
            label: "PageInstruction".to_string(),
            name: None,
            properties: BTreeMap::from([
                ("is_active".to_string(), json!(true)),
                ("path".to_string(), json!("/phones")),
                ("item_selector".to_string(), json!(".item")),
                ("name_selector".to_string(), json!(".name")),
                ("price_selector".to_string(), json!(".price")),
                ("link_selector".to_string(), json!("a")),
            ]),
            edges: BTreeMap::new(),
        };
        let record = NodeRecord {
            uid: "0x1".to_string(),
            label: "Instruction".to_string(),
            name: None,
            properties: BTreeMap::from([
                ("is_active".to_string(), json!(true)),
                ("language".to_string(), json!("ru")),
            ]),
            edges: BTreeMap::from([("page_instructions".to_string(), vec![page])]),
        };

        let instruction = Instruction::from_record(&record).unwrap();
        assert_eq!(instruction.language, "ru");
        assert_eq!(instruction.page_instructions.len(), 1);
        assert_eq!(instruction.page_instructions[0].pagination_selector, None);
        assert!(instruction.cities.is_empty());
    }
}
