//! The contract every stored entity kind implements.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::graph::{IndexKind, NodeDoc, NodeRecord, NodeRef, Schema, IS_ACTIVE, NAME};

/// Kinds of entities kept in the graph. Doubles as the node label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Company,
    Category,
    City,
    Instruction,
    PageInstruction,
    Product,
    Price,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Company => "Company",
            EntityKind::Category => "Category",
            EntityKind::City => "City",
            EntityKind::Instruction => "Instruction",
            EntityKind::PageInstruction => "PageInstruction",
            EntityKind::Product => "Product",
            EntityKind::Price => "Price",
        }
    }

    pub fn all() -> [EntityKind; 7] {
        [
            EntityKind::Company,
            EntityKind::Category,
            EntityKind::City,
            EntityKind::Instruction,
            EntityKind::PageInstruction,
            EntityKind::Product,
            EntityKind::Price,
        ]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An entity stored as one graph node.
///
/// Models decode from [`NodeRecord`]s strictly: relation fields hold the
/// related entities as shallow copies (their own relations left empty).
pub trait GraphEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Whether nodes of this kind carry localized names.
    const NAMED: bool = false;

    /// Create rejects a second active entity with the same name and language.
    const UNIQUE_NAME: bool = false;

    /// Update and Deactivate are rejected once the entity exists.
    const IMMUTABLE: bool = false;

    /// Edge predicates expanded on every read.
    const RELATIONS: &'static [&'static str] = &[];

    /// Property predicates indexed at setup, besides the active flag.
    const INDEXES: &'static [(&'static str, IndexKind)] = &[];

    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: String);

    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);

    /// The name value and its language tag, for named kinds.
    fn name(&self) -> Option<(&str, &str)> {
        None
    }

    /// Node state written by Create and Update.
    fn to_node(&self, node: NodeRef) -> NodeDoc;

    fn from_record(record: &NodeRecord) -> Result<Self, StoreError> {
        record.decode()
    }

    fn label() -> &'static str {
        Self::KIND.label()
    }

    fn schema() -> Schema {
        let mut schema = Schema::new(Self::label()).index(IS_ACTIVE, IndexKind::Bool);
        for (predicate, kind) in Self::INDEXES {
            schema = schema.index(predicate, *kind);
        }
        for predicate in Self::RELATIONS {
            schema = schema.index(predicate, IndexKind::Edge);
        }
        schema
    }
}

/// References to the related entities that already have an id.
pub fn edge_refs<E: GraphEntity>(related: &[E]) -> Vec<NodeRef> {
    related
        .iter()
        .filter_map(|entity| entity.id().map(NodeRef::uid))
        .collect()
}

/// Indexes shared by every named kind.
pub(crate) const NAME_INDEX: (&str, IndexKind) = (NAME, IndexKind::Term);
