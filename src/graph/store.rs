//! The graph store contract: typed mutations, queries and schema declarations.
//!
//! Repositories never talk to a backend directly. They build a [`Mutation`]
//! or a [`NodeQuery`](super::NodeQuery) and hand it to a [`GraphStore`],
//! which may be the in-process [`MemoryStore`](super::backends::memory::MemoryStore)
//! or the Apache AGE backed [`AgeStore`](super::backends::age::AgeStore).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::StoreError;
use crate::graph::query::NodeQuery;
use crate::graph::record::NodeRecord;
use crate::graph::schema::Schema;

/// Predicate carrying language-tagged name values.
pub const NAME: &str = "name";
/// Soft-delete flag present on every node.
pub const IS_ACTIVE: &str = "is_active";

/// Executes mutations and queries against a graph store.
///
/// Every call is an independent, short-lived transaction: a [`Mutation`]
/// either applies completely or not at all, and nothing spans two calls.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Applies a mutation and returns the uids assigned to its blank nodes.
    async fn mutate(&self, mutation: Mutation) -> Result<Assigned, StoreError>;

    /// Returns the nodes matching the query, in creation order.
    async fn query(&self, query: &NodeQuery) -> Result<Vec<NodeRecord>, StoreError>;

    /// Counts the nodes matching the query, ignoring its slice.
    async fn count(&self, query: &NodeQuery) -> Result<u64, StoreError>;

    /// Declares indexed predicates for a label.
    async fn alter(&self, schema: &Schema) -> Result<(), StoreError>;
}

/// Reference to a node inside a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// A node that already has a store-assigned uid.
    Uid(String),
    /// A node created by the same mutation, named `_:<label>`.
    Blank(String),
}

impl NodeRef {
    pub fn uid(uid: impl Into<String>) -> Self {
        NodeRef::Uid(uid.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        NodeRef::Blank(label.into())
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Uid(uid) => f.write_str(uid),
            NodeRef::Blank(label) => write!(f, "_:{}", label),
        }
    }
}

/// Full state of one node as written by a `SetNode` operation.
///
/// Properties overwrite stored values with the same key, names overwrite
/// only the value for their own language tag, and edges are added to the
/// stored edge set.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDoc {
    pub node: NodeRef,
    pub label: String,
    pub properties: BTreeMap<String, JsonValue>,
    pub names: BTreeMap<String, String>,
    pub edges: BTreeMap<String, Vec<NodeRef>>,
}

impl NodeDoc {
    pub fn new(node: NodeRef, label: &str) -> Self {
        Self {
            node,
            label: label.to_string(),
            properties: BTreeMap::new(),
            names: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn property(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn name(mut self, language: &str, value: &str) -> Self {
        self.names.insert(language.to_string(), value.to_string());
        self
    }

    pub fn edges(mut self, predicate: &str, targets: Vec<NodeRef>) -> Self {
        if !targets.is_empty() {
            self.edges
                .entry(predicate.to_string())
                .or_default()
                .extend(targets);
        }
        self
    }
}

/// A directed, named edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: NodeRef,
    pub predicate: String,
    pub to: NodeRef,
}

impl Edge {
    pub fn new(from: NodeRef, predicate: &str, to: NodeRef) -> Self {
        Self {
            from,
            predicate: predicate.to_string(),
            to,
        }
    }
}

/// A single operation inside a [`Mutation`].
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    SetNode(NodeDoc),
    /// Attaches one language-tagged name value, leaving other languages intact.
    SetName {
        node: NodeRef,
        language: String,
        value: String,
    },
    SetEdge(Edge),
    DeleteEdge(Edge),
    /// Removes the node itself when it carries `label`. Edges other nodes
    /// hold towards it are kept.
    DeleteNode { uid: String, label: String },
}

/// An ordered batch of operations committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    ops: Vec<MutationOp>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_node(mut self, doc: NodeDoc) -> Self {
        self.ops.push(MutationOp::SetNode(doc));
        self
    }

    pub fn set_name(mut self, node: NodeRef, language: &str, value: &str) -> Self {
        self.ops.push(MutationOp::SetName {
            node,
            language: language.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn set_edge(mut self, from: NodeRef, predicate: &str, to: NodeRef) -> Self {
        self.ops
            .push(MutationOp::SetEdge(Edge::new(from, predicate, to)));
        self
    }

    pub fn delete_edge(mut self, from: NodeRef, predicate: &str, to: NodeRef) -> Self {
        self.ops
            .push(MutationOp::DeleteEdge(Edge::new(from, predicate, to)));
        self
    }

    pub fn delete_node(mut self, uid: &str, label: &str) -> Self {
        self.ops.push(MutationOp::DeleteNode {
            uid: uid.to_string(),
            label: label.to_string(),
        });
        self
    }

    pub fn ops(&self) -> &[MutationOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Blank labels introduced by `SetNode` operations, in order.
    pub fn defined_blanks(&self) -> Vec<&str> {
        let mut blanks: Vec<&str> = Vec::new();
        for op in &self.ops {
            if let MutationOp::SetNode(NodeDoc {
                node: NodeRef::Blank(label),
                ..
            }) = op
            {
                if !blanks.contains(&label.as_str()) {
                    blanks.push(label);
                }
            }
        }
        blanks
    }

    /// Every node reference the mutation touches.
    pub fn references(&self) -> Vec<&NodeRef> {
        let mut refs = Vec::new();
        for op in &self.ops {
            match op {
                MutationOp::SetNode(doc) => {
                    refs.push(&doc.node);
                    refs.extend(doc.edges.values().flatten());
                }
                MutationOp::SetName { node, .. } => refs.push(node),
                MutationOp::SetEdge(edge) | MutationOp::DeleteEdge(edge) => {
                    refs.push(&edge.from);
                    refs.push(&edge.to);
                }
                MutationOp::DeleteNode { .. } => {}
            }
        }
        refs
    }

    /// Fails when a blank node is referenced without being defined.
    pub fn check_blanks(&self) -> Result<(), StoreError> {
        let defined = self.defined_blanks();
        for reference in self.references() {
            if let NodeRef::Blank(label) = reference {
                if !defined.contains(&label.as_str()) {
                    return Err(StoreError::UndefinedBlank(label.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Uids assigned by the store to the blank nodes of a mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assigned(HashMap<String, String>);

impl Assigned {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, blank: &str, uid: String) {
        self.0.insert(blank.to_string(), uid);
    }

    pub fn get(&self, blank: &str) -> Option<&str> {
        self.0.get(blank).map(String::as_str)
    }

    /// Returns the uid for `blank`, or `MissingAssignedId` if the store gave none.
    pub fn require(&self, blank: &str) -> Result<&str, StoreError> {
        self.get(blank)
            .ok_or_else(|| StoreError::MissingAssignedId(blank.to_string()))
    }

    /// Resolves a reference against this assignment.
    pub fn resolve(&self, node: &NodeRef) -> Result<String, StoreError> {
        match node {
            NodeRef::Uid(uid) => Ok(uid.clone()),
            NodeRef::Blank(label) => self.require(label).map(str::to_string),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defined_blanks_deduplicates() {
        let mutation = Mutation::new()
            .set_node(NodeDoc::new(NodeRef::blank("a"), "Company"))
            .set_node(NodeDoc::new(NodeRef::blank("a"), "Company"))
            .set_node(NodeDoc::new(NodeRef::blank("b"), "Category"));

        assert_eq!(mutation.defined_blanks(), vec!["a", "b"]);
    }

    #[test]
    fn test_check_blanks_rejects_undefined_reference() {
        let mutation = Mutation::new()
            .set_node(NodeDoc::new(NodeRef::blank("product"), "Product"))
            .set_edge(NodeRef::blank("product"), "prices", NodeRef::blank("price"));

        let err = mutation.check_blanks().unwrap_err();
        assert!(matches!(err, StoreError::UndefinedBlank(label) if label == "price"));
    }

    #[test]
    fn test_check_blanks_accepts_forward_reference() {
        let mutation = Mutation::new()
            .set_edge(NodeRef::blank("a"), "categories", NodeRef::blank("b"))
            .set_node(NodeDoc::new(NodeRef::blank("a"), "Company"))
            .set_node(NodeDoc::new(NodeRef::blank("b"), "Category"));

        assert!(mutation.check_blanks().is_ok());
    }

    #[test]
    fn test_node_doc_skips_empty_edge_lists() {
        let doc = NodeDoc::new(NodeRef::uid("0x1"), "Company").edges("categories", vec![]);
        assert!(doc.edges.is_empty());
    }

    #[test]
    fn test_assigned_require_missing() {
        let assigned = Assigned::new();
        let err = assigned.require("company").unwrap_err();
        assert!(matches!(err, StoreError::MissingAssignedId(label) if label == "company"));
    }

    #[test]
    fn test_node_ref_display() {
        assert_eq!(NodeRef::uid("0x2a").to_string(), "0x2a");
        assert_eq!(NodeRef::blank("price").to_string(), "_:price");
    }
}
