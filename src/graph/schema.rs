//! Schema declarations passed to [`GraphStore::alter`](super::GraphStore::alter).

/// How a predicate is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Exact value lookups (names, IRIs, language tags).
    Exact,
    /// Substring / term search.
    Term,
    Bool,
    /// Edge predicate, indexed for reverse traversal.
    Edge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateIndex {
    pub predicate: String,
    pub kind: IndexKind,
}

/// Indexed predicates of one node label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub label: String,
    pub indexes: Vec<PredicateIndex>,
}

impl Schema {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            indexes: Vec::new(),
        }
    }

    pub fn index(mut self, predicate: &str, kind: IndexKind) -> Self {
        if !self.indexes.iter().any(|i| i.predicate == predicate) {
            self.indexes.push(PredicateIndex {
                predicate: predicate.to_string(),
                kind,
            });
        }
        self
    }

    pub fn predicates(&self) -> impl Iterator<Item = &str> {
        self.indexes.iter().map(|i| i.predicate.as_str())
    }
}
