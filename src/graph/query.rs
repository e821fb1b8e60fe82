//! Typed node queries.

/// Which nodes of a label a query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFilter {
    All,
    Uid(String),
    /// Exact match on the name in the query language (any language if none).
    NameEquals(String),
    /// Case-insensitive substring match on the name in the query language.
    NameContains(String),
}

/// A read against one node label.
///
/// # Example
///
/// ```
/// use pricegraph::graph::{NodeFilter, NodeQuery};
///
/// let query = NodeQuery::new("Product")
///     .name_contains("phone")
///     .active_only()
///     .in_language("en")
///     .expand(&["categories"])
///     .slice(2, Some(2));
///
/// assert_eq!(query.filter, NodeFilter::NameContains("phone".into()));
/// assert_eq!(query.offset, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeQuery {
    pub label: String,
    pub filter: NodeFilter,
    pub active_only: bool,
    pub language: Option<String>,
    pub expand: Vec<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl NodeQuery {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            filter: NodeFilter::All,
            active_only: false,
            language: None,
            expand: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    pub fn by_uid(mut self, uid: &str) -> Self {
        self.filter = NodeFilter::Uid(uid.to_string());
        self
    }

    pub fn name_equals(mut self, name: &str) -> Self {
        self.filter = NodeFilter::NameEquals(name.to_string());
        self
    }

    pub fn name_contains(mut self, term: &str) -> Self {
        self.filter = NodeFilter::NameContains(term.to_string());
        self
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn in_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    /// Edge predicates whose targets are returned with each node.
    pub fn expand(mut self, predicates: &[&str]) -> Self {
        self.expand = predicates.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn slice(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Applies this query's offset and limit to an ordered list.
    pub fn apply_slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_slice_middle() {
        let query = NodeQuery::new("Product").slice(2, Some(2));
        assert_eq!(query.apply_slice(vec![1, 2, 3, 4, 5]), vec![3, 4]);
    }

    #[test]
    fn test_apply_slice_past_end() {
        let query = NodeQuery::new("Product").slice(10, Some(2));
        assert!(query.apply_slice(vec![1, 2, 3]).is_empty());
    }

    #[test]
    fn test_apply_slice_without_limit() {
        let query = NodeQuery::new("Product").slice(1, None);
        assert_eq!(query.apply_slice(vec![1, 2, 3]), vec![2, 3]);
    }
}
