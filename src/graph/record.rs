//! Query results and their strict decoding into typed models.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::error::StoreError;
use crate::models::DEFAULT_LANGUAGE;

/// A name value together with the language tag it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedName {
    pub value: String,
    pub language: String,
}

/// One node returned by a query.
///
/// Expanded edges hold shallow records: their own `edges` map is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub uid: String,
    pub label: String,
    pub name: Option<LocalizedName>,
    pub properties: BTreeMap<String, JsonValue>,
    pub edges: BTreeMap<String, Vec<NodeRecord>>,
}

impl NodeRecord {
    /// Flattens the record into the JSON shape models deserialize from.
    ///
    /// The uid becomes `id`, the resolved name becomes `name` plus
    /// `language`, and each expanded edge becomes an array of objects.
    pub fn to_json(&self) -> JsonValue {
        let mut object: Map<String, JsonValue> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        object.insert("id".to_string(), JsonValue::String(self.uid.clone()));
        if let Some(name) = &self.name {
            object.insert("name".to_string(), JsonValue::String(name.value.clone()));
            object.insert(
                "language".to_string(),
                JsonValue::String(name.language.clone()),
            );
        }
        for (predicate, targets) in &self.edges {
            object.insert(
                predicate.clone(),
                JsonValue::Array(targets.iter().map(NodeRecord::to_json).collect()),
            );
        }

        JsonValue::Object(object)
    }

    /// Decodes the record into `T`, rejecting malformed payloads.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.to_json())
            .map_err(|e| StoreError::decode(format!("{} {}", self.label, self.uid), e))
    }
}

/// Picks the name to return for a node.
///
/// Prefers the requested language, then the default language, then the
/// first stored tag.
pub fn resolve_name(
    names: &BTreeMap<String, String>,
    requested: Option<&str>,
) -> Option<LocalizedName> {
    let pick = |language: &str| {
        names.get(language).map(|value| LocalizedName {
            value: value.clone(),
            language: language.to_string(),
        })
    };

    requested
        .and_then(pick)
        .or_else(|| pick(DEFAULT_LANGUAGE))
        .or_else(|| {
            names.iter().next().map(|(language, value)| LocalizedName {
                value: value.clone(),
                language: language.clone(),
            })
        })
}

/// Whether a stored name matches a filter value in the requested language.
pub fn name_matches(
    names: &BTreeMap<String, String>,
    requested: Option<&str>,
    predicate: impl Fn(&str) -> bool,
) -> bool {
    match requested {
        Some(language) => names.get(language).is_some_and(|value| predicate(value)),
        None => names.values().any(|value| predicate(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Named {
        id: String,
        name: String,
        language: String,
        is_active: bool,
        #[serde(default)]
        children: Vec<Named>,
    }

    fn names(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(l, v)| (l.to_string(), v.to_string()))
            .collect()
    }

    fn record(uid: &str, name: &str) -> NodeRecord {
        NodeRecord {
            uid: uid.to_string(),
            label: "Category".to_string(),
            name: Some(LocalizedName {
                value: name.to_string(),
                language: "en".to_string(),
            }),
            properties: BTreeMap::from([("is_active".to_string(), json!(true))]),
            edges: BTreeMap::new(),
        }
    }

    #[test]
    fn test_resolve_name_prefers_requested_language() {
        let stored = names(&[("en", "Phones"), ("ru", "Телефоны")]);
        let name = resolve_name(&stored, Some("ru")).unwrap();
        assert_eq!(name.value, "Телефоны");
        assert_eq!(name.language, "ru");
    }

    #[test]
    fn test_resolve_name_falls_back_to_default_language() {
        let stored = names(&[("de", "Handys"), ("en", "Phones")]);
        let name = resolve_name(&stored, Some("fr")).unwrap();
        assert_eq!(name.language, "en");
    }

    #[test]
    fn test_resolve_name_falls_back_to_any_language() {
        let stored = names(&[("de", "Handys")]);
        let name = resolve_name(&stored, Some("fr")).unwrap();
        assert_eq!(name.value, "Handys");
    }

    #[test]
    fn test_name_matches_only_requested_language() {
        let stored = names(&[("en", "Phones"), ("ru", "Телефоны")]);
        assert!(name_matches(&stored, Some("en"), |v| v == "Phones"));
        assert!(!name_matches(&stored, Some("ru"), |v| v == "Phones"));
        assert!(name_matches(&stored, None, |v| v == "Телефоны"));
    }

    #[test]
    fn test_decode_nested_edges() {
        let mut parent = record("0x1", "Acme");
        parent
            .edges
            .insert("children".to_string(), vec![record("0x2", "Phones")]);

        let decoded: Named = parent.decode().unwrap();
        assert_eq!(decoded.id, "0x1");
        assert_eq!(decoded.language, "en");
        assert!(decoded.is_active);
        assert_eq!(decoded.children.len(), 1);
        assert_eq!(decoded.children[0].name, "Phones");
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let mut broken = record("0x1", "Acme");
        broken.properties.clear();

        let err = broken.decode::<Named>().unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[test]
    fn test_decode_rejects_unknown_field() {
        let mut broken = record("0x1", "Acme");
        broken
            .properties
            .insert("unexpected".to_string(), json!(1));

        assert!(broken.decode::<Named>().is_err());
    }
}
