//! Result rows returned by Cypher executors.

use std::collections::HashMap;
use std::pin::Pin;

use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::StoreError;

/// Named Cypher parameters, bound as a single agtype map.
pub type Params = HashMap<String, JsonValue>;

/// Rows are fetched on demand while the stream is polled.
pub type RowStream<'a> = Pin<Box<dyn Stream<Item = Result<Row, StoreError>> + Send + 'a>>;

/// One result row keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct Row {
    data: HashMap<String, JsonValue>,
}

impl Row {
    pub fn new(data: HashMap<String, JsonValue>) -> Self {
        Self { data }
    }

    /// Deserializes a column into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        let value = self
            .data
            .get(key)
            .ok_or_else(|| StoreError::decode("row", format!("column not found: {}", key)))?;
        serde_json::from_value(value.clone()).map_err(|e| StoreError::decode(key, e))
    }

    /// Like [`get`](Row::get), but a missing or null column is `None`.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.data.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| StoreError::decode(key, e)),
        }
    }

    pub fn get_raw(&self, key: &str) -> Option<&JsonValue> {
        self.data.get(key)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }
}

impl From<HashMap<String, JsonValue>> for Row {
    fn from(data: HashMap<String, JsonValue>) -> Self {
        Self::new(data)
    }
}
