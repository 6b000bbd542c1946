//! Engine client trait and request/response types.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Result;

/// A search or cursor-opening request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Index or alias name.
    pub index: String,
    pub query: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Cursor keep-alive, e.g. `2m`. Set when the request opens a cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<String>,
    /// Additional top-level body keys added by the dialect.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl SearchRequest {
    pub fn new<S: Into<String>>(index: S, query: Value) -> Self {
        SearchRequest {
            index: index.into(),
            query,
            ..Default::default()
        }
    }

    pub fn sort(mut self, sort: Option<Value>) -> Self {
        self.sort = sort;
        self
    }

    pub fn from(mut self, from: usize) -> Self {
        self.from = Some(from);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn scroll<S: Into<String>>(mut self, keep_alive: S) -> Self {
        self.scroll = Some(keep_alive.into());
        self
    }

    /// The request body as sent over the wire. Only the primary key is fetched.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".to_string(), self.query.clone());
        if let Some(sort) = &self.sort {
            body.insert("sort".to_string(), sort.clone());
        }
        if let Some(from) = self.from {
            body.insert("from".to_string(), json!(from));
        }
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        body.insert("_source".to_string(), json!(false));
        body.insert("stored_fields".to_string(), json!(["pk"]));
        for (key, value) in &self.extra {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

/// One matching document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub index: String,
    pub score: f64,
    /// Stored primary key of the indexed object.
    pub pk: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<Hit>,
    pub total: u64,
    /// Present when the request opened or continued a cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
}

/// Operations the search layer needs from an engine.
///
/// Implementations map network failures, timeouts and 5xx responses to
/// [`SearchGateError::TransientBackend`](crate::error::SearchGateError::TransientBackend)
/// and other rejections to `Backend`.
pub trait EngineClient: Send + Sync + Debug {
    /// Create an index from a body holding `settings` and `mappings`.
    fn create_index(&self, name: &str, body: &Value) -> Result<()>;

    fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()>;

    fn delete_index(&self, name: &str) -> Result<()>;

    /// Whether a concrete index (not an alias) exists.
    fn index_exists(&self, name: &str) -> Result<bool>;

    fn refresh(&self, index: &str) -> Result<()>;

    /// Index or replace documents by id.
    fn bulk_index(&self, index: &str, documents: &[(String, Value)]) -> Result<()>;

    /// Delete a document; deleting a missing document is not an error.
    fn delete_document(&self, index: &str, id: &str) -> Result<()>;

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;

    /// Next page of an open cursor.
    fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchResponse>;

    fn clear_scroll(&self, scroll_id: &str) -> Result<()>;

    fn count(&self, index: &str, query: &Value) -> Result<u64>;

    /// Concrete indices an alias points to; empty when the alias does not exist.
    fn get_alias(&self, alias: &str) -> Result<Vec<String>>;

    /// Point `alias` at `add`, removing it from `remove` in the same step.
    ///
    /// Indices in `remove_indices` are deleted as part of the same update, the
    /// way the `remove_index` action of an `_aliases` request works. Readers
    /// never see a state where the name resolves to nothing.
    fn update_aliases(
        &self,
        alias: &str,
        remove: &[String],
        add: &str,
        remove_indices: &[String],
    ) -> Result<()>;
}
