//! Engine dialects.
//!
//! Every supported engine version shares the Elasticsearch 7 request and
//! mapping shapes. Later versions wrap the version they derive from and
//! override only the hooks that differ.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::SearchGateError;
use crate::mapping::builder::{EDGENGRAM_ANALYZER, STANDARD_ANALYZER};
use crate::schema::AttributeType;

/// Search engine family and major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Elasticsearch7,
    Elasticsearch8,
    Elasticsearch9,
    Opensearch1,
    Opensearch2,
    Opensearch3,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineKind::Elasticsearch7 => "elasticsearch7",
            EngineKind::Elasticsearch8 => "elasticsearch8",
            EngineKind::Elasticsearch9 => "elasticsearch9",
            EngineKind::Opensearch1 => "opensearch1",
            EngineKind::Opensearch2 => "opensearch2",
            EngineKind::Opensearch3 => "opensearch3",
        };
        write!(f, "{name}")
    }
}

impl FromStr for EngineKind {
    type Err = SearchGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "elasticsearch7" => Ok(EngineKind::Elasticsearch7),
            "elasticsearch8" => Ok(EngineKind::Elasticsearch8),
            "elasticsearch9" => Ok(EngineKind::Elasticsearch9),
            "opensearch1" => Ok(EngineKind::Opensearch1),
            "opensearch2" => Ok(EngineKind::Opensearch2),
            "opensearch3" => Ok(EngineKind::Opensearch3),
            other => Err(SearchGateError::config(format!("Unknown engine \"{other}\""))),
        }
    }
}

/// Version-specific hooks consulted by the mapping builder, the query
/// compiler and the result stream.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn kind(&self) -> EngineKind;

    /// Default index settings, including the edge n-gram analyzer.
    fn index_settings(&self) -> Value;

    /// Mapping properties for an edge n-gram field.
    fn edgengram_properties(&self) -> Value {
        json!({
            "type": "text",
            "analyzer": EDGENGRAM_ANALYZER,
            "search_analyzer": STANDARD_ANALYZER,
        })
    }

    /// Mapping type of the `_filter` column for an attribute.
    fn filter_field_type(&self, kind: &AttributeType) -> &'static str;

    /// Final adjustments to a search request body.
    fn decorate_search_body(&self, _body: &mut Map<String, Value>) {}

    /// Whether a cursor (scroll) request may carry an arbitrary start offset.
    fn scroll_supports_offset(&self) -> bool {
        false
    }
}

/// Base dialect.
#[derive(Debug, Clone, Default)]
pub struct Elasticsearch7Dialect;

impl Dialect for Elasticsearch7Dialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Elasticsearch7
    }

    fn index_settings(&self) -> Value {
        json!({
            "analysis": {
                "analyzer": {
                    EDGENGRAM_ANALYZER: {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase", "asciifolding", "edgengram"],
                    },
                },
                "filter": {
                    "edgengram": {
                        "type": "edge_ngram",
                        "min_gram": 1,
                        "max_gram": 15,
                    },
                },
            },
            "index": {
                "max_ngram_diff": 14,
            },
        })
    }

    fn filter_field_type(&self, kind: &AttributeType) -> &'static str {
        match kind {
            AttributeType::Text => "keyword",
            AttributeType::Integer => "integer",
            AttributeType::Float => "double",
            AttributeType::Boolean => "boolean",
            AttributeType::Date | AttributeType::DateTime => "date",
            AttributeType::Relation { .. } => "integer",
        }
    }
}

/// Elasticsearch 8 caps reported totals unless asked to track them.
#[derive(Debug, Clone, Default)]
pub struct Elasticsearch8Dialect {
    base: Elasticsearch7Dialect,
}

impl Dialect for Elasticsearch8Dialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Elasticsearch8
    }

    fn index_settings(&self) -> Value {
        self.base.index_settings()
    }

    fn filter_field_type(&self, kind: &AttributeType) -> &'static str {
        self.base.filter_field_type(kind)
    }

    fn decorate_search_body(&self, body: &mut Map<String, Value>) {
        self.base.decorate_search_body(body);
        body.insert("track_total_hits".to_string(), Value::Bool(true));
    }
}

#[derive(Debug, Clone, Default)]
pub struct Elasticsearch9Dialect {
    base: Elasticsearch8Dialect,
}

impl Dialect for Elasticsearch9Dialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Elasticsearch9
    }

    fn index_settings(&self) -> Value {
        self.base.index_settings()
    }

    fn filter_field_type(&self, kind: &AttributeType) -> &'static str {
        self.base.filter_field_type(kind)
    }

    fn decorate_search_body(&self, body: &mut Map<String, Value>) {
        self.base.decorate_search_body(body);
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpenSearch1Dialect {
    base: Elasticsearch7Dialect,
}

impl Dialect for OpenSearch1Dialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Opensearch1
    }

    fn index_settings(&self) -> Value {
        self.base.index_settings()
    }

    fn filter_field_type(&self, kind: &AttributeType) -> &'static str {
        self.base.filter_field_type(kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpenSearch2Dialect {
    base: OpenSearch1Dialect,
}

impl Dialect for OpenSearch2Dialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Opensearch2
    }

    fn index_settings(&self) -> Value {
        self.base.index_settings()
    }

    fn filter_field_type(&self, kind: &AttributeType) -> &'static str {
        self.base.filter_field_type(kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpenSearch3Dialect {
    base: OpenSearch2Dialect,
}

impl Dialect for OpenSearch3Dialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Opensearch3
    }

    fn index_settings(&self) -> Value {
        self.base.index_settings()
    }

    fn filter_field_type(&self, kind: &AttributeType) -> &'static str {
        self.base.filter_field_type(kind)
    }
}

/// Dialect with an explicit cursor-offset capability, overriding the wrapped dialect's.
#[derive(Debug)]
pub struct ScrollOffsetOverride {
    inner: Arc<dyn Dialect>,
    supports_offset: bool,
}

impl ScrollOffsetOverride {
    pub fn new(inner: Arc<dyn Dialect>, supports_offset: bool) -> Self {
        ScrollOffsetOverride {
            inner,
            supports_offset,
        }
    }
}

impl Dialect for ScrollOffsetOverride {
    fn kind(&self) -> EngineKind {
        self.inner.kind()
    }

    fn index_settings(&self) -> Value {
        self.inner.index_settings()
    }

    fn edgengram_properties(&self) -> Value {
        self.inner.edgengram_properties()
    }

    fn filter_field_type(&self, kind: &AttributeType) -> &'static str {
        self.inner.filter_field_type(kind)
    }

    fn decorate_search_body(&self, body: &mut Map<String, Value>) {
        self.inner.decorate_search_body(body);
    }

    fn scroll_supports_offset(&self) -> bool {
        self.supports_offset
    }
}

pub fn dialect_for(kind: EngineKind) -> Arc<dyn Dialect> {
    match kind {
        EngineKind::Elasticsearch7 => Arc::new(Elasticsearch7Dialect),
        EngineKind::Elasticsearch8 => Arc::new(Elasticsearch8Dialect::default()),
        EngineKind::Elasticsearch9 => Arc::new(Elasticsearch9Dialect::default()),
        EngineKind::Opensearch1 => Arc::new(OpenSearch1Dialect::default()),
        EngineKind::Opensearch2 => Arc::new(OpenSearch2Dialect::default()),
        EngineKind::Opensearch3 => Arc::new(OpenSearch3Dialect::default()),
    }
}
