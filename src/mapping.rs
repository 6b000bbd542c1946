//! Engine mappings and documents derived from the field model.

pub mod builder;
pub mod dialect;

pub use builder::{
    ALL_TEXT_FIELD, CONTENT_TYPE_FIELD, EDGENGRAM_ANALYZER, EDGENGRAMS_FIELD, Mapping, PK_FIELD,
    STANDARD_ANALYZER, all_text_field, boost_suffix, format_boost,
};
pub use dialect::{
    Dialect, Elasticsearch7Dialect, Elasticsearch8Dialect, Elasticsearch9Dialect, EngineKind,
    OpenSearch1Dialect, OpenSearch2Dialect, OpenSearch3Dialect, ScrollOffsetOverride, dialect_for,
};
