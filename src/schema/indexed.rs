//! Indexed type declarations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::field::FieldSpec;

/// Declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    /// Relation to another indexed type; `many` for collections.
    Relation {
        target: String,
        #[serde(default)]
        many: bool,
    },
}

impl AttributeType {
    pub fn relation<S: Into<String>>(target: S, many: bool) -> Self {
        AttributeType::Relation {
            target: target.into(),
            many,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, AttributeType::Relation { .. })
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Text => write!(f, "text"),
            AttributeType::Integer => write!(f, "integer"),
            AttributeType::Float => write!(f, "float"),
            AttributeType::Boolean => write!(f, "boolean"),
            AttributeType::Date => write!(f, "date"),
            AttributeType::DateTime => write!(f, "datetime"),
            AttributeType::Relation { target, many: true } => write!(f, "many({target})"),
            AttributeType::Relation { target, many: false } => write!(f, "one({target})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: AttributeType,
}

/// An application entity type registered for search.
///
/// Attributes and field specs listed here are the type's own; the parent's
/// are inherited through the [`TypeRegistry`](crate::schema::TypeRegistry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedType {
    pub app_label: String,
    pub model_name: String,
    /// Identifier of the parent type, e.g. `"searchtests.Book"`.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub search_fields: Vec<FieldSpec>,
}

impl IndexedType {
    pub fn new<A: Into<String>, M: Into<String>>(app_label: A, model_name: M) -> Self {
        IndexedType {
            app_label: app_label.into(),
            model_name: model_name.into(),
            parent: None,
            attributes: Vec::new(),
            search_fields: Vec::new(),
        }
    }

    pub fn parent<S: Into<String>>(mut self, parent: S) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn attribute<S: Into<String>>(mut self, name: S, kind: AttributeType) -> Self {
        self.attributes.push(AttributeDef {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.search_fields.push(spec);
        self
    }

    pub fn fields<I: IntoIterator<Item = FieldSpec>>(mut self, specs: I) -> Self {
        self.search_fields.extend(specs);
        self
    }

    /// Stable type identifier: `"<app_label>.<ModelName>"`.
    pub fn type_id(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    /// Lowercased `"<app_label>_<modelname>"`, used for index names and column namespaces.
    pub fn table_name(&self) -> String {
        format!("{}_{}", self.app_label, self.model_name).to_lowercase()
    }
}
