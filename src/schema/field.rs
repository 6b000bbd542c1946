//! Field specifications.

use serde::{Deserialize, Serialize};

/// A full-text searchable attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchField {
    pub field_name: String,
    /// Relative weight; `None` means the default weight of 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f64>,
    /// Also index edge n-grams so the field takes part in autocomplete.
    #[serde(default, alias = "autocomplete")]
    pub partial_match: bool,
}

impl SearchField {
    pub fn new<S: Into<String>>(field_name: S) -> Self {
        SearchField {
            field_name: field_name.into(),
            boost: None,
            partial_match: false,
        }
    }

    pub fn boost(mut self, boost: f64) -> Self {
        self.boost = Some(boost);
        self
    }

    pub fn partial_match(mut self, partial_match: bool) -> Self {
        self.partial_match = partial_match;
        self
    }

    /// Boost other than the default weight, if any.
    pub fn effective_boost(&self) -> Option<f64> {
        self.boost.filter(|b| *b != 1.0)
    }
}

/// An attribute usable in filters and orderings, matched exactly with no text analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterField {
    pub field_name: String,
}

impl FilterField {
    pub fn new<S: Into<String>>(field_name: S) -> Self {
        FilterField {
            field_name: field_name.into(),
        }
    }
}

/// A relation whose related objects are indexed as nested sub-documents.
///
/// Child specs are resolved against the related type's attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedFields {
    pub field_name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl RelatedFields {
    pub fn new<S: Into<String>>(field_name: S, fields: Vec<FieldSpec>) -> Self {
        RelatedFields {
            field_name: field_name.into(),
            fields,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    Search,
    Filter,
    Related,
}

/// One declared field of an indexed type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSpec {
    Search(SearchField),
    Filter(FilterField),
    Related(RelatedFields),
}

impl FieldSpec {
    pub fn search<S: Into<String>>(field_name: S) -> Self {
        FieldSpec::Search(SearchField::new(field_name))
    }

    pub fn boosted<S: Into<String>>(field_name: S, boost: f64) -> Self {
        FieldSpec::Search(SearchField::new(field_name).boost(boost))
    }

    pub fn autocomplete<S: Into<String>>(field_name: S) -> Self {
        FieldSpec::Search(SearchField::new(field_name).partial_match(true))
    }

    pub fn filter<S: Into<String>>(field_name: S) -> Self {
        FieldSpec::Filter(FilterField::new(field_name))
    }

    pub fn related<S: Into<String>>(field_name: S, fields: Vec<FieldSpec>) -> Self {
        FieldSpec::Related(RelatedFields::new(field_name, fields))
    }

    pub fn name(&self) -> &str {
        match self {
            FieldSpec::Search(f) => &f.field_name,
            FieldSpec::Filter(f) => &f.field_name,
            FieldSpec::Related(f) => &f.field_name,
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldSpec::Search(_) => FieldKind::Search,
            FieldSpec::Filter(_) => FieldKind::Filter,
            FieldSpec::Related(_) => FieldKind::Related,
        }
    }
}

/// Collapse specs sharing a `(kind, name)` pair.
///
/// A later declaration replaces the earlier one at the earlier one's position,
/// discarding every attribute of the earlier declaration.
pub fn dedup_fields<I: IntoIterator<Item = FieldSpec>>(specs: I) -> Vec<FieldSpec> {
    let mut out: Vec<FieldSpec> = Vec::new();
    for spec in specs {
        match out
            .iter()
            .position(|existing| existing.kind() == spec.kind() && existing.name() == spec.name())
        {
            Some(pos) => out[pos] = spec,
            None => out.push(spec),
        }
    }
    out
}
