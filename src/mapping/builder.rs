//! Mapping and document construction for one indexed type.
//!
//! Column naming rules:
//!
//! - a search field is stored under its name and copied into the catch-all
//!   field of its boost tier (`_all_text`, `_all_text_boost_10_0`, ...);
//! - an autocomplete-enabled search field adds `<name>_edgengrams`;
//! - a filter field is stored under `<name>_filter` (`<name>_id_filter` for a
//!   single relation, whose filter value is the related primary key);
//! - related fields become a nested sub-document built against the related type;
//! - top-level columns whose attribute is declared below the inheritance root
//!   are prefixed with `<app>_<model>__` of the declaring type, so sibling
//!   subtypes sharing one index never collide.

use log::debug;
use serde_json::{Map, Value, json};

use crate::error::Result;
use crate::mapping::dialect::Dialect;
use crate::object::{Attribute, Searchable};
use crate::schema::{AttributeType, FieldSpec, SearchField, TypeInfo, TypeRegistry};

pub const PK_FIELD: &str = "pk";
pub const CONTENT_TYPE_FIELD: &str = "_content_type";
pub const ALL_TEXT_FIELD: &str = "_all_text";
pub const EDGENGRAMS_FIELD: &str = "_edgengrams";
pub const EDGENGRAM_ANALYZER: &str = "edgengram_analyzer";
pub const STANDARD_ANALYZER: &str = "standard";

const EDGENGRAMS_SUFFIX: &str = "_edgengrams";
const FILTER_SUFFIX: &str = "_filter";

/// Render a boost rounded to two decimals, always with a fractional part: `10.0`, `0.25`.
pub fn format_boost(boost: f64) -> String {
    let rounded = (boost * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        format!("{rounded:.2}").trim_end_matches('0').to_string()
    }
}

/// Boost as used in column names: `10_0`, `0_25`.
pub fn boost_suffix(boost: f64) -> String {
    format_boost(boost).replace('.', "_")
}

/// Catch-all field for a boost tier.
pub fn all_text_field(boost: Option<f64>) -> String {
    match boost.filter(|b| *b != 1.0) {
        Some(b) => format!("{ALL_TEXT_FIELD}_boost_{}", boost_suffix(b)),
        None => ALL_TEXT_FIELD.to_string(),
    }
}

/// Mapping builder bound to one registered type.
#[derive(Debug, Clone, Copy)]
pub struct Mapping<'a> {
    registry: &'a TypeRegistry,
    dialect: &'a dyn Dialect,
    info: &'a TypeInfo,
}

impl<'a> Mapping<'a> {
    pub fn new(registry: &'a TypeRegistry, dialect: &'a dyn Dialect, type_id: &str) -> Result<Self> {
        Ok(Mapping {
            registry,
            dialect,
            info: registry.get(type_id)?,
        })
    }

    pub fn type_id(&self) -> &'a str {
        self.info.type_id()
    }

    pub fn info(&self) -> &'a TypeInfo {
        self.info
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Discriminator values: the type's own identifier up to the indexed root.
    pub fn content_types(&self) -> &'a [String] {
        self.info.chain()
    }

    pub fn document_id(&self, obj: &dyn Searchable) -> String {
        obj.pk()
    }

    /// Column prefix for attributes declared below the root type.
    fn namespace(&self, context: &TypeInfo, field_name: &str, top_level: bool) -> String {
        if !top_level {
            return String::new();
        }
        context
            .attribute(field_name)
            .filter(|attr| attr.defined_on != context.root())
            .and_then(|attr| self.registry.get(&attr.defined_on).ok())
            .map(|declaring| format!("{}__", declaring.definition().table_name()))
            .unwrap_or_default()
    }

    fn column(&self, context: &TypeInfo, field_name: &str, top_level: bool) -> String {
        format!("{}{field_name}", self.namespace(context, field_name, top_level))
    }

    fn filter_column_in(&self, context: &TypeInfo, field_name: &str, top_level: bool) -> String {
        let base = self.column(context, field_name, top_level);
        match context.attribute(field_name).map(|a| &a.kind) {
            Some(AttributeType::Relation { many: false, .. }) => format!("{base}_id{FILTER_SUFFIX}"),
            _ => format!("{base}{FILTER_SUFFIX}"),
        }
    }

    /// Column holding a top-level search field.
    pub fn search_column(&self, field_name: &str) -> String {
        self.column(self.info, field_name, true)
    }

    /// Edge n-gram column of a top-level search field.
    pub fn edgengram_column(&self, field_name: &str) -> String {
        format!("{}{EDGENGRAMS_SUFFIX}", self.search_column(field_name))
    }

    /// Column holding a top-level filter field.
    pub fn filter_column(&self, field_name: &str) -> String {
        self.filter_column_in(self.info, field_name, true)
    }

    /// Distinct non-default boosts of every searchable field, related children
    /// included, in descending order.
    pub fn boost_tiers(&self) -> Vec<f64> {
        let mut tiers: Vec<f64> = Vec::new();
        collect_boosts(self.registry, self.info, self.info.fields(), &mut tiers);
        tiers.sort_by(|a, b| b.total_cmp(a));
        tiers
    }

    /// Catch-all fields with their boost weights, for queries over every searchable field.
    pub fn all_text_query_fields(&self) -> Vec<String> {
        let mut fields = vec![ALL_TEXT_FIELD.to_string()];
        for boost in self.boost_tiers() {
            fields.push(format!("{}^{}", all_text_field(Some(boost)), format_boost(boost)));
        }
        fields
    }

    pub fn build_mapping(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(PK_FIELD.to_string(), json!({"type": "keyword", "store": true}));
        properties.insert(CONTENT_TYPE_FIELD.to_string(), json!({"type": "keyword"}));
        properties.insert(ALL_TEXT_FIELD.to_string(), json!({"type": "text"}));
        for boost in self.boost_tiers() {
            properties.insert(all_text_field(Some(boost)), json!({"type": "text"}));
        }
        properties.insert(EDGENGRAMS_FIELD.to_string(), self.dialect.edgengram_properties());

        self.field_properties(self.info, self.info.fields(), true, &mut properties);

        json!({ "properties": properties })
    }

    fn field_properties(
        &self,
        context: &TypeInfo,
        specs: &[FieldSpec],
        top_level: bool,
        properties: &mut Map<String, Value>,
    ) {
        for spec in specs {
            match spec {
                FieldSpec::Search(field) => {
                    let column = self.column(context, &field.field_name, top_level);
                    properties.insert(
                        column.clone(),
                        json!({"type": "text", "copy_to": copy_to(field)}),
                    );
                    if field.partial_match {
                        properties.insert(
                            format!("{column}{EDGENGRAMS_SUFFIX}"),
                            self.dialect.edgengram_properties(),
                        );
                    }
                }
                FieldSpec::Filter(field) => {
                    let Some(attribute) = context.attribute(&field.field_name) else {
                        debug!(
                            "{} has no attribute \"{}\"; filter column skipped",
                            context.type_id(),
                            field.field_name
                        );
                        continue;
                    };
                    properties.insert(
                        self.filter_column_in(context, &field.field_name, top_level),
                        json!({"type": self.dialect.filter_field_type(&attribute.kind)}),
                    );
                }
                FieldSpec::Related(related) => {
                    let Some(target) = related_type(self.registry, context, &related.field_name)
                    else {
                        debug!(
                            "{}.{} is not a relation; nested mapping skipped",
                            context.type_id(),
                            related.field_name
                        );
                        continue;
                    };
                    let mut nested = Map::new();
                    self.field_properties(target, &related.fields, false, &mut nested);
                    properties.insert(
                        self.column(context, &related.field_name, top_level),
                        json!({"type": "nested", "properties": nested}),
                    );
                }
            }
        }
    }

    /// Serialize an object. Absent attributes and null values are omitted.
    pub fn build_document(&self, obj: &dyn Searchable) -> Value {
        let mut document = Map::new();
        document.insert(PK_FIELD.to_string(), Value::String(obj.pk()));
        document.insert(
            CONTENT_TYPE_FIELD.to_string(),
            Value::Array(self.content_types().iter().cloned().map(Value::String).collect()),
        );

        let mut edgengrams = Vec::new();
        self.document_fields(self.info, obj, self.info.fields(), true, &mut document, &mut edgengrams);
        if !edgengrams.is_empty() {
            document.insert(EDGENGRAMS_FIELD.to_string(), Value::Array(edgengrams));
        }

        Value::Object(document)
    }

    fn document_fields(
        &self,
        context: &TypeInfo,
        obj: &dyn Searchable,
        specs: &[FieldSpec],
        top_level: bool,
        document: &mut Map<String, Value>,
        edgengrams: &mut Vec<Value>,
    ) {
        for spec in specs {
            let Some(attribute) = obj.attribute(spec.name()) else {
                debug!(
                    "{} {} has no attribute \"{}\"",
                    obj.type_id(),
                    obj.pk(),
                    spec.name()
                );
                continue;
            };

            match spec {
                FieldSpec::Search(field) => {
                    let Attribute::Value(value) = attribute else {
                        continue;
                    };
                    if value.is_null() {
                        continue;
                    }
                    let column = self.column(context, &field.field_name, top_level);
                    let json = value.to_json();
                    if field.partial_match {
                        match &json {
                            Value::Array(items) => edgengrams.extend(items.iter().cloned()),
                            other => edgengrams.push(other.clone()),
                        }
                        document.insert(format!("{column}{EDGENGRAMS_SUFFIX}"), json.clone());
                    }
                    document.insert(column, json);
                }
                FieldSpec::Filter(field) => {
                    let value = attribute.to_value();
                    if value.is_null() {
                        continue;
                    }
                    document.insert(
                        self.filter_column_in(context, &field.field_name, top_level),
                        value.to_json(),
                    );
                }
                FieldSpec::Related(related) => {
                    let Some(target) = related_type(self.registry, context, &related.field_name)
                    else {
                        continue;
                    };
                    let column = self.column(context, &related.field_name, top_level);
                    match attribute {
                        Attribute::One(Some(child)) => {
                            let mut nested = Map::new();
                            self.document_fields(
                                target,
                                child.as_ref(),
                                &related.fields,
                                false,
                                &mut nested,
                                edgengrams,
                            );
                            document.insert(column, Value::Object(nested));
                        }
                        Attribute::Many(children) => {
                            let mut items = Vec::with_capacity(children.len());
                            for child in &children {
                                let mut nested = Map::new();
                                self.document_fields(
                                    target,
                                    child.as_ref(),
                                    &related.fields,
                                    false,
                                    &mut nested,
                                    edgengrams,
                                );
                                items.push(Value::Object(nested));
                            }
                            document.insert(column, Value::Array(items));
                        }
                        Attribute::One(None) | Attribute::Value(_) => {}
                    }
                }
            }
        }
    }
}

fn copy_to(field: &SearchField) -> Value {
    match field.effective_boost() {
        Some(boost) => json!([ALL_TEXT_FIELD, all_text_field(Some(boost))]),
        None => json!(ALL_TEXT_FIELD),
    }
}

fn related_type<'r>(registry: &'r TypeRegistry, context: &TypeInfo, name: &str) -> Option<&'r TypeInfo> {
    match &context.attribute(name)?.kind {
        AttributeType::Relation { target, .. } => registry.get(target).ok(),
        _ => None,
    }
}

fn collect_boosts(registry: &TypeRegistry, context: &TypeInfo, specs: &[FieldSpec], tiers: &mut Vec<f64>) {
    for spec in specs {
        match spec {
            FieldSpec::Search(field) => {
                if let Some(boost) = field.effective_boost() {
                    let suffix = boost_suffix(boost);
                    if !tiers.iter().any(|t| boost_suffix(*t) == suffix) {
                        tiers.push(boost);
                    }
                }
            }
            FieldSpec::Related(related) => {
                if let Some(target) = related_type(registry, context, &related.field_name) {
                    collect_boosts(registry, target, &related.fields, tiers);
                }
            }
            FieldSpec::Filter(_) => {}
        }
    }
}
