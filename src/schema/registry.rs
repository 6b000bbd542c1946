//! Static registry of indexed types.
//!
//! Built once from the declared types. Each entry precomputes its ancestor
//! chain, the effective (inherited and deduplicated) field specs and the
//! attribute catalog with the type that defines each attribute, so mapping and
//! query compilation never walk the inheritance tree themselves.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SearchGateError};
use crate::schema::field::{FieldSpec, FilterField, SearchField, dedup_fields};
use crate::schema::indexed::{AttributeType, IndexedType};

/// An attribute together with the type that declares it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttribute {
    pub name: String,
    pub kind: AttributeType,
    pub defined_on: String,
}

/// Precomputed view of one registered type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    definition: IndexedType,
    type_id: String,
    chain: Vec<String>,
    fields: Vec<FieldSpec>,
    attributes: Vec<ResolvedAttribute>,
}

impl TypeInfo {
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn definition(&self) -> &IndexedType {
        &self.definition
    }

    pub fn model_name(&self) -> &str {
        &self.definition.model_name
    }

    /// Type identifiers from this type up to its root, inclusive.
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn root(&self) -> &str {
        self.chain.last().map(String::as_str).unwrap_or(&self.type_id)
    }

    /// Effective field specs: inherited first, own last, deduplicated by `(kind, name)`.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn attributes(&self) -> &[ResolvedAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&ResolvedAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Types with no field specs are known to the registry but never indexed.
    pub fn is_indexed(&self) -> bool {
        !self.fields.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    types: Vec<IndexedType>,
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeInfo>,
    order: Vec<String>,
}

impl TypeRegistry {
    pub fn new(definitions: Vec<IndexedType>) -> Result<Self> {
        let mut by_id: BTreeMap<String, IndexedType> = BTreeMap::new();
        let mut order = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let type_id = definition.type_id();
            if by_id.contains_key(&type_id) {
                return Err(SearchGateError::schema(format!(
                    "Type {type_id} is declared more than once"
                )));
            }
            order.push(type_id.clone());
            by_id.insert(type_id, definition);
        }

        let mut types = BTreeMap::new();
        for type_id in &order {
            let chain = resolve_chain(type_id, &by_id)?;

            let mut attributes: Vec<ResolvedAttribute> = Vec::new();
            let mut specs = Vec::new();
            for ancestor in chain.iter().rev() {
                let definition = &by_id[ancestor];
                for attribute in &definition.attributes {
                    if let Some(existing) = attributes.iter().find(|a| a.name == attribute.name) {
                        return Err(SearchGateError::schema(format!(
                            "{ancestor} redeclares attribute \"{}\" already declared on {}",
                            attribute.name, existing.defined_on
                        )));
                    }
                    if let AttributeType::Relation { target, .. } = &attribute.kind
                        && !by_id.contains_key(target)
                    {
                        return Err(SearchGateError::schema(format!(
                            "{ancestor}.{} relates to unknown type {target}",
                            attribute.name
                        )));
                    }
                    attributes.push(ResolvedAttribute {
                        name: attribute.name.clone(),
                        kind: attribute.kind.clone(),
                        defined_on: ancestor.clone(),
                    });
                }
                specs.extend(definition.search_fields.iter().cloned());
            }

            types.insert(
                type_id.clone(),
                TypeInfo {
                    definition: by_id[type_id].clone(),
                    type_id: type_id.clone(),
                    chain,
                    fields: dedup_fields(specs),
                    attributes,
                },
            );
        }

        Ok(TypeRegistry { types, order })
    }

    /// Parse a schema document of the form `{"types": [...]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: SchemaFile = serde_json::from_str(json)?;
        Self::new(schema.types)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let schema: SchemaFile = serde_json::from_reader(reader)?;
        Self::new(schema.types)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn get(&self, type_id: &str) -> Result<&TypeInfo> {
        self.types
            .get(type_id)
            .ok_or_else(|| SearchGateError::schema(format!("Unknown type {type_id}")))
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    /// All registered types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.order.iter().filter_map(|id| self.types.get(id))
    }

    pub fn indexed_types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types().filter(|info| info.is_indexed())
    }

    pub fn is_indexed(&self, type_id: &str) -> bool {
        self.types.get(type_id).is_some_and(TypeInfo::is_indexed)
    }

    pub fn root_of(&self, type_id: &str) -> Option<&str> {
        self.types.get(type_id).map(TypeInfo::root)
    }

    /// Whether `type_id` is `ancestor` or inherits from it.
    pub fn is_subtype(&self, type_id: &str, ancestor: &str) -> bool {
        self.types
            .get(type_id)
            .is_some_and(|info| info.chain.iter().any(|t| t == ancestor))
    }

    /// `type_id` and every type inheriting from it, in declaration order.
    pub fn descendants(&self, type_id: &str) -> Vec<&str> {
        self.types()
            .filter(|info| info.chain.iter().any(|t| t == type_id))
            .map(TypeInfo::type_id)
            .collect()
    }

    pub fn get_search_fields(&self, type_id: &str) -> Result<&[FieldSpec]> {
        Ok(self.get(type_id)?.fields())
    }

    pub fn get_searchable_search_fields(&self, type_id: &str) -> Result<Vec<&SearchField>> {
        Ok(self
            .get(type_id)?
            .fields()
            .iter()
            .filter_map(|spec| match spec {
                FieldSpec::Search(field) => Some(field),
                _ => None,
            })
            .collect())
    }

    pub fn get_filterable_search_fields(&self, type_id: &str) -> Result<Vec<&FilterField>> {
        Ok(self
            .get(type_id)?
            .fields()
            .iter()
            .filter_map(|spec| match spec {
                FieldSpec::Filter(field) => Some(field),
                _ => None,
            })
            .collect())
    }

    pub fn get_autocomplete_search_fields(&self, type_id: &str) -> Result<Vec<&SearchField>> {
        Ok(self
            .get_searchable_search_fields(type_id)?
            .into_iter()
            .filter(|field| field.partial_match)
            .collect())
    }

    /// Report every declared field that does not resolve to an attribute.
    ///
    /// Each type is checked for its own declarations only, so an inherited
    /// problem is reported once, on the type that declared it. Related
    /// children are checked against the related type.
    pub fn check(&self) -> Vec<SearchGateError> {
        let mut problems = Vec::new();
        for info in self.types() {
            for spec in &info.definition.search_fields {
                self.check_spec(info.model_name(), info, spec, "", &mut problems);
            }
        }
        problems
    }

    fn check_spec(
        &self,
        model_name: &str,
        context: &TypeInfo,
        spec: &FieldSpec,
        path: &str,
        problems: &mut Vec<SearchGateError>,
    ) {
        let qualified = format!("{path}{}", spec.name());
        let Some(attribute) = context.attribute(spec.name()) else {
            problems.push(SearchGateError::mapping_configuration(format!(
                "{model_name}.search_fields contains non-existent field '{qualified}'"
            )));
            return;
        };

        match (spec, &attribute.kind) {
            (FieldSpec::Search(_), AttributeType::Relation { .. }) => {
                problems.push(SearchGateError::mapping_configuration(format!(
                    "{model_name}.search_fields declares a SearchField on relation '{qualified}'; use RelatedFields instead"
                )));
            }
            (FieldSpec::Related(_), kind) if !kind.is_relation() => {
                problems.push(SearchGateError::mapping_configuration(format!(
                    "{model_name}.search_fields declares RelatedFields on '{qualified}', which is not a relation"
                )));
            }
            (FieldSpec::Related(related), AttributeType::Relation { target, .. }) => {
                if let Ok(target_info) = self.get(target) {
                    let child_path = format!("{qualified}.");
                    for child in &related.fields {
                        self.check_spec(model_name, target_info, child, &child_path, problems);
                    }
                }
            }
            _ => {}
        }
    }
}

fn resolve_chain(type_id: &str, by_id: &BTreeMap<String, IndexedType>) -> Result<Vec<String>> {
    let mut chain = vec![type_id.to_string()];
    let mut seen: HashSet<&str> = HashSet::from([type_id]);
    let mut current = &by_id[type_id];

    while let Some(parent) = &current.parent {
        let Some(parent_def) = by_id.get(parent) else {
            return Err(SearchGateError::schema(format!(
                "{} declares unknown parent {parent}",
                current.type_id()
            )));
        };
        if !seen.insert(parent.as_str()) {
            return Err(SearchGateError::schema(format!(
                "Inheritance cycle through {parent}"
            )));
        }
        chain.push(parent.clone());
        current = parent_def;
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> IndexedType {
        IndexedType::new("searchtests", "Book")
            .attribute("title", AttributeType::Text)
            .attribute("summary", AttributeType::Text)
            .attribute("authors", AttributeType::relation("searchtests.Author", true))
            .fields([
                FieldSpec::Search(SearchField::new("title").boost(10.0).partial_match(true)),
                FieldSpec::filter("title"),
                FieldSpec::related("authors", vec![FieldSpec::search("name")]),
            ])
    }

    fn author() -> IndexedType {
        IndexedType::new("searchtests", "Author")
            .attribute("name", AttributeType::Text)
            .field(FieldSpec::search("name"))
    }

    #[test]
    fn test_basic() {
        let dummy = IndexedType::new("tests", "DummyType")
            .attribute("test", AttributeType::Text)
            .attribute("filter_test", AttributeType::Text)
            .fields([FieldSpec::boosted("test", 100.0), FieldSpec::filter("filter_test")]);
        let registry = TypeRegistry::new(vec![dummy]).unwrap();

        assert_eq!(registry.get_search_fields("tests.DummyType").unwrap().len(), 2);
        assert_eq!(registry.get_searchable_search_fields("tests.DummyType").unwrap().len(), 1);
        assert_eq!(registry.get_filterable_search_fields("tests.DummyType").unwrap().len(), 1);
    }

    #[test]
    fn test_inheritance_chain_and_fields() {
        let novel = IndexedType::new("searchtests", "Novel")
            .parent("searchtests.Book")
            .attribute("setting", AttributeType::Text)
            .fields([FieldSpec::autocomplete("setting"), FieldSpec::search("title")]);
        let registry = TypeRegistry::new(vec![author(), book(), novel]).unwrap();

        let info = registry.get("searchtests.Novel").unwrap();
        assert_eq!(info.chain(), ["searchtests.Novel", "searchtests.Book"]);
        assert_eq!(info.root(), "searchtests.Book");
        assert_eq!(info.attribute("setting").unwrap().defined_on, "searchtests.Novel");
        assert_eq!(info.attribute("title").unwrap().defined_on, "searchtests.Book");

        // The redeclared title replaces the inherited one in place, without its boost.
        let fields = info.fields();
        assert_eq!(fields[0], FieldSpec::search("title"));
        assert_eq!(fields.len(), 4);

        assert!(registry.is_subtype("searchtests.Novel", "searchtests.Book"));
        assert!(!registry.is_subtype("searchtests.Book", "searchtests.Novel"));
        assert_eq!(
            registry.descendants("searchtests.Book"),
            vec!["searchtests.Book", "searchtests.Novel"]
        );
        assert_eq!(
            registry.get_autocomplete_search_fields("searchtests.Novel").unwrap().len(),
            1
        );
    }

    #[test]
    fn test_construction_errors() {
        let orphan = IndexedType::new("searchtests", "Novel").parent("searchtests.Missing");
        assert!(matches!(
            TypeRegistry::new(vec![orphan]),
            Err(SearchGateError::Schema(_))
        ));

        assert!(TypeRegistry::new(vec![author(), author()]).is_err());

        // Book relates to Author, which is not registered.
        assert!(TypeRegistry::new(vec![book()]).is_err());
    }

    #[test]
    fn test_checking_search_fields() {
        let book = book().field(FieldSpec::search("foo"));
        let registry = TypeRegistry::new(vec![author(), book]).unwrap();

        let problems: Vec<String> = registry.check().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            problems,
            vec!["Mapping configuration error: Book.search_fields contains non-existent field 'foo'"]
        );
    }

    #[test]
    fn test_checking_related_children() {
        let book = book().field(FieldSpec::related(
            "authors",
            vec![FieldSpec::search("name"), FieldSpec::filter("date_of_death")],
        ));
        let registry = TypeRegistry::new(vec![author(), book]).unwrap();

        let problems = registry.check();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].to_string().contains("'authors.date_of_death'"));
    }
}
