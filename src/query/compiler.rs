//! Translate a search request into an engine query body.
//!
//! The compiled body always has the shape
//! `{"bool": {"filter": <filters>, "must": <inner query>}}` where the filters
//! start with the content-type restriction, followed by the caller's filter
//! tree when there is one.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{Result, SearchGateError};
use crate::mapping::{CONTENT_TYPE_FIELD, Dialect, EDGENGRAMS_FIELD, Mapping, format_boost};
use crate::object::FieldValue;
use crate::object::value::DATE_FORMAT;
use crate::query::filter::{Condition, Filter, SUPPORTED_LOOKUPS};
use crate::query::search_query::{Operator, SearchQuery};
use crate::schema::{AttributeType, FieldSpec, SearchField, TypeInfo, TypeRegistry};

/// What to search: a type (with its subtypes), an optional filter tree and an ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchScope {
    pub type_id: String,
    pub filter: Option<Filter>,
    /// Attribute names, `-` prefixed for descending order.
    pub order_by: Vec<String>,
}

impl SearchScope {
    /// Create a new scope over `type_id` and its subtypes, with no filter.
    pub fn new<S: Into<String>>(type_id: S) -> Self {
        SearchScope {
            type_id: type_id.into(),
            filter: None,
            order_by: Vec::new(),
        }
    }

    /// Add a filter; successive calls are combined with AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Add a filter that matching objects must not satisfy.
    pub fn exclude(self, filter: Filter) -> Self {
        self.filter(filter.negate())
    }

    /// Restrict the scope to nothing.
    pub fn none(self) -> Self {
        self.filter(Filter::MatchNone)
    }

    /// Append sort attributes, e.g. `["-publication_date", "title"]`.
    /// Only used when relevance ordering is turned off.
    pub fn order_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by.extend(fields.into_iter().map(Into::into));
        self
    }
}

/// Per-request options.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Restrict matching to these search fields; `None` searches all of them.
    pub fields: Option<Vec<String>>,
    /// Overrides the operator carried by the query.
    pub operator: Option<Operator>,
    /// When true the scope's ordering is ignored and results come back by score.
    pub order_by_relevance: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            fields: None,
            operator: None,
            order_by_relevance: true,
        }
    }
}

impl SearchOptions {
    /// Search only these declared search fields.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Combine query terms with `operator`.
    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn order_by_relevance(mut self, order_by_relevance: bool) -> Self {
        self.order_by_relevance = order_by_relevance;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    Search,
    Autocomplete,
}

/// A compiled request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDocument {
    pub query: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
}

/// Resolve a filter or ordering name to the declared filter field.
///
/// A filter field on a single relation also answers to `<name>_id`.
pub fn resolve_filter_field<'i>(info: &'i TypeInfo, name: &str) -> Option<&'i str> {
    info.fields().iter().find_map(|spec| {
        let FieldSpec::Filter(field) = spec else {
            return None;
        };
        if field.field_name == name {
            return Some(field.field_name.as_str());
        }
        let single_relation = matches!(
            info.attribute(&field.field_name).map(|a| &a.kind),
            Some(AttributeType::Relation { many: false, .. })
        );
        (single_relation && name == format!("{}_id", field.field_name))
            .then_some(field.field_name.as_str())
    })
}

/// Validate a request against the registry without compiling it.
pub fn check_query(
    registry: &TypeRegistry,
    scope: &SearchScope,
    query: &SearchQuery,
    options: &SearchOptions,
    mode: CompileMode,
) -> Result<()> {
    let info = registry.get(&scope.type_id)?;

    if mode == CompileMode::Autocomplete
        && matches!(query, SearchQuery::Phrase { .. } | SearchQuery::Fuzzy { .. })
    {
        return Err(SearchGateError::unsupported_query(format!(
            "{} queries are not supported for autocomplete",
            query.kind_name()
        )));
    }

    if let Some(fields) = &options.fields {
        for name in fields {
            check_search_field(info, name, mode)?;
        }
    }

    if let Some(filter) = &scope.filter {
        for condition in filter.conditions() {
            check_condition(info, condition)?;
        }
    }

    if !options.order_by_relevance {
        check_order_by(info, &scope.order_by)?;
    }

    Ok(())
}

fn check_search_field(info: &TypeInfo, name: &str, mode: CompileMode) -> Result<()> {
    let declared = info.fields().iter().find_map(|spec| match spec {
        FieldSpec::Search(field) if field.field_name == name => Some(field),
        _ => None,
    });
    match (declared, mode) {
        (Some(_), CompileMode::Search) => Ok(()),
        (Some(field), CompileMode::Autocomplete) if field.partial_match => Ok(()),
        (Some(_), CompileMode::Autocomplete) => Err(SearchGateError::search_field(
            name,
            format!(
                "Cannot autocomplete with field \"{name}\". Please enable partial_match on SearchField(\"{name}\") in {}.search_fields.",
                info.model_name()
            ),
        )),
        (None, _) => Err(SearchGateError::search_field(
            name,
            format!(
                "Cannot search with field \"{name}\". Please add SearchField(\"{name}\") to {}.search_fields.",
                info.model_name()
            ),
        )),
    }
}

fn check_condition(info: &TypeInfo, condition: &Condition) -> Result<()> {
    if resolve_filter_field(info, &condition.field).is_none() {
        return Err(SearchGateError::filter_field(
            &condition.field,
            format!(
                "Cannot filter search results with field \"{}\". Please add FilterField(\"{}\") to {}.search_fields.",
                condition.field,
                condition.field,
                info.model_name()
            ),
        ));
    }

    match condition.transform.as_deref() {
        None => {
            if !SUPPORTED_LOOKUPS.contains(&condition.lookup.as_str()) {
                return Err(unrecognised_lookup(condition));
            }
        }
        Some("year") => {
            if !["exact", "gt", "gte", "lt", "lte"].contains(&condition.lookup.as_str()) {
                return Err(unrecognised_lookup(condition));
            }
            year_bounds(condition)?;
        }
        Some(transform) => {
            return Err(SearchGateError::filter(format!(
                "Cannot apply filter on search results: \"{transform}\" queries are not supported."
            )));
        }
    }

    match condition.lookup.as_str() {
        "range" if !matches!(&condition.value, FieldValue::List(items) if items.len() == 2) => {
            Err(SearchGateError::filter(format!(
                "Cannot apply filter on search results: \"{condition}\". A range needs exactly two bounds."
            )))
        }
        "isnull" if !matches!(condition.value, FieldValue::Boolean(_)) => {
            Err(SearchGateError::filter(format!(
                "Cannot apply filter on search results: \"{condition}\". isnull takes true or false."
            )))
        }
        _ => Ok(()),
    }
}

fn check_order_by(info: &TypeInfo, order_by: &[String]) -> Result<()> {
    for entry in order_by {
        let name = entry.trim_start_matches('-');
        if resolve_filter_field(info, name).is_none() {
            return Err(SearchGateError::order_by_field(
                name,
                format!(
                    "Cannot sort search results with field \"{name}\". Please add FilterField(\"{name}\") to {}.search_fields.",
                    info.model_name()
                ),
            ));
        }
    }
    Ok(())
}

fn unrecognised_lookup(condition: &Condition) -> SearchGateError {
    SearchGateError::filter(format!(
        "Could not apply filter on search results: \"{condition}\". Lookup \"{}\" not recognised.",
        condition.lookup
    ))
}

/// First day of the filtered year and of the year after it.
fn year_bounds(condition: &Condition) -> Result<(String, String)> {
    let Some(year) = condition.value.as_i64() else {
        return Err(SearchGateError::filter(format!(
            "Cannot apply filter on search results: \"{condition}\". A year must be an integer."
        )));
    };
    let jan_first = |year: i64| {
        i32::try_from(year)
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
            .map(|date| date.format(DATE_FORMAT).to_string())
    };
    match (jan_first(year), year.checked_add(1).and_then(jan_first)) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(SearchGateError::filter(format!(
            "Cannot apply filter on search results: \"{condition}\". Year {year} is out of range."
        ))),
    }
}

/// Compiler for one search or autocomplete request.
#[derive(Debug)]
pub struct SearchQueryCompiler<'a> {
    registry: &'a TypeRegistry,
    mapping: Mapping<'a>,
    scope: &'a SearchScope,
    query: SearchQuery,
    options: SearchOptions,
    mode: CompileMode,
}

impl<'a> SearchQueryCompiler<'a> {
    /// Create a new compiler for a full-text search.
    pub fn new(
        registry: &'a TypeRegistry,
        dialect: &'a dyn Dialect,
        scope: &'a SearchScope,
        query: SearchQuery,
        options: SearchOptions,
    ) -> Result<Self> {
        Self::with_mode(registry, dialect, scope, query, options, CompileMode::Search)
    }

    /// Create a new compiler for an autocomplete search.
    pub fn autocomplete(
        registry: &'a TypeRegistry,
        dialect: &'a dyn Dialect,
        scope: &'a SearchScope,
        query: SearchQuery,
        options: SearchOptions,
    ) -> Result<Self> {
        Self::with_mode(registry, dialect, scope, query, options, CompileMode::Autocomplete)
    }

    fn with_mode(
        registry: &'a TypeRegistry,
        dialect: &'a dyn Dialect,
        scope: &'a SearchScope,
        query: SearchQuery,
        options: SearchOptions,
        mode: CompileMode,
    ) -> Result<Self> {
        let query = match options.operator {
            Some(operator) => query.with_operator(operator),
            None => query,
        };
        Ok(SearchQueryCompiler {
            registry,
            mapping: Mapping::new(registry, dialect, &scope.type_id)?,
            scope,
            query,
            options,
            mode,
        })
    }

    /// Validate fields, filters and ordering without building anything.
    pub fn check(&self) -> Result<()> {
        check_query(self.registry, self.scope, &self.query, &self.options, self.mode)
    }

    /// Requested search fields in declaration order, with their boosts.
    fn selected_fields(&self, names: &[String]) -> Vec<&'a SearchField> {
        let info = self.mapping.info();
        info.fields()
            .iter()
            .filter_map(|spec| match spec {
                FieldSpec::Search(field) if names.contains(&field.field_name) => {
                    Some(field)
                }
                _ => None,
            })
            .collect()
    }

    /// The `must` clause: what the query text has to match.
    pub fn get_inner_query(&self) -> Result<Value> {
        match self.mode {
            CompileMode::Search => self.search_inner_query(),
            CompileMode::Autocomplete => self.autocomplete_inner_query(),
        }
    }

    fn search_inner_query(&self) -> Result<Value> {
        let Some(text) = self.query.text() else {
            return Ok(json!({"match_all": {}}));
        };

        // (column, boost) pairs for a single field, "column^boost" strings for several.
        let columns: Vec<(String, Option<f64>)> = match &self.options.fields {
            None => self
                .mapping
                .all_text_query_fields()
                .into_iter()
                .map(|f| (f, None))
                .collect(),
            Some(names) => self
                .selected_fields(names)
                .into_iter()
                .map(|f| (self.mapping.search_column(&f.field_name), f.effective_boost()))
                .collect(),
        };

        let operator = self.query.operator();
        if let [(column, boost)] = columns.as_slice() {
            let mut params = Map::new();
            params.insert("query".into(), json!(text));
            if let Some(boost) = boost {
                params.insert("boost".into(), json!(boost));
            }
            return Ok(match &self.query {
                SearchQuery::Phrase { .. } => json!({"match_phrase": {column: params}}),
                SearchQuery::Fuzzy { .. } => {
                    params.insert("fuzziness".into(), json!("AUTO"));
                    insert_operator(&mut params, operator);
                    json!({"match": {column: params}})
                }
                _ => {
                    insert_operator(&mut params, operator);
                    json!({"match": {column: params}})
                }
            });
        }

        let fields: Vec<String> = columns
            .into_iter()
            .map(|(column, boost)| match boost {
                Some(boost) => format!("{column}^{}", format_boost(boost)),
                None => column,
            })
            .collect();
        let mut params = Map::new();
        params.insert("query".into(), json!(text));
        params.insert("fields".into(), json!(fields));
        match &self.query {
            SearchQuery::Phrase { .. } => {
                params.insert("type".into(), json!("phrase"));
            }
            SearchQuery::Fuzzy { .. } => {
                params.insert("fuzziness".into(), json!("AUTO"));
                insert_operator(&mut params, operator);
            }
            _ => insert_operator(&mut params, operator),
        }
        Ok(json!({"multi_match": params}))
    }

    fn autocomplete_inner_query(&self) -> Result<Value> {
        let text = match &self.query {
            SearchQuery::MatchAll => return Ok(json!({"match_all": {}})),
            SearchQuery::PlainText { text, .. } => text,
            other => {
                return Err(SearchGateError::unsupported_query(format!(
                    "{} queries are not supported for autocomplete",
                    other.kind_name()
                )));
            }
        };

        let columns: Vec<String> = match &self.options.fields {
            None => vec![EDGENGRAMS_FIELD.to_string()],
            Some(names) => self
                .selected_fields(names)
                .into_iter()
                .map(|f| self.mapping.edgengram_column(&f.field_name))
                .collect(),
        };

        let mut params = Map::new();
        params.insert("query".into(), json!(text));
        if let [column] = columns.as_slice() {
            insert_operator(&mut params, self.query.operator());
            return Ok(json!({"match": {column: params}}));
        }
        params.insert("fields".into(), json!(columns));
        insert_operator(&mut params, self.query.operator());
        Ok(json!({"multi_match": params}))
    }

    /// Restricts hits to the scope type, subtypes included.
    pub fn get_content_type_filter(&self) -> Value {
        json!({"match": {CONTENT_TYPE_FIELD: self.mapping.type_id()}})
    }

    /// The content type filter followed by the compiled filter tree, if any.
    pub fn get_filters(&self) -> Result<Vec<Value>> {
        let mut filters = vec![self.get_content_type_filter()];
        if let Some(filter) = &self.scope.filter
            && let Some(compiled) = self.compile_filter(filter)?
        {
            filters.push(compiled);
        }
        Ok(filters)
    }

    /// `None` when the filter restricts nothing.
    fn compile_filter(&self, filter: &Filter) -> Result<Option<Value>> {
        match filter {
            Filter::Condition(condition) => self.compile_condition(condition).map(Some),
            Filter::MatchNone => Ok(Some(json!({"bool": {"must_not": {"match_all": {}}}}))),
            Filter::Not(inner) => Ok(Some(match self.compile_filter(inner)? {
                Some(compiled) => json!({"bool": {"must_not": compiled}}),
                None => json!({"bool": {"must_not": {"match_all": {}}}}),
            })),
            Filter::And(children) => {
                let mut compiled = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(clause) = self.compile_filter(child)? {
                        compiled.push(clause);
                    }
                }
                Ok(match compiled.len() {
                    0 => None,
                    1 => compiled.pop(),
                    _ => Some(json!({"bool": {"must": compiled}})),
                })
            }
            Filter::Or(children) => {
                let mut compiled = Vec::with_capacity(children.len());
                for child in children {
                    match self.compile_filter(child)? {
                        Some(clause) => compiled.push(clause),
                        // One unrestricted branch makes the whole disjunction unrestricted.
                        None => return Ok(None),
                    }
                }
                Ok(match compiled.len() {
                    0 => Some(json!({"bool": {"must_not": {"match_all": {}}}})),
                    1 => compiled.pop(),
                    _ => Some(json!({"bool": {"should": compiled}})),
                })
            }
        }
    }

    fn compile_condition(&self, condition: &Condition) -> Result<Value> {
        check_condition(self.mapping.info(), condition)?;
        let declared = resolve_filter_field(self.mapping.info(), &condition.field)
            .unwrap_or(&condition.field);
        let column = self.mapping.filter_column(declared);

        if condition.transform.as_deref() == Some("year") {
            let (start, end) = year_bounds(condition)?;
            return Ok(match condition.lookup.as_str() {
                "gte" => json!({"range": {column: {"gte": start}}}),
                "gt" => json!({"range": {column: {"gte": end}}}),
                "lte" => json!({"range": {column: {"lt": end}}}),
                "lt" => json!({"range": {column: {"lt": start}}}),
                _ => json!({"range": {column: {"gte": start, "lt": end}}}),
            });
        }

        let value = &condition.value;
        Ok(match condition.lookup.as_str() {
            "exact" if value.is_null() => missing(&column),
            "exact" => json!({"term": {column: value.to_filter_json()}}),
            "isnull" if matches!(value, FieldValue::Boolean(true)) => missing(&column),
            "isnull" => json!({"exists": {"field": column}}),
            "startswith" => json!({"prefix": {column: value.to_filter_json()}}),
            "range" => {
                let bounds = value.to_filter_json();
                json!({"range": {column: {"gte": bounds[0], "lte": bounds[1]}}})
            }
            op => json!({"range": {column: {op: value.to_filter_json()}}}),
        })
    }

    /// The full `bool` query with filters and the inner query.
    pub fn get_query(&self) -> Result<Value> {
        let inner = self.get_inner_query()?;
        let mut filters = self.get_filters()?;
        let filter = if filters.len() == 1 {
            filters.remove(0)
        } else {
            Value::Array(filters)
        };
        Ok(json!({"bool": {"filter": filter, "must": inner}}))
    }

    /// Sort terms, or `None` to keep the engine's relevance order.
    pub fn get_sort(&self) -> Result<Option<Value>> {
        if self.options.order_by_relevance || self.scope.order_by.is_empty() {
            return Ok(None);
        }
        check_order_by(self.mapping.info(), &self.scope.order_by)?;

        let terms: Vec<Value> = self
            .scope
            .order_by
            .iter()
            .map(|entry| {
                let (name, direction) = match entry.strip_prefix('-') {
                    Some(name) => (name, "desc"),
                    None => (entry.as_str(), "asc"),
                };
                let declared = resolve_filter_field(self.mapping.info(), name).unwrap_or(name);
                json!({ self.mapping.filter_column(declared): direction })
            })
            .collect();
        Ok(Some(Value::Array(terms)))
    }

    /// Check the request, then build its query body and sort.
    pub fn compile(&self) -> Result<QueryDocument> {
        self.check()?;
        Ok(QueryDocument {
            query: self.get_query()?,
            sort: self.get_sort()?,
        })
    }
}

fn insert_operator(params: &mut Map<String, Value>, operator: Operator) {
    if operator == Operator::And {
        params.insert("operator".into(), json!(operator.as_str()));
    }
}

fn missing(column: &str) -> Value {
    json!({"bool": {"must_not": {"exists": {"field": column}}}})
}

/// Compile a search over `scope` into an engine request body.
pub fn compile<Q: Into<SearchQuery>>(
    registry: &TypeRegistry,
    dialect: &dyn Dialect,
    scope: &SearchScope,
    query: Q,
    options: SearchOptions,
) -> Result<QueryDocument> {
    SearchQueryCompiler::new(registry, dialect, scope, query.into(), options)?.compile()
}

/// Compile a prefix search over the partial-match fields of `scope`.
pub fn compile_autocomplete<Q: Into<SearchQuery>>(
    registry: &TypeRegistry,
    dialect: &dyn Dialect,
    scope: &SearchScope,
    query: Q,
    options: SearchOptions,
) -> Result<QueryDocument> {
    SearchQueryCompiler::autocomplete(registry, dialect, scope, query.into(), options)?.compile()
}
