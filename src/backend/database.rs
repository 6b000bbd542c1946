//! Backend that evaluates searches in process against the object store.
//!
//! It accepts the same scopes, queries and options as the engine backends and
//! raises the same field and filter errors. There is no physical index to
//! maintain: indexing calls are no-ops and a rebuild is never required.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::backend::SearchBackend;
use crate::backend::config::{BackendConfig, DatabaseCapabilities};
use crate::engine::analysis::{contains_sequence, standard_tokens};
use crate::error::{Result, SearchGateError};
use crate::index::{NullIndex, SearchIndex};
use crate::object::{FieldValue, ObjectStore, Searchable, SnapshotScope};
use crate::query::{
    CompileMode, Condition, Filter, Operator, SearchOptions, SearchQuery, SearchScope,
    check_query, resolve_filter_field,
};
use crate::rebuild::IndexRebuilder;
use crate::results::{ResultFetcher, SearchHit, SearchResults};
use crate::schema::{FieldSpec, SearchField, TypeInfo, TypeRegistry};

pub struct DatabaseBackend {
    name: String,
    config: BackendConfig,
    registry: Arc<TypeRegistry>,
    store: Arc<dyn ObjectStore>,
    capabilities: DatabaseCapabilities,
}

impl fmt::Debug for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseBackend")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl DatabaseBackend {
    pub fn new<S: Into<String>>(
        name: S,
        config: BackendConfig,
        registry: Arc<TypeRegistry>,
        store: Arc<dyn ObjectStore>,
        capabilities: DatabaseCapabilities,
    ) -> Self {
        DatabaseBackend {
            name: name.into(),
            config,
            registry,
            store,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> DatabaseCapabilities {
        self.capabilities
    }
}

impl SearchBackend for DatabaseBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    fn execute(
        &self,
        scope: &SearchScope,
        query: SearchQuery,
        options: SearchOptions,
        mode: CompileMode,
    ) -> Result<SearchResults> {
        let query = match options.operator {
            Some(operator) => query.with_operator(operator),
            None => query,
        };
        check_query(&self.registry, scope, &query, &options, mode)?;
        if mode == CompileMode::Search && matches!(query, SearchQuery::Fuzzy { .. }) {
            return Err(SearchGateError::unsupported_query(
                "Fuzzy queries are not supported by the database backend",
            ));
        }

        let fetcher = DatabaseResultFetcher {
            registry: self.registry.clone(),
            store: self.store.clone(),
            capabilities: self.capabilities,
            scope: scope.clone(),
            query,
            options,
            mode,
            evaluated: Mutex::new(None),
        };
        Ok(SearchResults::new(Arc::new(fetcher)))
    }

    fn get_index_for_model(&self, type_id: &str) -> Result<Arc<dyn SearchIndex>> {
        self.registry.get(type_id)?;
        Ok(Arc::new(NullIndex))
    }

    fn rebuilder_for(&self, _index_name: &str) -> Result<Option<Box<dyn IndexRebuilder>>> {
        Ok(None)
    }
}

/// Evaluates the request on first use and keeps the ranked hits.
struct DatabaseResultFetcher {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn ObjectStore>,
    capabilities: DatabaseCapabilities,
    scope: SearchScope,
    query: SearchQuery,
    options: SearchOptions,
    mode: CompileMode,
    evaluated: Mutex<Option<Arc<Vec<SearchHit>>>>,
}

impl fmt::Debug for DatabaseResultFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseResultFetcher")
            .field("scope", &self.scope)
            .field("query", &self.query)
            .field("mode", &self.mode)
            .finish()
    }
}

impl DatabaseResultFetcher {
    fn hits(&self) -> Result<Arc<Vec<SearchHit>>> {
        let mut evaluated = self.evaluated.lock();
        if let Some(hits) = evaluated.as_ref() {
            return Ok(hits.clone());
        }
        let hits = Arc::new(self.evaluate()?);
        *evaluated = Some(hits.clone());
        Ok(hits)
    }

    fn evaluate(&self) -> Result<Vec<SearchHit>> {
        let info = self.registry.get(&self.scope.type_id)?;
        let snapshot = self
            .store
            .snapshot(&self.scope.type_id, SnapshotScope::WithDescendants)?;
        let candidates = snapshot.slice(0, snapshot.count());
        let matcher = TextMatcher::new(info, &self.query, &self.options, self.mode, self.capabilities);

        let mut hits = Vec::new();
        for object in candidates {
            if let Some(filter) = &self.scope.filter
                && !matches_filter(info, filter, object.as_ref())
            {
                continue;
            }
            if let Some(score) = matcher.score(object.as_ref()) {
                hits.push(SearchHit {
                    object,
                    score: matcher.scores().then_some(score),
                });
            }
        }

        if !self.options.order_by_relevance && !self.scope.order_by.is_empty() {
            sort_by_fields(info, &self.scope.order_by, &mut hits);
        } else if matcher.scores() {
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(Ordering::Equal)
            });
        }

        debug!(
            "Database search on {} matched {} objects",
            self.scope.type_id,
            hits.len()
        );
        Ok(hits)
    }
}

impl ResultFetcher for DatabaseResultFetcher {
    fn fetch(&self, start: usize, stop: Option<usize>) -> Result<Vec<SearchHit>> {
        let hits = self.hits()?;
        let stop = stop.unwrap_or(hits.len()).min(hits.len());
        Ok(hits[start.min(stop)..stop].to_vec())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.hits()?.len())
    }
}

/// Full-text matching over the selected search fields.
struct TextMatcher<'a> {
    fields: Vec<&'a SearchField>,
    terms: Vec<String>,
    phrase: Option<String>,
    operator: Operator,
    prefix: bool,
    full_text: bool,
    match_all: bool,
}

impl<'a> TextMatcher<'a> {
    fn new(
        info: &'a TypeInfo,
        query: &SearchQuery,
        options: &SearchOptions,
        mode: CompileMode,
        capabilities: DatabaseCapabilities,
    ) -> Self {
        let fields: Vec<&SearchField> = info
            .fields()
            .iter()
            .filter_map(|spec| match spec {
                FieldSpec::Search(field) => Some(field),
                _ => None,
            })
            .filter(|field| match &options.fields {
                Some(names) => names.contains(&field.field_name),
                None => mode == CompileMode::Search || field.partial_match,
            })
            .collect();

        let text = query.text().unwrap_or_default();
        TextMatcher {
            fields,
            terms: standard_tokens(text),
            phrase: matches!(query, SearchQuery::Phrase { .. }).then(|| text.trim().to_lowercase()),
            operator: query.operator(),
            prefix: mode == CompileMode::Autocomplete,
            full_text: capabilities.full_text,
            match_all: matches!(query, SearchQuery::MatchAll),
        }
    }

    fn scores(&self) -> bool {
        !self.match_all
    }

    /// Weighted hit count, or `None` when the object does not match.
    fn score(&self, object: &dyn Searchable) -> Option<f64> {
        if self.match_all {
            return Some(0.0);
        }

        let mut score = 0.0;
        let mut matched_terms = vec![false; self.terms.len()];
        let mut phrase_matched = false;
        for field in &self.fields {
            let Some(text) = object
                .attribute(&field.field_name)
                .and_then(|attribute| attribute.to_value().as_text())
            else {
                continue;
            };
            let boost = field.boost.unwrap_or(1.0);
            let tokens = standard_tokens(&text);

            if let Some(phrase) = &self.phrase {
                let found = if self.full_text {
                    contains_sequence(&tokens, &self.terms)
                } else {
                    !phrase.is_empty() && text.to_lowercase().contains(phrase.as_str())
                };
                if found {
                    phrase_matched = true;
                    score += boost;
                }
                continue;
            }

            let lowered = text.to_lowercase();
            for (i, term) in self.terms.iter().enumerate() {
                let hits = if self.prefix {
                    tokens.iter().filter(|t| t.starts_with(term.as_str())).count()
                } else if self.full_text {
                    tokens.iter().filter(|t| *t == term).count()
                } else {
                    lowered.matches(term.as_str()).count()
                };
                if hits > 0 {
                    matched_terms[i] = true;
                    score += boost * hits as f64;
                }
            }
        }

        let matched = if self.phrase.is_some() {
            phrase_matched
        } else {
            match self.operator {
                Operator::And => !matched_terms.is_empty() && matched_terms.iter().all(|m| *m),
                Operator::Or => matched_terms.iter().any(|m| *m),
            }
        };
        matched.then_some(score)
    }
}

/// Scalar view of the attribute a filter or ordering names.
fn filter_value(info: &TypeInfo, name: &str, object: &dyn Searchable) -> FieldValue {
    let declared = resolve_filter_field(info, name).unwrap_or(name);
    object
        .attribute(declared)
        .map(|attribute| attribute.to_value())
        .unwrap_or(FieldValue::Null)
}

fn matches_filter(info: &TypeInfo, filter: &Filter, object: &dyn Searchable) -> bool {
    match filter {
        Filter::Condition(condition) => matches_condition(info, condition, object),
        Filter::And(children) => children.iter().all(|c| matches_filter(info, c, object)),
        Filter::Or(children) => children.iter().any(|c| matches_filter(info, c, object)),
        Filter::Not(inner) => !matches_filter(info, inner, object),
        Filter::MatchNone => false,
    }
}

fn matches_condition(info: &TypeInfo, condition: &Condition, object: &dyn Searchable) -> bool {
    let value = filter_value(info, &condition.field, object);
    let candidates: Vec<FieldValue> = match value {
        FieldValue::List(items) if condition.lookup != "isnull" => items,
        other => vec![other],
    };

    if condition.transform.as_deref() == Some("year") {
        let Some(year) = condition.value.as_i64() else {
            return false;
        };
        return candidates.iter().any(|candidate| {
            candidate.year().is_some_and(|actual| {
                compare_lookup(&condition.lookup, i64::from(actual).cmp(&year))
            })
        });
    }

    let expected = &condition.value;
    match condition.lookup.as_str() {
        "isnull" => {
            let is_null = match &candidates[..] {
                [FieldValue::List(items)] => items.is_empty(),
                [single] => single.is_null(),
                _ => false,
            };
            matches!(expected, FieldValue::Boolean(b) if *b == is_null)
        }
        "exact" if expected.is_null() => candidates.iter().any(FieldValue::is_null),
        "exact" => candidates.iter().any(|c| c.loosely_equals(expected)),
        "startswith" => {
            let Some(prefix) = expected.as_text() else {
                return false;
            };
            candidates
                .iter()
                .filter_map(FieldValue::as_text)
                .any(|text| text.starts_with(&prefix))
        }
        "range" => {
            let FieldValue::List(bounds) = expected else {
                return false;
            };
            let [low, high] = &bounds[..] else {
                return false;
            };
            candidates.iter().any(|c| {
                matches!(c.compare(low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(c.compare(high), Some(Ordering::Less | Ordering::Equal))
            })
        }
        lookup => candidates
            .iter()
            .any(|c| c.compare(expected).is_some_and(|o| compare_lookup(lookup, o))),
    }
}

fn compare_lookup(lookup: &str, ordering: Ordering) -> bool {
    match lookup {
        "exact" => ordering == Ordering::Equal,
        "gt" => ordering == Ordering::Greater,
        "gte" => ordering != Ordering::Less,
        "lt" => ordering == Ordering::Less,
        "lte" => ordering != Ordering::Greater,
        _ => false,
    }
}

/// Stable multi-key sort; nulls and incomparable values go last.
fn sort_by_fields(info: &TypeInfo, order_by: &[String], hits: &mut [SearchHit]) {
    let keys: Vec<(&str, bool)> = order_by
        .iter()
        .map(|entry| match entry.strip_prefix('-') {
            Some(name) => (name, true),
            None => (entry.as_str(), false),
        })
        .collect();

    hits.sort_by(|a, b| {
        for (name, descending) in &keys {
            let left = filter_value(info, name, a.object.as_ref());
            let right = filter_value(info, name, b.object.as_ref());
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ordering = left.compare(&right).unwrap_or(Ordering::Equal);
                    if *descending { ordering.reverse() } else { ordering }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
