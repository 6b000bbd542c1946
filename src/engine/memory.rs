//! In-process engine.
//!
//! Holds indices, aliases and cursors in memory and evaluates the request
//! bodies produced by the query compiler: `match`, `multi_match` (best fields
//! and phrase), `match_phrase`, `bool`, `term`, `prefix`, `range`, `exists` and
//! `match_all`. Indexed documents are searchable as soon as they are written.
//!
//! Scores are a simple matched-term ratio multiplied by boosts; only their
//! relative order is meaningful.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate};
use log::debug;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::engine::analysis::{EdgeNgramConfig, contains_sequence, standard_tokens};
use crate::engine::client::{EngineClient, Hit, SearchRequest, SearchResponse};
use crate::error::{Result, SearchGateError};
use crate::mapping::{EDGENGRAM_ANALYZER, PK_FIELD};
use crate::object::FieldValue;
use crate::object::value::DATE_FORMAT;
use crate::query::Operator;
use crate::util::levenshtein::fuzzy_matches;

/// Largest `from + size` accepted by a plain (non-cursor) search.
pub const DEFAULT_MAX_RESULT_WINDOW: usize = 10_000;

const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text { edgengram: bool },
    Keyword,
    Numeric,
    Date,
    Boolean,
    Object,
}

#[derive(Debug, Clone)]
struct FieldDef {
    kind: FieldKind,
    copy_to: Vec<String>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    source: Value,
    fields: HashMap<String, Vec<Value>>,
}

#[derive(Debug)]
struct MemoryIndex {
    settings: Value,
    properties: Map<String, Value>,
    defs: BTreeMap<String, FieldDef>,
    ngrams: EdgeNgramConfig,
    documents: BTreeMap<String, StoredDocument>,
    next_seq: u64,
}

impl MemoryIndex {
    fn new(body: &Value) -> Self {
        let settings = body.get("settings").cloned().unwrap_or(Value::Object(Map::new()));
        let properties = body["mappings"]["properties"]
            .as_object()
            .cloned()
            .unwrap_or_default();
        let mut index = MemoryIndex {
            ngrams: EdgeNgramConfig::from_settings(&settings),
            settings,
            properties,
            defs: BTreeMap::new(),
            documents: BTreeMap::new(),
            next_seq: 0,
        };
        index.rebuild_defs();
        index
    }

    fn rebuild_defs(&mut self) {
        let mut defs = BTreeMap::new();
        collect_field_defs(&self.properties, "", &mut defs);
        self.defs = defs;

        let sources: Vec<(String, Value)> = self
            .documents
            .iter()
            .map(|(id, doc)| (id.clone(), doc.source.clone()))
            .collect();
        for (id, source) in sources {
            let fields = self.flatten(&source);
            if let Some(doc) = self.documents.get_mut(&id) {
                doc.fields = fields;
            }
        }
    }

    fn put(&mut self, id: &str, source: Value) {
        let fields = self.flatten(&source);
        let seq = match self.documents.get(id) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.documents.insert(id.to_string(), StoredDocument { seq, source, fields });
    }

    fn flatten(&self, source: &Value) -> HashMap<String, Vec<Value>> {
        let mut out = HashMap::new();
        if let Some(object) = source.as_object() {
            self.flatten_object(object, "", &mut out);
        }
        out
    }

    fn flatten_object(&self, object: &Map<String, Value>, prefix: &str, out: &mut HashMap<String, Vec<Value>>) {
        for (key, value) in object {
            let path = format!("{prefix}{key}");
            let Some(def) = self.defs.get(&path) else {
                continue;
            };
            if def.kind == FieldKind::Object {
                let child_prefix = format!("{path}.");
                match value {
                    Value::Object(child) => self.flatten_object(child, &child_prefix, out),
                    Value::Array(items) => {
                        for item in items.iter().filter_map(Value::as_object) {
                            self.flatten_object(item, &child_prefix, out);
                        }
                    }
                    _ => {}
                }
                continue;
            }

            let leaves: Vec<Value> = match value {
                Value::Null => continue,
                Value::Array(items) => items.iter().filter(|v| !v.is_null()).cloned().collect(),
                other => vec![other.clone()],
            };
            for target in &def.copy_to {
                out.entry(target.clone()).or_default().extend(leaves.iter().cloned());
            }
            out.entry(path).or_default().extend(leaves);
        }
    }
}

fn collect_field_defs(properties: &Map<String, Value>, prefix: &str, defs: &mut BTreeMap<String, FieldDef>) {
    for (name, spec) in properties {
        let path = format!("{prefix}{name}");
        let kind = match spec["type"].as_str().unwrap_or("object") {
            "text" => FieldKind::Text {
                edgengram: spec["analyzer"].as_str() == Some(EDGENGRAM_ANALYZER),
            },
            "keyword" => FieldKind::Keyword,
            "integer" | "long" | "short" | "byte" | "double" | "float" => FieldKind::Numeric,
            "date" => FieldKind::Date,
            "boolean" => FieldKind::Boolean,
            _ => FieldKind::Object,
        };
        let copy_to = match &spec["copy_to"] {
            Value::String(target) => vec![target.clone()],
            Value::Array(targets) => targets
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        if kind == FieldKind::Object
            && let Some(children) = spec["properties"].as_object()
        {
            collect_field_defs(children, &format!("{path}."), defs);
        }
        defs.insert(path, FieldDef { kind, copy_to });
    }
}

fn merge_properties(into: &mut Map<String, Value>, from: &Map<String, Value>) {
    for (key, value) in from {
        if let Some(Value::Object(existing)) = into.get_mut(key)
            && let Some(Value::Object(existing_props)) = existing.get_mut("properties")
            && let Some(Value::Object(incoming_props)) = value.get("properties")
        {
            merge_properties(existing_props, incoming_props);
            continue;
        }
        into.insert(key.clone(), value.clone());
    }
}

/// Text rendering of a stored leaf value.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn as_field_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => FieldValue::Float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => {
            if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
                FieldValue::Date(date)
            } else if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                FieldValue::DateTime(dt.to_utc())
            } else {
                FieldValue::Text(s.clone())
            }
        }
        Value::Array(items) => FieldValue::List(items.iter().map(as_field_value).collect()),
        Value::Object(_) => FieldValue::Null,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Ordering with the coercions an engine applies: numeric strings compare as
/// numbers against numeric fields, date strings compare as dates.
fn compare_json(a: &Value, b: &Value) -> Option<Ordering> {
    if let Some(ordering) = as_field_value(a).compare(&as_field_value(b)) {
        return Some(ordering);
    }
    match (a, b) {
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => {
            (s.as_str() == x.to_string()).then_some(Ordering::Equal)
        }
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

fn clauses<'v>(body: &'v Map<String, Value>, key: &str) -> Vec<&'v Value> {
    match body.get(key) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(value) => vec![value],
        None => Vec::new(),
    }
}

/// The single `field: params` pair of a leaf query.
fn single_field<'v>(kind: &str, body: &'v Value) -> Result<(&'v str, &'v Value)> {
    let object = body.as_object().filter(|o| o.len() == 1).ok_or_else(|| {
        SearchGateError::backend(format!("[{kind}] query must name exactly one field"))
    })?;
    object
        .iter()
        .next()
        .map(|(field, params)| (field.as_str(), params))
        .ok_or_else(|| SearchGateError::backend(format!("[{kind}] query is empty")))
}

/// Query text, operator, boost and fuzziness of a `match`-style parameter block.
struct MatchParams {
    text: String,
    operator: Operator,
    boost: f64,
    fuzzy: bool,
}

impl MatchParams {
    fn parse(kind: &str, params: &Value) -> Result<Self> {
        let (query, object) = match params {
            Value::Object(object) => (object.get("query").unwrap_or(&Value::Null), Some(object)),
            other => (other, None),
        };
        let text = value_text(query)
            .ok_or_else(|| SearchGateError::backend(format!("[{kind}] query requires a query text")))?;
        let operator = match object.and_then(|o| o.get("operator")).and_then(Value::as_str) {
            Some(op) => op.parse().map_err(|_| {
                SearchGateError::backend(format!("[{kind}] unknown operator [{op}]"))
            })?,
            None => Operator::Or,
        };
        Ok(MatchParams {
            text,
            operator,
            boost: object
                .and_then(|o| o.get("boost"))
                .and_then(Value::as_f64)
                .unwrap_or(1.0),
            fuzzy: object.and_then(|o| o.get("fuzziness")).is_some(),
        })
    }
}

struct Evaluator<'a> {
    index: &'a MemoryIndex,
}

impl Evaluator<'_> {
    /// Score of `doc` for `query`, or `None` when it does not match.
    fn eval(&self, doc: &StoredDocument, query: &Value) -> Result<Option<f64>> {
        let (kind, body) = single_field("query", query)?;
        match kind {
            "match_all" => Ok(Some(1.0)),
            "bool" => {
                let body = body.as_object().ok_or_else(|| {
                    SearchGateError::backend("[bool] query must be an object")
                })?;
                self.eval_bool(doc, body)
            }
            "match" => {
                let (field, params) = single_field(kind, body)?;
                let params = MatchParams::parse(kind, params)?;
                Ok(self
                    .match_field(doc, field, &params, false)
                    .map(|score| score * params.boost))
            }
            "match_phrase" => {
                let (field, params) = single_field(kind, body)?;
                let params = MatchParams::parse(kind, params)?;
                Ok(self
                    .match_field(doc, field, &params, true)
                    .map(|score| score * params.boost))
            }
            "multi_match" => self.eval_multi_match(doc, body),
            "term" => {
                let (field, params) = single_field(kind, body)?;
                let expected = params.get("value").unwrap_or(params);
                let matched = self
                    .values(doc, field)
                    .iter()
                    .any(|v| compare_json(v, expected) == Some(Ordering::Equal));
                Ok(matched.then_some(1.0))
            }
            "prefix" => {
                let (field, params) = single_field(kind, body)?;
                let prefix = value_text(params.get("value").unwrap_or(params)).unwrap_or_default();
                let matched = self
                    .values(doc, field)
                    .iter()
                    .filter_map(value_text)
                    .any(|v| v.starts_with(&prefix));
                Ok(matched.then_some(1.0))
            }
            "range" => {
                let (field, bounds) = single_field(kind, body)?;
                let bounds = bounds.as_object().ok_or_else(|| {
                    SearchGateError::backend("[range] bounds must be an object")
                })?;
                let matched = self.values(doc, field).iter().any(|v| in_range(v, bounds));
                Ok(matched.then_some(1.0))
            }
            "exists" => {
                let field = body["field"].as_str().ok_or_else(|| {
                    SearchGateError::backend("[exists] query requires a field")
                })?;
                Ok((!self.values(doc, field).is_empty()).then_some(1.0))
            }
            other => Err(SearchGateError::backend(format!(
                "parsing_exception: unknown query [{other}]"
            ))),
        }
    }

    fn values<'d>(&self, doc: &'d StoredDocument, field: &str) -> &'d [Value] {
        doc.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    fn eval_bool(&self, doc: &StoredDocument, body: &Map<String, Value>) -> Result<Option<f64>> {
        let mut score = 0.0;
        let must = clauses(body, "must");
        let filter = clauses(body, "filter");

        for clause in &must {
            match self.eval(doc, clause)? {
                Some(s) => score += s,
                None => return Ok(None),
            }
        }
        for clause in &filter {
            if self.eval(doc, clause)?.is_none() {
                return Ok(None);
            }
        }
        for clause in clauses(body, "must_not") {
            if self.eval(doc, clause)?.is_some() {
                return Ok(None);
            }
        }

        let should = clauses(body, "should");
        let mut matched_should = 0;
        for clause in &should {
            if let Some(s) = self.eval(doc, clause)? {
                score += s;
                matched_should += 1;
            }
        }
        let required = match body.get("minimum_should_match").and_then(Value::as_u64) {
            Some(n) => n as usize,
            None if must.is_empty() && filter.is_empty() && !should.is_empty() => 1,
            None => 0,
        };
        Ok((matched_should >= required).then_some(score))
    }

    fn eval_multi_match(&self, doc: &StoredDocument, body: &Value) -> Result<Option<f64>> {
        let params = MatchParams::parse("multi_match", body)?;
        let phrase = body["type"].as_str() == Some("phrase");
        let fields = body["fields"].as_array().ok_or_else(|| {
            SearchGateError::backend("[multi_match] query requires fields")
        })?;

        let mut best: Option<f64> = None;
        for entry in fields.iter().filter_map(Value::as_str) {
            let (field, boost) = match entry.split_once('^') {
                Some((field, boost)) => (field, boost.parse().unwrap_or(1.0)),
                None => (entry, 1.0),
            };
            if let Some(score) = self.match_field(doc, field, &params, phrase) {
                let weighted = score * boost;
                best = Some(best.map_or(weighted, |b: f64| b.max(weighted)));
            }
        }
        Ok(best.map(|score| score * params.boost))
    }

    fn match_field(&self, doc: &StoredDocument, field: &str, params: &MatchParams, phrase: bool) -> Option<f64> {
        let def = self.index.defs.get(field)?;
        let values = doc.fields.get(field)?;

        let FieldKind::Text { edgengram } = def.kind else {
            let expected = Value::String(params.text.clone());
            return values
                .iter()
                .any(|v| compare_json(v, &expected) == Some(Ordering::Equal))
                .then_some(1.0);
        };

        let query_tokens = standard_tokens(&params.text);
        if query_tokens.is_empty() {
            return None;
        }

        if phrase {
            return values
                .iter()
                .filter_map(value_text)
                .any(|v| contains_sequence(&standard_tokens(&v), &query_tokens))
                .then_some(1.0);
        }

        let doc_tokens: HashSet<String> = values
            .iter()
            .filter_map(value_text)
            .flat_map(|v| {
                if edgengram {
                    self.index.ngrams.ngrams(&v)
                } else {
                    standard_tokens(&v)
                }
            })
            .collect();

        let matched = query_tokens
            .iter()
            .filter(|term| {
                doc_tokens.contains(*term)
                    || (params.fuzzy && doc_tokens.iter().any(|candidate| fuzzy_matches(term, candidate)))
            })
            .count();
        let accepted = match params.operator {
            Operator::And => matched == query_tokens.len(),
            Operator::Or => matched > 0,
        };
        accepted.then(|| matched as f64 / query_tokens.len() as f64)
    }
}

fn in_range(value: &Value, bounds: &Map<String, Value>) -> bool {
    bounds.iter().all(|(op, bound)| {
        let Some(ordering) = compare_json(value, bound) else {
            return false;
        };
        match op.as_str() {
            "gt" => ordering == Ordering::Greater,
            "gte" => ordering != Ordering::Less,
            "lt" => ordering == Ordering::Less,
            "lte" => ordering != Ordering::Greater,
            _ => true,
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Score(bool),
    Field { field: String, descending: bool },
}

fn parse_sort(sort: &Value) -> Result<Vec<SortKey>> {
    let items: Vec<&Value> = match sort {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        let (field, order) = match item {
            Value::String(field) => (field.as_str(), "asc"),
            Value::Object(_) => {
                let (field, order) = single_field("sort", item)?;
                let order = order
                    .as_str()
                    .or_else(|| order["order"].as_str())
                    .unwrap_or("asc");
                (field, order)
            }
            other => {
                return Err(SearchGateError::backend(format!("invalid sort entry {other}")));
            }
        };
        let descending = match order {
            "asc" => false,
            "desc" => true,
            other => {
                return Err(SearchGateError::backend(format!("invalid sort order [{other}]")));
            }
        };
        keys.push(match field {
            "_score" => SortKey::Score(descending),
            _ => SortKey::Field {
                field: field.to_string(),
                descending,
            },
        });
    }
    Ok(keys)
}

#[derive(Debug)]
struct Candidate<'a> {
    index_position: usize,
    index_name: &'a str,
    id: &'a str,
    doc: &'a StoredDocument,
    score: f64,
}

fn compare_candidates(keys: &[SortKey], a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    for key in keys {
        let ordering = match key {
            SortKey::Score(descending) => {
                let ordering = a.score.total_cmp(&b.score);
                if *descending { ordering.reverse() } else { ordering }
            }
            SortKey::Field { field, descending } => {
                let first = |c: &Candidate<'_>| c.doc.fields.get(field).and_then(|v| v.first()).cloned();
                match (first(a), first(b)) {
                    (Some(x), Some(y)) => {
                        let ordering = compare_json(&x, &y).unwrap_or(Ordering::Equal);
                        if *descending { ordering.reverse() } else { ordering }
                    }
                    // Missing values sort last in either direction.
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.index_position
        .cmp(&b.index_position)
        .then(a.doc.seq.cmp(&b.doc.seq))
}

#[derive(Debug)]
struct Cursor {
    hits: Vec<Hit>,
    position: usize,
    size: usize,
}

impl Cursor {
    fn next_page(&mut self) -> Vec<Hit> {
        let start = self.position.min(self.hits.len());
        let end = (start + self.size).min(self.hits.len());
        self.position = end;
        self.hits[start..end].to_vec()
    }
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    operation: String,
    transient: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    indices: BTreeMap<String, MemoryIndex>,
    aliases: BTreeMap<String, Vec<String>>,
    cursors: HashMap<String, Cursor>,
    next_cursor: u64,
    requests: Vec<SearchRequest>,
    scroll_calls: usize,
    failures: Vec<InjectedFailure>,
}

impl EngineState {
    fn take_failure(&mut self, operation: &str) -> Result<()> {
        let Some(position) = self.failures.iter().position(|f| f.operation == operation) else {
            return Ok(());
        };
        let failure = self.failures.remove(position);
        debug!("Injected failure for {operation}");
        if failure.transient {
            Err(SearchGateError::transient(format!("{operation}: connection reset")))
        } else {
            Err(SearchGateError::backend(format!("{operation}: request rejected")))
        }
    }

    /// Concrete indices behind an index or alias name.
    fn resolve(&self, name: &str) -> Result<Vec<String>> {
        if self.indices.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        match self.aliases.get(name) {
            Some(targets) if !targets.is_empty() => Ok(targets.clone()),
            _ => Err(index_not_found(name)),
        }
    }

    fn write_index(&mut self, name: &str) -> Result<&mut MemoryIndex> {
        let targets = self.resolve(name)?;
        let [target] = targets.as_slice() else {
            return Err(SearchGateError::backend(format!(
                "alias [{name}] has more than one index associated with it, cannot write"
            )));
        };
        let target = target.clone();
        self.indices
            .get_mut(&target)
            .ok_or_else(|| index_not_found(&target))
    }

    fn matching_hits(&self, index: &str, query: &Value, sort: Option<&Value>) -> Result<Vec<Hit>> {
        let names = self.resolve(index)?;
        let keys = match sort {
            Some(sort) => parse_sort(sort)?,
            None => vec![SortKey::Score(true)],
        };

        let mut candidates = Vec::new();
        for (position, name) in names.iter().enumerate() {
            let Some((index_name, memory_index)) = self.indices.get_key_value(name) else {
                return Err(index_not_found(name));
            };
            let evaluator = Evaluator { index: memory_index };
            for (id, doc) in &memory_index.documents {
                if let Some(score) = evaluator.eval(doc, query)? {
                    candidates.push(Candidate {
                        index_position: position,
                        index_name,
                        id,
                        doc,
                        score,
                    });
                }
            }
        }
        candidates.sort_by(|a, b| compare_candidates(&keys, a, b));

        Ok(candidates
            .into_iter()
            .map(|c| Hit {
                id: c.id.to_string(),
                index: c.index_name.to_string(),
                score: c.score,
                pk: c.doc.source[PK_FIELD]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| c.id.to_string()),
            })
            .collect())
    }
}

fn index_not_found(name: &str) -> SearchGateError {
    SearchGateError::backend(format!("index_not_found_exception: no such index [{name}]"))
}

/// An engine living entirely in memory.
#[derive(Debug)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
    max_result_window: usize,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        MemoryEngine {
            state: Mutex::new(EngineState::default()),
            max_result_window: DEFAULT_MAX_RESULT_WINDOW,
        }
    }

    pub fn with_max_result_window(mut self, max_result_window: usize) -> Self {
        self.max_result_window = max_result_window;
        self
    }

    /// Make the next call of `operation` (a trait method name) fail once.
    pub fn inject_failure<S: Into<String>>(&self, operation: S, transient: bool) {
        self.state.lock().failures.push(InjectedFailure {
            operation: operation.into(),
            transient,
        });
    }

    /// Search requests received so far, in order.
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.state.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        let mut state = self.state.lock();
        state.requests.clear();
        state.scroll_calls = 0;
    }

    /// Number of cursor continuation calls received.
    pub fn scroll_calls(&self) -> usize {
        self.state.lock().scroll_calls
    }

    /// Cursors opened and not yet cleared.
    pub fn open_scroll_count(&self) -> usize {
        self.state.lock().cursors.len()
    }

    /// Concrete index names.
    pub fn index_names(&self) -> Vec<String> {
        self.state.lock().indices.keys().cloned().collect()
    }

    /// Stored documents of an index or single-index alias, in write order.
    pub fn documents(&self, index: &str) -> Result<Vec<Value>> {
        let state = self.state.lock();
        let mut documents = Vec::new();
        for name in state.resolve(index)? {
            if let Some(memory_index) = state.indices.get(&name) {
                let mut docs: Vec<&StoredDocument> = memory_index.documents.values().collect();
                docs.sort_by_key(|d| d.seq);
                documents.extend(docs.into_iter().map(|d| d.source.clone()));
            }
        }
        Ok(documents)
    }

    /// Current mapping of a concrete index: `{"properties": {...}}`.
    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.state.lock().indices.get(index).map(|i| {
            let mut mapping = Map::new();
            mapping.insert("properties".to_string(), Value::Object(i.properties.clone()));
            Value::Object(mapping)
        })
    }

    pub fn settings(&self, index: &str) -> Option<Value> {
        self.state.lock().indices.get(index).map(|i| i.settings.clone())
    }
}

impl EngineClient for MemoryEngine {
    fn create_index(&self, name: &str, body: &Value) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure("create_index")?;
        if state.indices.contains_key(name) || state.aliases.contains_key(name) {
            return Err(SearchGateError::backend(format!(
                "resource_already_exists_exception: index [{name}] already exists"
            )));
        }
        debug!("Creating index {name}");
        state.indices.insert(name.to_string(), MemoryIndex::new(body));
        Ok(())
    }

    fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure("put_mapping")?;
        let memory_index = state.write_index(index)?;
        if let Some(properties) = mapping["properties"].as_object() {
            merge_properties(&mut memory_index.properties, properties);
            memory_index.rebuild_defs();
        }
        Ok(())
    }

    fn delete_index(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure("delete_index")?;
        if state.indices.remove(name).is_none() {
            return Err(index_not_found(name));
        }
        debug!("Deleted index {name}");
        for targets in state.aliases.values_mut() {
            targets.retain(|t| t != name);
        }
        state.aliases.retain(|_, targets| !targets.is_empty());
        Ok(())
    }

    fn index_exists(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.take_failure("index_exists")?;
        Ok(state.indices.contains_key(name))
    }

    fn refresh(&self, index: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure("refresh")?;
        state.resolve(index).map(|_| ())
    }

    fn bulk_index(&self, index: &str, documents: &[(String, Value)]) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure("bulk_index")?;
        let memory_index = state.write_index(index)?;
        for (id, source) in documents {
            memory_index.put(id, source.clone());
        }
        Ok(())
    }

    fn delete_document(&self, index: &str, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure("delete_document")?;
        let memory_index = state.write_index(index)?;
        memory_index.documents.remove(id);
        Ok(())
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let mut state = self.state.lock();
        state.take_failure("search")?;
        state.requests.push(request.clone());

        let from = request.from.unwrap_or(0);
        let size = request.size.unwrap_or(DEFAULT_PAGE_SIZE);
        if request.scroll.is_none() && from + size > self.max_result_window {
            return Err(SearchGateError::backend(format!(
                "Result window is too large, from + size must be less than or equal to: [{}] but was [{}]",
                self.max_result_window,
                from + size
            )));
        }

        let hits = state.matching_hits(&request.index, &request.query, request.sort.as_ref())?;
        let total = hits.len() as u64;

        if request.scroll.is_some() {
            state.next_cursor += 1;
            let scroll_id = format!("scroll-{}", state.next_cursor);
            let mut cursor = Cursor {
                hits,
                position: from,
                size,
            };
            let page = cursor.next_page();
            state.cursors.insert(scroll_id.clone(), cursor);
            return Ok(SearchResponse {
                hits: page,
                total,
                scroll_id: Some(scroll_id),
            });
        }

        let page = hits.into_iter().skip(from).take(size).collect();
        Ok(SearchResponse {
            hits: page,
            total,
            scroll_id: None,
        })
    }

    fn scroll(&self, scroll_id: &str, _keep_alive: &str) -> Result<SearchResponse> {
        let mut state = self.state.lock();
        state.take_failure("scroll")?;
        state.scroll_calls += 1;
        let cursor = state.cursors.get_mut(scroll_id).ok_or_else(|| {
            SearchGateError::backend(format!(
                "search_context_missing_exception: No search context found for id [{scroll_id}]"
            ))
        })?;
        let total = cursor.hits.len() as u64;
        Ok(SearchResponse {
            hits: cursor.next_page(),
            total,
            scroll_id: Some(scroll_id.to_string()),
        })
    }

    fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure("clear_scroll")?;
        state.cursors.remove(scroll_id);
        Ok(())
    }

    fn count(&self, index: &str, query: &Value) -> Result<u64> {
        let mut state = self.state.lock();
        state.take_failure("count")?;
        Ok(state.matching_hits(index, query, None)?.len() as u64)
    }

    fn get_alias(&self, alias: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.take_failure("get_alias")?;
        Ok(state.aliases.get(alias).cloned().unwrap_or_default())
    }

    fn update_aliases(
        &self,
        alias: &str,
        remove: &[String],
        add: &str,
        remove_indices: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure("update_aliases")?;
        if !state.indices.contains_key(add) || remove_indices.iter().any(|name| name == add) {
            return Err(index_not_found(add));
        }
        if let Some(missing) = remove_indices.iter().find(|name| !state.indices.contains_key(*name)) {
            return Err(index_not_found(missing));
        }
        if state.indices.contains_key(alias) && !remove_indices.iter().any(|name| name == alias) {
            return Err(SearchGateError::backend(format!(
                "invalid_alias_name_exception: an index exists with the same name as the alias [{alias}]"
            )));
        }

        // Every action is validated before any is applied.
        for name in remove_indices {
            state.indices.remove(name);
            debug!("Deleted index {name}");
            for targets in state.aliases.values_mut() {
                targets.retain(|t| t != name);
            }
        }
        state.aliases.retain(|_, targets| !targets.is_empty());

        let targets = state.aliases.entry(alias.to_string()).or_default();
        targets.retain(|t| !remove.contains(t));
        if !targets.iter().any(|t| t == add) {
            targets.push(add.to_string());
        }
        debug!("Alias {alias} now points to {targets:?}");
        Ok(())
    }
}
