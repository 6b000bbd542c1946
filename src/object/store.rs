//! Object store collaborator: snapshots for indexing, batched pk resolution.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::BufRead;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{Result, SearchGateError};
use crate::object::record::{Attribute, ObjectRef, Record};
use crate::object::value::FieldValue;
use crate::schema::{AttributeType, TypeRegistry};

/// Which objects a snapshot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotScope {
    /// Only objects whose concrete type is the requested type.
    Exact,
    /// Objects of the requested type and of every subtype.
    WithDescendants,
}

/// A stable, ordered view over a collection of objects.
///
/// The count and order never change for the lifetime of the snapshot, however
/// the underlying store is mutated meanwhile.
pub trait ObjectSnapshot: Send {
    fn count(&self) -> usize;

    fn slice(&self, offset: usize, limit: usize) -> Vec<ObjectRef>;
}

/// Access to the application's objects.
pub trait ObjectStore: Send + Sync {
    /// Take an ordered snapshot of the objects of a type.
    fn snapshot(&self, type_id: &str, scope: SnapshotScope) -> Result<Box<dyn ObjectSnapshot>>;

    /// Resolve primary keys to live objects of `type_id` (or a subtype) in one lookup.
    ///
    /// Keys without a live object are absent from the returned map.
    fn resolve(&self, type_id: &str, pks: &[String]) -> Result<HashMap<String, ObjectRef>>;
}

/// Snapshot backed by a materialized vector.
#[derive(Debug, Default)]
pub struct VecSnapshot {
    items: Vec<ObjectRef>,
}

impl VecSnapshot {
    pub fn new(items: Vec<ObjectRef>) -> Self {
        VecSnapshot { items }
    }
}

impl ObjectSnapshot for VecSnapshot {
    fn count(&self) -> usize {
        self.items.len()
    }

    fn slice(&self, offset: usize, limit: usize) -> Vec<ObjectRef> {
        self.items.iter().skip(offset).take(limit).cloned().collect()
    }
}

/// Primary key ordering: numeric keys first, in numeric order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PkKey {
    Numeric(i64),
    Text(String),
}

impl PkKey {
    fn new(pk: &str) -> Self {
        pk.parse::<i64>()
            .map(PkKey::Numeric)
            .unwrap_or_else(|_| PkKey::Text(pk.to_string()))
    }
}

/// In-memory object store keyed by concrete type and primary key.
///
/// Objects that share an inheritance root share a primary key space, so
/// inserting a `Novel` with pk 4 replaces a `Book` with pk 4.
#[derive(Debug)]
pub struct MemoryStore {
    registry: Arc<TypeRegistry>,
    objects: RwLock<BTreeMap<String, BTreeMap<PkKey, ObjectRef>>>,
}

impl MemoryStore {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        MemoryStore {
            registry,
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Insert or replace an object.
    pub fn insert(&self, object: ObjectRef) -> Result<()> {
        let info = self.registry.get(object.type_id())?;
        let root = info.root().to_string();
        let key = PkKey::new(&object.pk());

        let mut objects = self.objects.write();
        for (type_id, by_pk) in objects.iter_mut() {
            if self.registry.root_of(type_id) == Some(root.as_str()) {
                by_pk.remove(&key);
            }
        }
        objects
            .entry(object.type_id().to_string())
            .or_default()
            .insert(key, object);
        Ok(())
    }

    pub fn insert_all<I: IntoIterator<Item = ObjectRef>>(&self, objects: I) -> Result<usize> {
        let mut count = 0;
        for object in objects {
            self.insert(object)?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove an object; returns whether it existed.
    pub fn remove(&self, type_id: &str, pk: &str) -> bool {
        let key = PkKey::new(pk);
        self.objects
            .write()
            .get_mut(type_id)
            .map(|by_pk| by_pk.remove(&key).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.read().values().map(|by_pk| by_pk.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load objects from JSON lines, one object per line.
    ///
    /// Each line carries `"type"` and `"pk"` plus attribute values keyed by
    /// attribute name. Relation attributes hold the primary key (or list of
    /// primary keys) of objects defined elsewhere in the same input. A relation
    /// that points back at an object still being built resolves to a pk-only
    /// stand-in for that object.
    pub fn load_json_lines<R: BufRead>(&self, reader: R) -> Result<usize> {
        let mut entries = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line)?;
            let Value::Object(map) = value else {
                return Err(SearchGateError::schema(format!(
                    "Line {} is not a JSON object",
                    line_num + 1
                )));
            };
            entries.push(RawEntry::parse(map, line_num + 1)?);
        }

        let mut loader = Loader {
            registry: &self.registry,
            entries: &entries,
            built: HashMap::new(),
            in_progress: HashSet::new(),
        };
        let mut objects = Vec::with_capacity(entries.len());
        for idx in 0..entries.len() {
            objects.push(loader.build(idx)?);
        }

        self.insert_all(objects)
    }
}

impl ObjectStore for MemoryStore {
    fn snapshot(&self, type_id: &str, scope: SnapshotScope) -> Result<Box<dyn ObjectSnapshot>> {
        self.registry.get(type_id)?;
        let objects = self.objects.read();

        let items: Vec<ObjectRef> = match scope {
            SnapshotScope::Exact => objects
                .get(type_id)
                .map(|by_pk| by_pk.values().cloned().collect())
                .unwrap_or_default(),
            SnapshotScope::WithDescendants => {
                let mut merged: BTreeMap<PkKey, ObjectRef> = BTreeMap::new();
                for (concrete, by_pk) in objects.iter() {
                    if self.registry.is_subtype(concrete, type_id) {
                        merged.extend(by_pk.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
                merged.into_values().collect()
            }
        };

        debug!("Snapshot of {type_id} ({scope:?}) holds {} objects", items.len());
        Ok(Box::new(VecSnapshot::new(items)))
    }

    fn resolve(&self, type_id: &str, pks: &[String]) -> Result<HashMap<String, ObjectRef>> {
        self.registry.get(type_id)?;
        let objects = self.objects.read();

        let mut resolved = HashMap::with_capacity(pks.len());
        for (concrete, by_pk) in objects.iter() {
            if !self.registry.is_subtype(concrete, type_id) {
                continue;
            }
            for pk in pks {
                if let Some(object) = by_pk.get(&PkKey::new(pk)) {
                    resolved.insert(pk.clone(), object.clone());
                }
            }
        }
        Ok(resolved)
    }
}

struct RawEntry {
    type_id: String,
    pk: String,
    values: Map<String, Value>,
    line: usize,
}

impl RawEntry {
    fn parse(mut map: Map<String, Value>, line: usize) -> Result<Self> {
        let type_id = match map.remove("type") {
            Some(Value::String(s)) => s,
            _ => {
                return Err(SearchGateError::schema(format!(
                    "Line {line} has no \"type\""
                )));
            }
        };
        let pk = match map.remove("pk") {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(SearchGateError::schema(format!("Line {line} has no \"pk\"")));
            }
        };
        Ok(RawEntry {
            type_id,
            pk,
            values: map,
            line,
        })
    }
}

struct Loader<'a> {
    registry: &'a TypeRegistry,
    entries: &'a [RawEntry],
    built: HashMap<usize, ObjectRef>,
    in_progress: HashSet<usize>,
}

impl Loader<'_> {
    fn build(&mut self, idx: usize) -> Result<ObjectRef> {
        if let Some(object) = self.built.get(&idx) {
            return Ok(object.clone());
        }
        let entries = self.entries;
        let registry = self.registry;
        let entry = &entries[idx];
        if !self.in_progress.insert(idx) {
            return Ok(Record::new(entry.type_id.clone(), entry.pk.clone()).into_ref());
        }

        let info = registry.get(&entry.type_id)?;
        let mut record = Record::new(entry.type_id.clone(), entry.pk.clone());

        for (name, raw) in &entry.values {
            let Some(attribute) = info.attribute(name) else {
                debug!(
                    "Line {}: ignoring unknown attribute \"{name}\" on {}",
                    entry.line, entry.type_id
                );
                continue;
            };

            let value = match &attribute.kind {
                AttributeType::Relation { target, many: true } => {
                    let pks = match raw {
                        Value::Array(items) => items.clone(),
                        Value::Null => Vec::new(),
                        other => vec![other.clone()],
                    };
                    let mut related = Vec::with_capacity(pks.len());
                    for pk in &pks {
                        let target_idx = self.find(target, pk, entry.line)?;
                        related.push(self.build(target_idx)?);
                    }
                    Attribute::Many(related)
                }
                AttributeType::Relation { target, many: false } => {
                    if raw.is_null() {
                        Attribute::One(None)
                    } else {
                        let target_idx = self.find(target, raw, entry.line)?;
                        Attribute::One(Some(self.build(target_idx)?))
                    }
                }
                kind => Attribute::Value(FieldValue::from_json(raw, kind)?),
            };
            record.set(name.clone(), value);
        }

        self.in_progress.remove(&idx);
        let object = record.into_ref();
        self.built.insert(idx, object.clone());
        Ok(object)
    }

    fn find(&self, target: &str, pk: &Value, line: usize) -> Result<usize> {
        let pk = match pk {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.entries
            .iter()
            .position(|e| e.pk == pk && self.registry.is_subtype(&e.type_id, target))
            .ok_or_else(|| {
                SearchGateError::schema(format!(
                    "Line {line}: related {target} with pk {pk} not found"
                ))
            })
    }
}
