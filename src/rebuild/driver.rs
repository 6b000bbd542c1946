//! Rebuild driver.
//!
//! Walks every index of a backend, registers the mappings of the types it
//! holds and streams their objects through the rebuilder in chunks read from
//! a snapshot. Failures carry the backend, index and step they happened in.

use std::sync::Arc;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::backend::SearchBackend;
use crate::error::{Result, SearchGateError};
use crate::object::{ObjectStore, SnapshotScope};
use crate::rebuild::IndexRebuilder;

/// Objects written per bulk request.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildOptions {
    pub chunk_size: usize,
    /// Recreate the indices and their mappings without writing documents.
    pub schema_only: bool,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        RebuildOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            schema_only: false,
        }
    }
}

impl RebuildOptions {
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn schema_only(mut self, schema_only: bool) -> Self {
        self.schema_only = schema_only;
        self
    }
}

/// Indexed types sharing one physical index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexGroup {
    pub index_name: String,
    pub type_ids: Vec<String>,
}

/// Group the indexed types of a backend by the index holding them, in
/// registry order.
pub fn group_types_by_index(backend: &dyn SearchBackend) -> Result<Vec<IndexGroup>> {
    let mut groups: Vec<IndexGroup> = Vec::new();
    for info in backend.registry().indexed_types() {
        let index = backend.get_index_for_model(info.type_id())?;
        match groups.iter_mut().find(|g| g.index_name == index.name()) {
            Some(group) => group.type_ids.push(info.type_id().to_string()),
            None => groups.push(IndexGroup {
                index_name: index.name().to_string(),
                type_ids: vec![info.type_id().to_string()],
            }),
        }
    }
    Ok(groups)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeReport {
    pub type_id: String,
    /// Objects written; zero for schema-only rebuilds.
    pub objects: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub index: String,
    pub types: Vec<TypeReport>,
}

impl IndexReport {
    pub fn objects(&self) -> usize {
        self.types.iter().map(|t| t.objects).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendReport {
    /// The backend has no physical indices to rebuild.
    NotRequired { backend: String },
    Rebuilt {
        backend: String,
        indexes: Vec<IndexReport>,
    },
}

impl BackendReport {
    pub fn backend(&self) -> &str {
        match self {
            BackendReport::NotRequired { backend } | BackendReport::Rebuilt { backend, .. } => {
                backend
            }
        }
    }

    pub fn objects(&self) -> usize {
        match self {
            BackendReport::NotRequired { .. } => 0,
            BackendReport::Rebuilt { indexes, .. } => indexes.iter().map(|i| i.objects()).sum(),
        }
    }
}

/// Result of rebuilding one backend within a multi-backend run.
#[derive(Debug)]
pub struct BackendOutcome {
    pub backend: String,
    pub result: Result<BackendReport>,
}

impl BackendOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Rebuild every index of one backend.
pub fn rebuild_backend(
    backend: &dyn SearchBackend,
    store: &dyn ObjectStore,
    options: &RebuildOptions,
) -> Result<BackendReport> {
    if options.chunk_size == 0 {
        return Err(SearchGateError::config("chunk size must be at least 1"));
    }

    let name = backend.name();
    let groups = group_types_by_index(backend)?;
    let mut indexes = Vec::with_capacity(groups.len());

    for group in groups {
        let index = group.index_name.as_str();
        let wrap = |stage: &str| {
            let stage = stage.to_string();
            move |e: SearchGateError| SearchGateError::rebuild(name, index, stage, e)
        };

        let Some(mut rebuilder) = backend.rebuilder_for(index).map_err(wrap("preparation"))? else {
            info!("Backend {name} does not require a rebuild");
            return Ok(BackendReport::NotRequired {
                backend: name.to_string(),
            });
        };

        info!("Rebuilding index {index} on backend {name}");
        rebuilder.start().map_err(wrap("start"))?;

        let mut types = Vec::with_capacity(group.type_ids.len());
        for type_id in &group.type_ids {
            rebuilder
                .add_model(type_id)
                .map_err(wrap(&format!("mapping registration of {type_id}")))?;
            let objects = if options.schema_only {
                0
            } else {
                populate(rebuilder.as_mut(), store, type_id, options.chunk_size)
                    .map_err(|(stage, e)| SearchGateError::rebuild(name, index, stage, e))?
            };
            info!("{index}: {type_id} ({objects} objects)");
            types.push(TypeReport {
                type_id: type_id.clone(),
                objects,
            });
        }

        rebuilder.finish().map_err(wrap("swap"))?;
        indexes.push(IndexReport {
            index: group.index_name.clone(),
            types,
        });
    }

    Ok(BackendReport::Rebuilt {
        backend: name.to_string(),
        indexes,
    })
}

/// Write the objects whose concrete type is `type_id`, one chunk per request.
/// Errors carry the stage that failed.
fn populate(
    rebuilder: &mut dyn IndexRebuilder,
    store: &dyn ObjectStore,
    type_id: &str,
    chunk_size: usize,
) -> std::result::Result<usize, (String, SearchGateError)> {
    let snapshot = store
        .snapshot(type_id, SnapshotScope::Exact)
        .map_err(|e| (format!("snapshot of {type_id}"), e))?;
    let total = snapshot.count();

    let mut offset = 0;
    while offset < total {
        let chunk = snapshot.slice(offset, chunk_size);
        if chunk.is_empty() {
            break;
        }
        let end = offset + chunk.len();
        debug!("Writing {type_id} objects {offset}..{end} of {total}");
        rebuilder
            .add_items(type_id, &chunk)
            .map_err(|e| (format!("bulk load of {type_id} objects {offset}..{end}"), e))?;
        offset = end;
    }
    Ok(offset)
}

/// Rebuild several backends, continuing past failures.
pub fn rebuild_all(
    backends: &[Arc<dyn SearchBackend>],
    store: &dyn ObjectStore,
    options: &RebuildOptions,
) -> Vec<BackendOutcome> {
    backends
        .iter()
        .map(|backend| {
            let result = rebuild_backend(backend.as_ref(), store, options);
            if let Err(e) = &result {
                error!("Rebuild of backend {} failed: {e}", backend.name());
            }
            BackendOutcome {
                backend: backend.name().to_string(),
                result,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        BackendConfig, BackendKind, DatabaseBackend, DatabaseCapabilities, EngineBackend,
    };
    use crate::engine::MemoryEngine;
    use crate::object::{MemoryStore, Record};
    use crate::query::{SearchOptions, SearchQuery, SearchScope};
    use crate::schema::{AttributeType, FieldSpec, IndexedType, TypeRegistry};

    fn setup() -> (Arc<TypeRegistry>, Arc<MemoryStore>) {
        let book = IndexedType::new("searchtests", "Book")
            .attribute("title", AttributeType::Text)
            .fields([FieldSpec::search("title")]);
        let novel = IndexedType::new("searchtests", "Novel")
            .parent("searchtests.Book")
            .attribute("setting", AttributeType::Text)
            .fields([FieldSpec::search("setting")]);
        let author = IndexedType::new("searchtests", "Author")
            .attribute("name", AttributeType::Text)
            .fields([FieldSpec::autocomplete("name")]);
        let registry = Arc::new(TypeRegistry::new(vec![book, novel, author]).unwrap());

        let store = Arc::new(MemoryStore::new(registry.clone()));
        for pk in 1..=5 {
            store
                .insert(
                    Record::new("searchtests.Book", pk)
                        .with_value("title", format!("Book {pk}"))
                        .into_ref(),
                )
                .unwrap();
        }
        store
            .insert(
                Record::new("searchtests.Novel", 6)
                    .with_value("title", "A Game of Thrones")
                    .with_value("setting", "Westeros")
                    .into_ref(),
            )
            .unwrap();
        (registry, store)
    }

    fn engine_backend(
        name: &str,
        registry: &Arc<TypeRegistry>,
        store: &Arc<MemoryStore>,
        engine: &Arc<MemoryEngine>,
    ) -> Arc<dyn SearchBackend> {
        Arc::new(
            EngineBackend::new(
                name,
                BackendConfig::new(BackendKind::Elasticsearch7),
                registry.clone(),
                store.clone(),
                engine.clone(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_groups_follow_inheritance_roots() {
        let (registry, store) = setup();
        let engine = Arc::new(MemoryEngine::new());
        let backend = engine_backend("default", &registry, &store, &engine);
        let groups = group_types_by_index(backend.as_ref()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].index_name, "searchtests_book");
        assert_eq!(
            groups[0].type_ids,
            vec!["searchtests.Book".to_string(), "searchtests.Novel".to_string()]
        );
        assert_eq!(groups[1].index_name, "searchtests_author");
    }

    #[test]
    fn test_chunked_rebuild_reports_counts() {
        let (registry, store) = setup();
        let engine = Arc::new(MemoryEngine::new());
        let backend = engine_backend("default", &registry, &store, &engine);

        let report =
            rebuild_backend(backend.as_ref(), store.as_ref(), &RebuildOptions::default().chunk_size(2))
                .unwrap();
        let BackendReport::Rebuilt { indexes, .. } = &report else {
            panic!("expected a rebuild");
        };
        assert_eq!(indexes[0].types[0].objects, 5);
        assert_eq!(indexes[0].types[1].objects, 1);
        assert_eq!(report.objects(), 6);
        assert_eq!(engine.documents("searchtests_book").unwrap().len(), 6);

        let results = backend
            .search(
                &SearchScope::new("searchtests.Novel"),
                SearchQuery::plain("Westeros"),
                SearchOptions::default(),
            )
            .unwrap();
        assert_eq!(results.results().unwrap()[0].pk(), "6");
    }

    #[test]
    fn test_schema_only_rebuild_writes_no_documents() {
        let (registry, store) = setup();
        let engine = Arc::new(MemoryEngine::new());
        let backend = engine_backend("default", &registry, &store, &engine);

        let report = rebuild_backend(
            backend.as_ref(),
            store.as_ref(),
            &RebuildOptions::default().schema_only(true),
        )
        .unwrap();
        assert_eq!(report.objects(), 0);

        let results = backend
            .search(
                &SearchScope::new("searchtests.Book"),
                SearchQuery::MatchAll,
                SearchOptions::default(),
            )
            .unwrap();
        assert_eq!(results.len().unwrap(), 0);
    }

    #[test]
    fn test_failures_carry_context_and_do_not_stop_other_backends() {
        let (registry, store) = setup();
        let failing = Arc::new(MemoryEngine::new());
        failing.inject_failure("bulk_index", true);
        let healthy = Arc::new(MemoryEngine::new());

        let backends = vec![
            engine_backend("failing", &registry, &store, &failing),
            Arc::new(DatabaseBackend::new(
                "db",
                BackendConfig::new(BackendKind::Database),
                registry.clone(),
                store.clone(),
                DatabaseCapabilities::default(),
            )) as Arc<dyn SearchBackend>,
            engine_backend("healthy", &registry, &store, &healthy),
        ];
        let outcomes = rebuild_all(&backends, store.as_ref(), &RebuildOptions::default());

        let err = outcomes[0].result.as_ref().unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("searchtests_book"));
        assert!(err.to_string().contains("bulk load of searchtests.Book"));

        assert_eq!(
            outcomes[1].result.as_ref().unwrap(),
            &BackendReport::NotRequired {
                backend: "db".to_string()
            }
        );
        assert!(outcomes[2].is_success());
        assert_eq!(outcomes[2].result.as_ref().unwrap().objects(), 6);
    }
}
