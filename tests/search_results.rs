//! Windowing, paging and cursor handling of engine results.

use std::sync::Arc;

use serde_json::Value;

use searchgate::backend::{BackendConfig, BackendKind, EngineBackend, SearchBackend};
use searchgate::engine::{EngineClient, MemoryEngine, SearchRequest, SearchResponse};
use searchgate::error::Result;
use searchgate::object::{MemoryStore, Record, Searchable};
use searchgate::query::{SearchOptions, SearchQuery, SearchScope};
use searchgate::rebuild::{RebuildOptions, rebuild_backend};
use searchgate::results::SearchResults;
use searchgate::schema::{AttributeType, FieldSpec, IndexedType, TypeRegistry};

const ITEM: &str = "searchtests.Item";

fn setup(config: BackendConfig, total: i64) -> (Arc<MemoryEngine>, EngineBackend) {
    let (_, _, engine, backend) = setup_with_store(config, total);
    (engine, backend)
}

fn setup_with_store(
    config: BackendConfig,
    total: i64,
) -> (Arc<TypeRegistry>, Arc<MemoryStore>, Arc<MemoryEngine>, EngineBackend) {
    let item = IndexedType::new("searchtests", "Item")
        .attribute("name", AttributeType::Text)
        .attribute("position", AttributeType::Integer)
        .fields([FieldSpec::search("name"), FieldSpec::filter("position")]);
    let registry = Arc::new(TypeRegistry::new(vec![item]).unwrap());
    let store = Arc::new(MemoryStore::new(registry.clone()));
    for pk in 1..=total {
        let record = Record::new(ITEM, pk)
            .with_value("name", format!("item {pk}"))
            .with_value("position", pk);
        store.insert(record.into_ref()).unwrap();
    }

    let engine = Arc::new(MemoryEngine::new());
    let backend =
        EngineBackend::new("default", config, registry.clone(), store.clone(), engine.clone()).unwrap();
    rebuild_backend(&backend, store.as_ref(), &RebuildOptions::default()).unwrap();
    engine.clear_requests();
    (registry, store, engine, backend)
}

/// Answers searches with the first hit repeated in place of the second.
#[derive(Debug)]
struct RepeatingEngine {
    inner: Arc<MemoryEngine>,
}

impl EngineClient for RepeatingEngine {
    fn create_index(&self, name: &str, body: &Value) -> Result<()> {
        self.inner.create_index(name, body)
    }

    fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        self.inner.put_mapping(index, mapping)
    }

    fn delete_index(&self, name: &str) -> Result<()> {
        self.inner.delete_index(name)
    }

    fn index_exists(&self, name: &str) -> Result<bool> {
        self.inner.index_exists(name)
    }

    fn refresh(&self, index: &str) -> Result<()> {
        self.inner.refresh(index)
    }

    fn bulk_index(&self, index: &str, documents: &[(String, Value)]) -> Result<()> {
        self.inner.bulk_index(index, documents)
    }

    fn delete_document(&self, index: &str, id: &str) -> Result<()> {
        self.inner.delete_document(index, id)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let mut response = self.inner.search(request)?;
        if response.hits.len() > 1 {
            response.hits[1] = response.hits[0].clone();
        }
        Ok(response)
    }

    fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchResponse> {
        self.inner.scroll(scroll_id, keep_alive)
    }

    fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        self.inner.clear_scroll(scroll_id)
    }

    fn count(&self, index: &str, query: &Value) -> Result<u64> {
        self.inner.count(index, query)
    }

    fn get_alias(&self, alias: &str) -> Result<Vec<String>> {
        self.inner.get_alias(alias)
    }

    fn update_aliases(
        &self,
        alias: &str,
        remove: &[String],
        add: &str,
        remove_indices: &[String],
    ) -> Result<()> {
        self.inner.update_aliases(alias, remove, add, remove_indices)
    }
}

fn match_all(backend: &EngineBackend) -> SearchResults {
    backend
        .search(
            &SearchScope::new(ITEM).order_by(["position"]),
            SearchQuery::MatchAll,
            SearchOptions::default().order_by_relevance(false),
        )
        .unwrap()
}

fn pks(results: &SearchResults) -> Vec<String> {
    results.results().unwrap().iter().map(|o| o.pk()).collect()
}

#[test]
fn test_composed_slices_send_one_window() -> Result<()> {
    let (engine, backend) = setup(BackendConfig::new(BackendKind::Elasticsearch7), 164);
    let results = match_all(&backend);

    let composed = results.slice(10..).slice(..10);
    let direct = results.slice(10..20);
    assert!(engine.requests().is_empty());

    assert_eq!(pks(&composed), (11..=20).map(|i| i.to_string()).collect::<Vec<_>>());
    assert_eq!(pks(&direct), pks(&composed));

    let requests = engine.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.from, Some(10));
        assert_eq!(request.size, Some(10));
        assert!(request.scroll.is_none());
    }
    assert_eq!(requests[0], requests[1]);
    Ok(())
}

#[test]
fn test_offset_beyond_first_page_scrolls() -> Result<()> {
    let (engine, backend) = setup(BackendConfig::new(BackendKind::Elasticsearch7), 164);
    let tail = match_all(&backend).slice(110..);

    assert_eq!(tail.len()?, 54);
    assert_eq!(tail.get(0)?.map(|o| o.pk()), Some("111".to_string()));

    let requests = engine.requests();
    assert_eq!(requests.len(), 1, "no separate request for the skipped first page");
    assert_eq!(requests[0].scroll.as_deref(), Some("2m"));
    assert_eq!(requests[0].from, None);
    assert_eq!(requests[0].size, Some(100));
    assert_eq!(engine.scroll_calls(), 2);
    assert_eq!(engine.open_scroll_count(), 0);
    Ok(())
}

#[test]
fn test_scroll_offset_capability() -> Result<()> {
    let config = BackendConfig::new(BackendKind::Opensearch2).scroll_supports_offset(true);
    let (engine, backend) = setup(config, 164);

    assert_eq!(match_all(&backend).slice(110..).len()?, 54);
    let requests = engine.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].from, Some(110));
    assert_eq!(engine.open_scroll_count(), 0);
    Ok(())
}

#[test]
fn test_window_within_page_size_is_one_request() -> Result<()> {
    let (engine, backend) = setup(BackendConfig::new(BackendKind::Elasticsearch7), 164);

    assert_eq!(match_all(&backend).slice(..100).len()?, 100);
    assert_eq!(match_all(&backend).slice(50..250).len()?, 114);

    let requests = engine.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].scroll.is_none());
    assert_eq!(requests[0].size, Some(100));
    assert!(requests[1].scroll.is_some());
    assert_eq!(engine.open_scroll_count(), 0);
    Ok(())
}

#[test]
fn test_unbounded_results_are_not_truncated() -> Result<()> {
    let (engine, backend) = setup(BackendConfig::new(BackendKind::Elasticsearch8), 250);
    let all = pks(&match_all(&backend));
    assert_eq!(all.len(), 250);
    assert_eq!(all.first().map(String::as_str), Some("1"));
    assert_eq!(all.last().map(String::as_str), Some("250"));
    assert_eq!(engine.open_scroll_count(), 0);
    Ok(())
}

#[test]
fn test_engine_order_is_preserved() -> Result<()> {
    let (_, backend) = setup(BackendConfig::new(BackendKind::Elasticsearch7), 30);
    let results = backend.search(
        &SearchScope::new(ITEM).order_by(["-position"]),
        SearchQuery::MatchAll,
        SearchOptions::default().order_by_relevance(false),
    )?;
    let pks = pks(&results.slice(..5));
    assert_eq!(pks, vec!["30", "29", "28", "27", "26"]);
    Ok(())
}

#[test]
fn test_count_uses_the_engine_count() -> Result<()> {
    let (engine, backend) = setup(BackendConfig::new(BackendKind::Elasticsearch7), 164);
    let results = match_all(&backend);

    assert_eq!(results.count()?, 164);
    assert_eq!(results.slice(110..).count()?, 54);
    assert_eq!(results.slice(10..20).count()?, 10);
    assert!(engine.requests().is_empty());
    Ok(())
}

#[test]
fn test_cursor_released_when_paging_fails() {
    let (engine, backend) = setup(BackendConfig::new(BackendKind::Elasticsearch7), 164);
    engine.inject_failure("scroll", true);

    let err = match_all(&backend).slice(110..).len().unwrap_err();
    assert!(err.is_transient());
    assert_eq!(engine.open_scroll_count(), 0);
}

#[test]
fn test_stale_hits_are_skipped() -> Result<()> {
    let item = IndexedType::new("searchtests", "Item")
        .attribute("name", AttributeType::Text)
        .fields([FieldSpec::search("name")]);
    let registry = Arc::new(TypeRegistry::new(vec![item]).unwrap());
    let store = Arc::new(MemoryStore::new(registry.clone()));
    let engine = Arc::new(MemoryEngine::new());
    let backend = EngineBackend::new(
        "default",
        BackendConfig::new(BackendKind::Elasticsearch7),
        registry,
        store.clone(),
        engine.clone(),
    )?;

    let index = backend.get_index_for_model(ITEM)?;
    index.reset()?;
    index.add_model(ITEM)?;
    for pk in 1..=3 {
        let record = Record::new(ITEM, pk).with_value("name", "spare part").into_ref();
        store.insert(record.clone())?;
        backend.add(&record)?;
    }
    store.remove(ITEM, "2");

    let results = backend.search(&SearchScope::new(ITEM), "spare".into(), SearchOptions::default())?;
    let mut found = pks(&results);
    found.sort();
    assert_eq!(found, vec!["1", "3"]);
    assert_eq!(results.count()?, 2);
    Ok(())
}

#[test]
fn test_stale_hits_do_not_widen_the_window() -> Result<()> {
    let (_, store, engine, backend) = setup_with_store(BackendConfig::new(BackendKind::Elasticsearch7), 164);
    assert!(store.remove(ITEM, "5"));
    let results = match_all(&backend);

    let page = pks(&results.slice(0..10));
    assert_eq!(page.len(), 9);
    assert_eq!(page.last().map(String::as_str), Some("10"));

    // Larger than one page, so the cursor path serves it.
    let window = pks(&results.slice(0..150));
    assert_eq!(window.len(), 149);
    assert_eq!(window.last().map(String::as_str), Some("150"));
    assert!(!window.contains(&"151".to_string()));
    assert!(engine.requests().iter().any(|request| request.scroll.is_some()));
    assert_eq!(engine.open_scroll_count(), 0);

    let tail = pks(&results.slice(140..150));
    assert_eq!(tail, (141..=150).map(|i| i.to_string()).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_repeated_hits_yield_repeated_results() -> Result<()> {
    let (registry, store, engine, _) = setup_with_store(BackendConfig::new(BackendKind::Elasticsearch7), 10);
    let repeating = Arc::new(RepeatingEngine { inner: engine });
    let backend = EngineBackend::new(
        "default",
        BackendConfig::new(BackendKind::Elasticsearch7),
        registry,
        store,
        repeating,
    )?;

    let results = match_all(&backend).slice(..4);
    assert_eq!(pks(&results), vec!["1", "1", "3", "4"]);
    let hits = results.hits()?;
    assert_eq!(hits.len(), 4);
    assert_eq!(hits[0].object.pk(), hits[1].object.pk());
    Ok(())
}
