//! Full rebuilds of the fixture through the rebuild driver.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::*;
use searchgate::backend::{BackendConfig, BackendFactory, BackendKind, SearchBackend, SearchSettings};
use searchgate::engine::{EngineClient, MemoryEngine};
use searchgate::error::{Result, SearchGateError};
use searchgate::object::ObjectStore;
use searchgate::query::{SearchOptions, SearchQuery, SearchScope};
use searchgate::rebuild::{
    BackendReport, RebuildOptions, RebuildState, group_types_by_index, rebuild_all,
    rebuild_backend,
};

fn match_all_count(backend: &dyn SearchBackend, type_id: &str) -> usize {
    backend
        .search(&SearchScope::new(type_id), SearchQuery::MatchAll, SearchOptions::default())
        .unwrap()
        .len()
        .unwrap()
}

#[test]
fn test_groups_share_the_root_index() -> Result<()> {
    let fixture = elasticsearch_fixture();
    let groups = group_types_by_index(&fixture.backend)?;
    let by_index: HashMap<&str, &[String]> = groups
        .iter()
        .map(|g| (g.index_name.as_str(), g.type_ids.as_slice()))
        .collect();

    assert_eq!(groups.len(), 3);
    assert_eq!(by_index["searchtests_author"], [AUTHOR.to_string()]);
    assert_eq!(by_index["searchtests_character"], [CHARACTER.to_string()]);
    assert_eq!(
        by_index["searchtests_book"],
        [BOOK.to_string(), NOVEL.to_string()]
    );
    Ok(())
}

#[test]
fn test_rebuild_twice_leaves_one_live_index_per_group() -> Result<()> {
    let fixture = elasticsearch_fixture();
    let engine = &fixture.engine;
    let first = engine.index_names();
    assert_eq!(first.len(), 3);

    let report = rebuild_backend(&fixture.backend, fixture.store.as_ref(), &RebuildOptions::default())?;
    let second = engine.index_names();
    assert_eq!(second.len(), 3);
    assert!(second.iter().all(|name| !first.contains(name)));

    for alias in ["searchtests_author", "searchtests_book", "searchtests_character"] {
        let targets = engine.get_alias(alias)?;
        assert_eq!(targets.len(), 1);
        assert!(second.contains(&targets[0]));
    }

    let BackendReport::Rebuilt { indexes, .. } = &report else {
        panic!("expected a rebuilt report, got {report:?}");
    };
    let book_index = indexes
        .iter()
        .find(|index| index.index == "searchtests_book")
        .unwrap();
    let counts: Vec<(&str, usize)> = book_index
        .types
        .iter()
        .map(|t| (t.type_id.as_str(), t.objects))
        .collect();
    assert_eq!(counts, vec![(BOOK, 11), (NOVEL, 3)]);
    assert_eq!(report.objects(), 9 + 3 + 14);

    assert_eq!(match_all_count(&fixture.backend, BOOK), 14);
    assert_eq!(match_all_count(&fixture.backend, AUTHOR), 9);
    Ok(())
}

#[test]
fn test_readers_see_the_old_index_until_the_swap() -> Result<()> {
    let fixture = elasticsearch_fixture();
    let backend = &fixture.backend;

    let mut rebuilder = backend.rebuilder_for("searchtests_book")?.unwrap();
    rebuilder.start()?;
    rebuilder.add_model(BOOK)?;
    let hobbit = fixture.store.resolve(BOOK, &["1".to_string()])?.remove("1").unwrap();
    rebuilder.add_items(BOOK, &[hobbit])?;
    assert_eq!(rebuilder.state(), RebuildState::Populating);

    assert_eq!(match_all_count(backend, BOOK), 14);

    rebuilder.finish()?;
    assert_eq!(match_all_count(backend, BOOK), 1);
    Ok(())
}

#[test]
fn test_abandoned_rebuild_does_not_block_the_next_one() -> Result<()> {
    let fixture = elasticsearch_fixture();
    let backend = &fixture.backend;

    {
        let mut rebuilder = backend.rebuilder_for("searchtests_book")?.unwrap();
        rebuilder.start()?;
        rebuilder.add_model(BOOK)?;
    }
    assert_eq!(fixture.engine.index_names().len(), 4);
    assert_eq!(match_all_count(backend, BOOK), 14);

    rebuild_backend(backend, fixture.store.as_ref(), &RebuildOptions::default().chunk_size(4))?;
    assert_eq!(fixture.engine.get_alias("searchtests_book")?.len(), 1);
    assert_eq!(match_all_count(backend, BOOK), 14);
    Ok(())
}

#[test]
fn test_shared_index_mapping_holds_subtype_columns() -> Result<()> {
    let fixture = elasticsearch_fixture();
    let live = fixture.engine.get_alias("searchtests_book")?;
    let mapping = fixture.engine.mapping(&live[0]).unwrap();
    let properties = &mapping["properties"];

    assert_eq!(properties["title"]["type"], "text");
    assert_eq!(properties["searchtests_novel__setting"]["type"], "text");
    assert_eq!(properties["searchtests_novel__characters"]["type"], "nested");
    assert_eq!(properties["searchtests_novel__protagonist_id_filter"]["type"], "integer");
    assert!(properties["_all_text_boost_2_0"].is_object());
    Ok(())
}

#[test]
fn test_non_atomic_rebuild_resets_in_place() -> Result<()> {
    let fixture = engine_fixture(
        BackendConfig::new(BackendKind::Elasticsearch7)
            .index_prefix("plain_")
            .atomic_rebuild(false),
    );
    let mut names = fixture.engine.index_names();
    names.sort();
    assert_eq!(
        names,
        vec!["plain_searchtests_author", "plain_searchtests_book", "plain_searchtests_character"]
    );
    assert!(fixture.engine.get_alias("plain_searchtests_book")?.is_empty());
    assert_eq!(match_all_count(&fixture.backend, BOOK), 14);
    Ok(())
}

#[test]
fn test_multi_backend_rebuild_continues_past_failures() {
    let settings = SearchSettings::from_json(
        r#"{
            "backends": {
                "default": {"backend": "database"},
                "broken": {"backend": "elasticsearch8", "index_prefix": "broken_"},
                "search": {"backend": "opensearch2", "urls": ["https://search.example.com:9200"]}
            }
        }"#,
    )
    .unwrap();

    let registry = registry();
    let store = store(registry.clone());
    let engines: Arc<parking_lot::Mutex<HashMap<String, Arc<MemoryEngine>>>> = Default::default();
    let created = engines.clone();
    let factory = BackendFactory::new(settings, registry, store.clone()).client_factory(
        move |name, _config| {
            let engine = Arc::new(MemoryEngine::new());
            if name == "broken" {
                engine.inject_failure("bulk_index", true);
            }
            created.lock().insert(name.to_string(), engine.clone());
            Ok(engine as Arc<dyn EngineClient>)
        },
    );

    let backends = factory.create_all(false).unwrap();
    let outcomes = rebuild_all(&backends, store.as_ref(), &RebuildOptions::default());
    let by_name: HashMap<&str, _> = outcomes.iter().map(|o| (o.backend.as_str(), o)).collect();

    assert!(matches!(
        by_name["default"].result,
        Ok(BackendReport::NotRequired { .. })
    ));

    let err = by_name["broken"].result.as_ref().unwrap_err();
    let SearchGateError::Rebuild { backend, index, stage, source } = err else {
        panic!("expected a rebuild error, got {err:?}");
    };
    assert_eq!(backend, "broken");
    assert_eq!(index, "broken_searchtests_author");
    assert!(stage.starts_with("bulk load of searchtests.Author objects 0.."), "{stage}");
    assert!(source.is_transient());

    let report = by_name["search"].result.as_ref().unwrap();
    assert_eq!(report.objects(), 26);
    let engine = engines.lock()["search"].clone();
    assert_eq!(engine.get_alias("searchtests_book").unwrap().len(), 1);
}
