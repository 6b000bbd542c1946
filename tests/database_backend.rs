//! The in-process database backend over the shared fixture.

mod common;

use std::sync::Arc;

use common::*;
use searchgate::backend::{BackendConfig, BackendKind, DatabaseBackend, DatabaseCapabilities, SearchBackend};
use searchgate::error::{Result, SearchGateError};
use searchgate::object::{ObjectStore, Record};
use searchgate::query::{Filter, Operator, SearchOptions, SearchQuery, SearchScope};
use searchgate::rebuild::{BackendReport, RebuildOptions, rebuild_backend};

fn database(full_text: bool) -> (Arc<searchgate::object::MemoryStore>, DatabaseBackend) {
    let registry = registry();
    let store = store(registry.clone());
    let backend = DatabaseBackend::new(
        "default",
        BackendConfig::new(BackendKind::Database),
        registry,
        store.clone(),
        DatabaseCapabilities::full_text(full_text),
    );
    (store, backend)
}

fn books() -> SearchScope {
    SearchScope::new(BOOK)
}

#[test]
fn test_substring_matching_without_full_text() -> Result<()> {
    let (_, backend) = database(false);
    let results = backend.search(&books(), "Java".into(), SearchOptions::default())?;
    assert_eq!(
        titles(&results),
        sorted(&["JavaScript: The Definitive Guide", "JavaScript: The good parts"])
    );
    Ok(())
}

#[test]
fn test_token_matching_with_full_text() -> Result<()> {
    let (_, backend) = database(true);
    assert_eq!(backend.search(&books(), "Java".into(), SearchOptions::default())?.len()?, 0);

    let results = backend.search(&books(), "JavaScript".into(), SearchOptions::default())?;
    assert_eq!(results.count()?, 2);

    let results = backend.search(
        &books(),
        "JavaScript Python".into(),
        SearchOptions::default().operator(Operator::And),
    )?;
    assert_eq!(results.count()?, 0);

    let results = backend.search(&books(), "JavaScript Python".into(), SearchOptions::default())?;
    assert_eq!(results.count()?, 3);
    Ok(())
}

#[test]
fn test_autocomplete_reaches_subtypes() -> Result<()> {
    let (_, backend) = database(true);
    let results = backend.autocomplete(&books(), "Java".into(), SearchOptions::default())?;
    assert_eq!(
        titles(&results),
        sorted(&["JavaScript: The Definitive Guide", "JavaScript: The good parts"])
    );

    let results = backend.search(&SearchScope::new(NOVEL), SearchQuery::MatchAll, SearchOptions::default())?;
    assert_eq!(results.count()?, 3);
    let results = backend.autocomplete(&SearchScope::new(NOVEL), "Wes".into(), SearchOptions::default())?;
    assert_eq!(results.count()?, 3);
    Ok(())
}

#[test]
fn test_phrase_matching() -> Result<()> {
    let (_, backend) = database(true);
    let results = backend.search(&books(), SearchQuery::phrase("the two towers"), SearchOptions::default())?;
    assert_eq!(titles(&results), vec!["The Two Towers".to_string()]);

    let results = backend.search(&books(), SearchQuery::phrase("towers two"), SearchOptions::default())?;
    assert!(results.is_empty()?);
    Ok(())
}

#[test]
fn test_relevance_follows_match_count() -> Result<()> {
    let (_, backend) = database(true);
    let hits = backend.search(&books(), "the".into(), SearchOptions::default())?.hits()?;
    assert!(hits.iter().all(|hit| hit.score.is_some()));
    assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));

    let hits = backend.search(&books(), SearchQuery::MatchAll, SearchOptions::default())?.hits()?;
    assert_eq!(hits.len(), 14);
    assert!(hits.iter().all(|hit| hit.score.is_none()));
    Ok(())
}

#[test]
fn test_filters_and_ordering() -> Result<()> {
    let (_, backend) = database(false);

    let scope = books()
        .filter(Filter::lookup("number_of_pages", "gte", 900))
        .order_by(["-number_of_pages"]);
    let results = backend.search(&scope, SearchQuery::MatchAll, SearchOptions::default().order_by_relevance(false))?;
    let ordered: Vec<String> = results.results()?.iter().map(title_of).collect();
    assert_eq!(
        ordered,
        vec!["Learning Python", "JavaScript: The Definitive Guide", "A Storm of Swords"]
    );

    let scope = books().filter(Filter::year("publication_date", "exact", 1954));
    let results = backend.search(&scope, SearchQuery::MatchAll, SearchOptions::default())?;
    assert_eq!(titles(&results), sorted(&["The Fellowship of the Ring", "The Two Towers"]));

    let scope = books()
        .filter(Filter::lookup("title", "startswith", "The"))
        .exclude(Filter::lookup("number_of_pages", "lt", 400));
    let results = backend.search(&scope, SearchQuery::MatchAll, SearchOptions::default())?;
    assert_eq!(
        titles(&results),
        sorted(&["The Fellowship of the Ring", "The Return of the King", "The Rust Programming Language"])
    );

    let scope = SearchScope::new(NOVEL).filter(Filter::exact("protagonist_id", 2));
    let results = backend.search(&scope, SearchQuery::MatchAll, SearchOptions::default())?;
    assert_eq!(titles(&results), vec!["A Clash of Kings".to_string()]);

    let results = backend.search(&books().none(), SearchQuery::MatchAll, SearchOptions::default())?;
    assert_eq!(results.count()?, 0);
    Ok(())
}

#[test]
fn test_same_errors_as_engine_backends() {
    let (_, backend) = database(false);

    let err = backend
        .search(&books().filter(Filter::exact("authors", 1)), SearchQuery::MatchAll, SearchOptions::default())
        .unwrap_err();
    assert!(matches!(err, SearchGateError::FilterField { .. }));

    let err = backend
        .search(&books(), "Hobbit".into(), SearchOptions::default().fields(["isbn"]))
        .unwrap_err();
    assert!(matches!(err, SearchGateError::SearchField { .. }));

    let err = backend
        .search(&books(), SearchQuery::fuzzy("Hobit"), SearchOptions::default())
        .unwrap_err();
    assert!(matches!(err, SearchGateError::UnsupportedQuery(_)));
}

#[test]
fn test_slices_of_evaluated_results() -> Result<()> {
    let (_, backend) = database(false);
    let scope = books().order_by(["number_of_pages"]);
    let results = backend.search(&scope, SearchQuery::MatchAll, SearchOptions::default().order_by_relevance(false))?;

    let window = results.slice(2..5);
    assert_eq!(window.count()?, 3);
    let ordered: Vec<String> = window.results()?.iter().map(title_of).collect();
    assert_eq!(ordered, vec!["The Hobbit", "The Two Towers", "The Silmarillion"]);
    assert_eq!(results.slice(20..).len()?, 0);
    Ok(())
}

#[test]
fn test_indexing_is_a_no_op() -> Result<()> {
    let (store, backend) = database(true);

    let report = rebuild_backend(&backend, store.as_ref(), &RebuildOptions::default())?;
    assert_eq!(
        report,
        BackendReport::NotRequired {
            backend: "default".to_string()
        }
    );

    let hobbit = store.resolve(BOOK, &["1".to_string()])?.remove("1").unwrap();
    backend.add(&hobbit)?;
    backend.delete(hobbit.as_ref())?;
    backend.refresh_indexes()?;

    // Searches read the store directly.
    let results = backend.search(&books(), "Hobbit".into(), SearchOptions::default())?;
    assert_eq!(results.count()?, 1);
    store.remove(BOOK, "1");
    let results = backend.search(&books(), "Hobbit".into(), SearchOptions::default())?;
    assert_eq!(results.count()?, 0);

    let unsaved = Record::new(BOOK, 500).with_value("title", "Unsaved").into_ref();
    backend.add(&unsaved)?;
    Ok(())
}
