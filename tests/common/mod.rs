//! Shared fixture: a small library of authors, books, novels and characters.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;

use searchgate::backend::{BackendConfig, BackendKind, EngineBackend, SearchBackend};
use searchgate::engine::MemoryEngine;
use searchgate::object::{MemoryStore, ObjectRef, Record, Searchable};
use searchgate::rebuild::{RebuildOptions, rebuild_backend};
use searchgate::results::SearchResults;
use searchgate::schema::{AttributeType, FieldSpec, IndexedType, SearchField, TypeRegistry};

pub const AUTHOR: &str = "searchtests.Author";
pub const CHARACTER: &str = "searchtests.Character";
pub const BOOK: &str = "searchtests.Book";
pub const NOVEL: &str = "searchtests.Novel";

pub fn registry() -> Arc<TypeRegistry> {
    let author = IndexedType::new("searchtests", "Author")
        .attribute("name", AttributeType::Text)
        .attribute("date_of_birth", AttributeType::Date)
        .fields([
            FieldSpec::autocomplete("name"),
            FieldSpec::filter("date_of_birth"),
        ]);
    let character = IndexedType::new("searchtests", "Character")
        .attribute("name", AttributeType::Text)
        .fields([FieldSpec::search("name")]);
    let book = IndexedType::new("searchtests", "Book")
        .attribute("title", AttributeType::Text)
        .attribute("publication_date", AttributeType::Date)
        .attribute("number_of_pages", AttributeType::Integer)
        .attribute("authors", AttributeType::relation(AUTHOR, true))
        .fields([
            FieldSpec::Search(SearchField::new("title").boost(2.0).partial_match(true)),
            FieldSpec::related(
                "authors",
                vec![FieldSpec::search("name"), FieldSpec::filter("date_of_birth")],
            ),
            FieldSpec::filter("title"),
            FieldSpec::filter("publication_date"),
            FieldSpec::filter("number_of_pages"),
        ]);
    let novel = IndexedType::new("searchtests", "Novel")
        .parent(BOOK)
        .attribute("setting", AttributeType::Text)
        .attribute("protagonist", AttributeType::relation(CHARACTER, false))
        .attribute("characters", AttributeType::relation(CHARACTER, true))
        .fields([
            FieldSpec::autocomplete("setting"),
            FieldSpec::related("characters", vec![FieldSpec::boosted("name", 0.25)]),
            FieldSpec::filter("protagonist"),
        ]);

    Arc::new(TypeRegistry::new(vec![author, character, book, novel]).unwrap())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn author(pk: i64, name: &str, born: NaiveDate) -> ObjectRef {
    Record::new(AUTHOR, pk)
        .with_value("name", name)
        .with_value("date_of_birth", born)
        .into_ref()
}

fn character(pk: i64, name: &str) -> ObjectRef {
    Record::new(CHARACTER, pk).with_value("name", name).into_ref()
}

pub fn book(pk: i64, title: &str, published: NaiveDate, pages: i64, authors: &[&ObjectRef]) -> Record {
    Record::new(BOOK, pk)
        .with_value("title", title)
        .with_value("publication_date", published)
        .with_value("number_of_pages", pages)
        .with_many("authors", authors.iter().map(|a| (*a).clone()).collect())
}

/// Authors, characters, 11 books and 3 novels.
pub fn store(registry: Arc<TypeRegistry>) -> Arc<MemoryStore> {
    let store = MemoryStore::new(registry);

    let tolkien = author(1, "J. R. R. Tolkien", date(1892, 1, 3));
    let martin = author(2, "George R. R. Martin", date(1948, 9, 20));
    let crockford = author(3, "Douglas Crockford", date(1955, 1, 1));
    let flanagan = author(4, "David Flanagan", date(1960, 1, 1));
    let lutz = author(5, "Mark Lutz", date(1960, 6, 1));
    let greenfeld = author(6, "Daniel Roy Greenfeld", date(1970, 1, 1));
    let roy = author(7, "Audrey Roy Greenfeld", date(1975, 1, 1));
    let klabnik = author(8, "Steve Klabnik", date(1986, 1, 1));
    let asimov = author(9, "Isaac Asimov", date(1920, 1, 2));

    let eddard = character(1, "Eddard Stark");
    let tyrion = character(2, "Tyrion Lannister");
    let jaime = character(3, "Jaime Lannister");

    let mut objects: Vec<ObjectRef> = vec![
        tolkien.clone(),
        martin.clone(),
        crockford.clone(),
        flanagan.clone(),
        lutz.clone(),
        greenfeld.clone(),
        roy.clone(),
        klabnik.clone(),
        asimov.clone(),
        eddard.clone(),
        tyrion.clone(),
        jaime.clone(),
    ];

    let books = [
        book(1, "The Hobbit", date(1937, 9, 21), 310, &[&tolkien]),
        book(2, "The Fellowship of the Ring", date(1954, 7, 29), 423, &[&tolkien]),
        book(3, "The Two Towers", date(1954, 11, 11), 352, &[&tolkien]),
        book(4, "The Return of the King", date(1955, 10, 20), 416, &[&tolkien]),
        book(5, "JavaScript: The good parts", date(2008, 5, 1), 176, &[&crockford]),
        book(6, "JavaScript: The Definitive Guide", date(1996, 8, 1), 1096, &[&flanagan]),
        book(7, "Learning Python", date(1999, 3, 1), 1600, &[&lutz]),
        book(8, "Two Scoops of Django 1.11", date(2017, 6, 1), 531, &[&greenfeld, &roy]),
        book(9, "The Rust Programming Language", date(2018, 6, 26), 552, &[&klabnik]),
        book(10, "Foundation", date(1951, 6, 1), 255, &[&asimov]),
        book(11, "The Silmarillion", date(1977, 9, 15), 365, &[&tolkien]),
    ];
    objects.extend(books.into_iter().map(Record::into_ref));

    let novels = [
        (12, "A Game of Thrones", date(1996, 8, 1), 694, &eddard),
        (13, "A Clash of Kings", date(1998, 11, 16), 768, &tyrion),
        (14, "A Storm of Swords", date(2000, 8, 8), 973, &jaime),
    ];
    for (pk, title, published, pages, protagonist) in novels {
        let novel = Record::new(NOVEL, pk)
            .with_value("title", title)
            .with_value("publication_date", published)
            .with_value("number_of_pages", pages)
            .with_many("authors", vec![martin.clone()])
            .with_value("setting", "Westeros")
            .with_one("protagonist", Some(protagonist.clone()))
            .with_many("characters", vec![eddard.clone(), tyrion.clone(), jaime.clone()]);
        objects.push(novel.into_ref());
    }

    store.insert_all(objects).unwrap();
    Arc::new(store)
}

pub struct EngineFixture {
    pub registry: Arc<TypeRegistry>,
    pub store: Arc<MemoryStore>,
    pub engine: Arc<MemoryEngine>,
    pub backend: EngineBackend,
}

/// An engine backend whose indices were rebuilt from the fixture store.
pub fn engine_fixture(config: BackendConfig) -> EngineFixture {
    let registry = registry();
    let store = store(registry.clone());
    let engine = Arc::new(MemoryEngine::new());
    let backend = EngineBackend::new(
        "default",
        config,
        registry.clone(),
        store.clone(),
        engine.clone(),
    )
    .unwrap();

    rebuild_backend(&backend, store.as_ref(), &RebuildOptions::default()).unwrap();
    backend.refresh_indexes().unwrap();
    engine.clear_requests();

    EngineFixture {
        registry,
        store,
        engine,
        backend,
    }
}

pub fn elasticsearch_fixture() -> EngineFixture {
    engine_fixture(BackendConfig::new(BackendKind::Elasticsearch7))
}

pub fn title_of(object: &ObjectRef) -> String {
    object
        .attribute("title")
        .and_then(|a| a.to_value().as_text())
        .unwrap_or_default()
}

/// Titles of the results, sorted.
pub fn titles(results: &SearchResults) -> Vec<String> {
    let mut titles: Vec<String> = results.results().unwrap().iter().map(title_of).collect();
    titles.sort();
    titles
}

pub fn sorted(items: &[&str]) -> Vec<String> {
    let mut items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    items.sort();
    items
}
