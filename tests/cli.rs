//! The command line front end, run against files in a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tempfile::{Builder, TempDir};

use searchgate::cli::{SearchGateArgs, execute_command, load_registry, load_store, parse_filter_arg};
use searchgate::error::Result;
use searchgate::object::{ObjectStore, Searchable};
use searchgate::query::Filter;

const SCHEMA: &str = r#"{
    "types": [
        {
            "app_label": "searchtests",
            "model_name": "Author",
            "attributes": [
                {"name": "name", "type": "text"},
                {"name": "date_of_birth", "type": "date"}
            ],
            "search_fields": [
                {"kind": "search", "field_name": "name", "partial_match": true},
                {"kind": "filter", "field_name": "date_of_birth"}
            ]
        },
        {
            "app_label": "searchtests",
            "model_name": "Book",
            "attributes": [
                {"name": "title", "type": "text"},
                {"name": "publication_date", "type": "date"},
                {"name": "number_of_pages", "type": "integer"},
                {"name": "authors", "type": "relation", "target": "searchtests.Author", "many": true}
            ],
            "search_fields": [
                {"kind": "search", "field_name": "title", "boost": 2.0, "partial_match": true},
                {"kind": "related", "field_name": "authors", "fields": [
                    {"kind": "search", "field_name": "name"}
                ]},
                {"kind": "filter", "field_name": "publication_date"},
                {"kind": "filter", "field_name": "number_of_pages"}
            ]
        },
        {
            "app_label": "searchtests",
            "model_name": "Novel",
            "parent": "searchtests.Book",
            "attributes": [
                {"name": "setting", "type": "text"}
            ],
            "search_fields": [
                {"kind": "search", "field_name": "setting", "partial_match": true}
            ]
        }
    ]
}"#;

const DATA: &str = r#"
{"type": "searchtests.Author", "pk": 1, "name": "J. R. R. Tolkien", "date_of_birth": "1892-01-03"}
{"type": "searchtests.Author", "pk": 2, "name": "George R. R. Martin", "date_of_birth": "1948-09-20"}
{"type": "searchtests.Book", "pk": 1, "title": "The Hobbit", "publication_date": "1937-09-21", "number_of_pages": 310, "authors": [1]}
{"type": "searchtests.Novel", "pk": 2, "title": "A Game of Thrones", "publication_date": "1996-08-01", "number_of_pages": 694, "authors": [2], "setting": "Westeros"}
"#;

struct Workspace {
    _dir: TempDir,
    schema: PathBuf,
    data: PathBuf,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = Builder::new().prefix("test_cli").tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let schema = root.join("schema.json");
        let data = root.join("data.jsonl");
        fs::write(&schema, SCHEMA).unwrap();
        fs::write(&data, DATA.trim_start()).unwrap();
        Workspace {
            _dir: dir,
            schema,
            data,
            root,
        }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, contents).unwrap();
        path
    }
}

fn run(args: &[&str]) -> Result<()> {
    let mut argv = vec!["searchgate", "--quiet", "--format", "json"];
    argv.extend_from_slice(args);
    execute_command(SearchGateArgs::try_parse_from(argv).unwrap())
}

fn path(p: &Path) -> &str {
    p.to_str().unwrap()
}

#[test]
fn test_load_schema_and_data() -> Result<()> {
    let workspace = Workspace::new();
    let registry = load_registry(&workspace.schema)?;
    assert_eq!(registry.types().count(), 3);
    assert_eq!(registry.get("searchtests.Novel")?.root(), "searchtests.Book");

    let store = load_store(registry, &workspace.data)?;
    assert_eq!(store.len(), 4);
    let novel = store
        .resolve("searchtests.Novel", &["2".to_string()])?
        .remove("2")
        .unwrap();
    assert_eq!(novel.type_id(), "searchtests.Novel");
    Ok(())
}

#[test]
fn test_check_reports_problems() -> Result<()> {
    let workspace = Workspace::new();
    run(&["check", "-s", path(&workspace.schema)])?;

    let broken = workspace.write(
        "broken.json",
        r#"{"types": [{
            "app_label": "searchtests",
            "model_name": "Book",
            "attributes": [{"name": "title", "type": "text"}],
            "search_fields": [
                {"kind": "search", "field_name": "title"},
                {"kind": "filter", "field_name": "isbn"}
            ]
        }]}"#,
    );
    let err = run(&["check", "-s", path(&broken)]).unwrap_err();
    assert!(err.to_string().contains("1 problem(s) found"), "{err}");
    Ok(())
}

#[test]
fn test_mapping_and_document() -> Result<()> {
    let workspace = Workspace::new();
    run(&["mapping", "-s", path(&workspace.schema), "-t", "searchtests.Novel"])?;
    run(&[
        "mapping",
        "-s",
        path(&workspace.schema),
        "-t",
        "searchtests.Book",
        "--dialect",
        "opensearch3",
    ])?;
    run(&[
        "document",
        "-s",
        path(&workspace.schema),
        "--data",
        path(&workspace.data),
        "-t",
        "searchtests.Book",
        "--pk",
        "2",
    ])?;

    let err = run(&[
        "document",
        "-s",
        path(&workspace.schema),
        "--data",
        path(&workspace.data),
        "-t",
        "searchtests.Book",
        "--pk",
        "99",
    ])
    .unwrap_err();
    assert!(err.to_string().contains("99"));

    assert!(run(&["mapping", "-s", path(&workspace.schema), "-t", "searchtests.Magazine"]).is_err());
    Ok(())
}

#[test]
fn test_query_compilation() -> Result<()> {
    let workspace = Workspace::new();
    let schema = path(&workspace.schema);

    run(&["query", "-s", schema, "-t", "searchtests.Book", "Hobbit"])?;
    run(&[
        "query",
        "-s",
        schema,
        "-t",
        "searchtests.Book",
        "--filter",
        "publication_date__year__lt=1950",
        "--filter",
        "number_of_pages__gte=300",
        "--order-by",
        "-number_of_pages",
    ])?;
    run(&[
        "query",
        "-s",
        schema,
        "-t",
        "searchtests.Novel",
        "Wes",
        "--autocomplete",
        "--field",
        "setting",
        "--operator",
        "and",
    ])?;

    let err = run(&[
        "query",
        "-s",
        schema,
        "-t",
        "searchtests.Book",
        "--filter",
        "title=The Hobbit",
    ])
    .unwrap_err();
    assert!(err.is_query_error());
    assert_eq!(err.field_name(), Some("title"));

    let err = run(&[
        "query",
        "-s",
        schema,
        "-t",
        "searchtests.Book",
        "Hobit",
        "--mode",
        "fuzzy",
        "--autocomplete",
    ])
    .unwrap_err();
    assert!(err.is_query_error());
    Ok(())
}

#[test]
fn test_filter_arguments() -> Result<()> {
    let workspace = Workspace::new();
    let registry = load_registry(&workspace.schema)?;
    let info = registry.get("searchtests.Book")?;

    assert_eq!(
        parse_filter_arg(info, "number_of_pages__lt=400")?,
        Filter::lookup("number_of_pages", "lt", 400i64)
    );
    assert_eq!(
        parse_filter_arg(info, "publication_date__year__gte=1950")?,
        Filter::year("publication_date", "gte", 1950)
    );
    assert!(parse_filter_arg(info, "number_of_pages=many").is_err());
    Ok(())
}

#[test]
fn test_rebuild_dry_run() -> Result<()> {
    let workspace = Workspace::new();
    let schema = path(&workspace.schema);
    let data = path(&workspace.data);

    // Default settings hold a single database backend.
    run(&["rebuild", "-s", schema, "--data", data])?;

    let config = workspace.write(
        "backends.json",
        r#"{"backends": {
            "default": {"backend": "database"},
            "search": {"backend": "elasticsearch8", "urls": ["http://localhost:9200"], "index_prefix": "cli_"}
        }}"#,
    );
    let config = path(&config);
    run(&["rebuild", "-c", config, "-s", schema, "--data", data, "--chunk-size", "1"])?;
    run(&["rebuild", "-c", config, "-s", schema, "--data", data, "-b", "search", "--schema-only"])?;

    assert!(run(&["rebuild", "-c", config, "-s", schema, "--data", data, "-b", "missing"]).is_err());
    assert!(run(&["rebuild", "-c", config, "-s", schema, "--data", data, "--chunk-size", "0"]).is_err());
    Ok(())
}
