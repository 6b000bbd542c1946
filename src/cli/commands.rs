//! Command implementations for the searchgate CLI.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use serde_json::{Value, json};

use crate::backend::{BackendFactory, SearchSettings};
use crate::cli::args::*;
use crate::cli::output::*;
use crate::engine::{EngineClient, MemoryEngine};
use crate::error::{Result, SearchGateError};
use crate::mapping::{Mapping, dialect_for};
use crate::object::{FieldValue, MemoryStore, ObjectStore};
use crate::query::{
    Filter, SearchOptions, SearchQuery, SearchScope, compile, compile_autocomplete,
    resolve_filter_field,
};
use crate::rebuild::{RebuildOptions, rebuild_all};
use crate::schema::{AttributeType, TypeInfo, TypeRegistry};

/// Execute a CLI command.
pub fn execute_command(args: SearchGateArgs) -> Result<()> {
    match &args.command {
        Command::Check(check_args) => check_schema(check_args, &args),
        Command::Mapping(mapping_args) => show_mapping(mapping_args, &args),
        Command::Document(document_args) => show_document(document_args, &args),
        Command::Query(query_args) => show_query(query_args, &args),
        Command::Rebuild(rebuild_args) => rebuild(rebuild_args, &args),
    }
}

pub fn load_registry(path: &Path) -> Result<Arc<TypeRegistry>> {
    info!("Loading schema from {}", path.display());
    Ok(Arc::new(TypeRegistry::load(path)?))
}

pub fn load_store(registry: Arc<TypeRegistry>, path: &Path) -> Result<Arc<MemoryStore>> {
    let store = MemoryStore::new(registry);
    let file = File::open(path)?;
    let loaded = store.load_json_lines(BufReader::new(file))?;
    info!("Loaded {loaded} objects from {}", path.display());
    Ok(Arc::new(store))
}

fn check_schema(args: &CheckArgs, cli_args: &SearchGateArgs) -> Result<()> {
    let registry = load_registry(&args.schema)?;
    let problems: Vec<String> = registry.check().iter().map(|e| e.to_string()).collect();
    let result = CheckResult {
        types: registry.types().count(),
        indexed_types: registry.indexed_types().count(),
        problems,
    };
    output_check(&result, cli_args)?;

    if result.problems.is_empty() {
        Ok(())
    } else {
        Err(SearchGateError::mapping_configuration(format!(
            "{} problem(s) found",
            result.problems.len()
        )))
    }
}

fn show_mapping(args: &MappingArgs, cli_args: &SearchGateArgs) -> Result<()> {
    let registry = load_registry(&args.schema)?;
    let dialect = dialect_for(args.dialect.into());
    let mapping = Mapping::new(&registry, dialect.as_ref(), &args.type_id)?;
    output_json_document(&mapping.build_mapping(), cli_args)
}

fn show_document(args: &DocumentArgs, cli_args: &SearchGateArgs) -> Result<()> {
    let registry = load_registry(&args.schema)?;
    let store = load_store(registry.clone(), &args.data)?;
    let object = store
        .resolve(&args.type_id, std::slice::from_ref(&args.pk))?
        .remove(&args.pk)
        .ok_or_else(|| SearchGateError::not_found(format!("{} {}", args.type_id, args.pk)))?;

    let dialect = dialect_for(args.dialect.into());
    let mapping = Mapping::new(&registry, dialect.as_ref(), object.type_id())?;
    let document = json!({
        "_id": mapping.document_id(object.as_ref()),
        "_source": mapping.build_document(object.as_ref()),
    });
    output_json_document(&document, cli_args)
}

fn show_query(args: &QueryArgs, cli_args: &SearchGateArgs) -> Result<()> {
    let registry = load_registry(&args.schema)?;
    let info = registry.get(&args.type_id)?;

    let mut scope = SearchScope::new(&args.type_id).order_by(args.order_by.iter().cloned());
    for raw in &args.filters {
        scope = scope.filter(parse_filter_arg(info, raw)?);
    }

    let text = args.query.clone().unwrap_or_default();
    let query = match (args.mode, args.query.is_some()) {
        (QueryMode::All, _) | (_, false) => SearchQuery::MatchAll,
        (QueryMode::Plain, true) => SearchQuery::plain(text),
        (QueryMode::Phrase, true) => SearchQuery::phrase(text),
        (QueryMode::Fuzzy, true) => SearchQuery::fuzzy(text),
    };

    let mut options = SearchOptions::default().order_by_relevance(args.order_by.is_empty());
    if !args.fields.is_empty() {
        options = options.fields(args.fields.iter().cloned());
    }
    if let Some(operator) = args.operator {
        options = options.operator(operator.into());
    }

    let dialect = dialect_for(args.dialect.into());
    let document = if args.autocomplete {
        compile_autocomplete(&registry, dialect.as_ref(), &scope, query, options)?
    } else {
        compile(&registry, dialect.as_ref(), &scope, query, options)?
    };
    output_json_document(&serde_json::to_value(&document)?, cli_args)
}

/// Parse `expression=value`. The value is read as JSON when possible and then
/// typed after the attribute it filters on.
pub fn parse_filter_arg(info: &TypeInfo, raw: &str) -> Result<Filter> {
    let (expression, raw_value) = raw.split_once('=').ok_or_else(|| {
        SearchGateError::filter(format!("Filter \"{raw}\" must have the form field=value"))
    })?;
    let Filter::Condition(mut condition) = Filter::parse(expression.trim(), FieldValue::Null)?
    else {
        return Err(SearchGateError::filter(format!("Cannot parse filter \"{raw}\"")));
    };

    let raw_value = raw_value.trim();
    let json: Value =
        serde_json::from_str(raw_value).unwrap_or_else(|_| Value::String(raw_value.to_string()));

    let declared = resolve_filter_field(info, &condition.field).unwrap_or(&condition.field);
    let kind = if condition.lookup == "isnull" {
        AttributeType::Boolean
    } else if condition.transform.is_some() {
        AttributeType::Integer
    } else {
        match info.attribute(declared).map(|a| &a.kind) {
            Some(AttributeType::Relation { .. }) if json.is_string() => AttributeType::Text,
            Some(AttributeType::Relation { .. }) => AttributeType::Integer,
            Some(kind) => kind.clone(),
            None => AttributeType::Text,
        }
    };

    condition.value = FieldValue::from_json(&json, &kind).map_err(|e| {
        SearchGateError::filter(format!("Invalid value for filter \"{expression}\": {e}"))
    })?;
    Ok(Filter::Condition(condition))
}

fn rebuild(args: &RebuildArgs, cli_args: &SearchGateArgs) -> Result<()> {
    let settings = match &args.config {
        Some(path) => SearchSettings::load(path)?,
        None => SearchSettings::default(),
    };
    let registry = load_registry(&args.schema)?;
    for problem in registry.check() {
        warn!("{problem}");
    }
    let store = load_store(registry.clone(), &args.data)?;

    // Engine backends run against an in-process engine: a dry run of the protocol.
    let factory = BackendFactory::new(settings, registry, store.clone()).client_factory(
        |name, client| {
            info!(
                "Backend {name}: rebuilding against an in-process engine instead of {} (timeout {}s)",
                client
                    .hosts
                    .iter()
                    .map(|h| h.base_url())
                    .collect::<Vec<_>>()
                    .join(", "),
                client.timeout.as_secs()
            );
            Ok(Arc::new(MemoryEngine::new()) as Arc<dyn EngineClient>)
        },
    );

    let backends = match &args.backend {
        Some(name) => vec![factory.create(name)?],
        None => factory.create_all(false)?,
    };
    let options = RebuildOptions::default()
        .chunk_size(args.chunk_size)
        .schema_only(args.schema_only);

    let outcomes = rebuild_all(&backends, store.as_ref(), &options);
    let result = RebuildResult {
        backends: outcomes.iter().map(BackendSummary::from).collect(),
    };
    output_rebuild(&result, cli_args)?;

    match result.failed() {
        0 => Ok(()),
        failed => Err(SearchGateError::other(format!(
            "{failed} of {} backend(s) failed to rebuild",
            result.backends.len()
        ))),
    }
}
