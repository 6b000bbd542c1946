//! Command line argument parsing for the searchgate CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::mapping::EngineKind;
use crate::query::Operator;

/// searchgate - compile searches and rebuild indices for search engines
#[derive(Parser, Debug, Clone)]
#[command(name = "searchgate")]
#[command(about = "Inspect mappings, compile queries and rebuild search indices")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct SearchGateArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl SearchGateArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Report fields declared on types that do not have them
    Check(CheckArgs),

    /// Print the engine mapping of a type
    Mapping(MappingArgs),

    /// Print the engine document of one object
    Document(DocumentArgs),

    /// Print the compiled query body and sort of a search
    Query(QueryArgs),

    /// Rebuild the indices of the configured backends
    Rebuild(RebuildArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct CheckArgs {
    /// Type registry file (JSON)
    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct MappingArgs {
    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema: PathBuf,

    /// Type identifier, e.g. searchtests.Book
    #[arg(short, long = "type", value_name = "TYPE_ID")]
    pub type_id: String,

    #[arg(short, long, default_value = "elasticsearch7")]
    pub dialect: DialectArg,
}

#[derive(Parser, Debug, Clone)]
pub struct DocumentArgs {
    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema: PathBuf,

    /// Objects as JSON lines
    #[arg(long, value_name = "DATA_FILE")]
    pub data: PathBuf,

    #[arg(short, long = "type", value_name = "TYPE_ID")]
    pub type_id: String,

    #[arg(long)]
    pub pk: String,

    #[arg(short, long, default_value = "elasticsearch7")]
    pub dialect: DialectArg,
}

#[derive(Parser, Debug, Clone)]
pub struct QueryArgs {
    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema: PathBuf,

    #[arg(short, long = "type", value_name = "TYPE_ID")]
    pub type_id: String,

    /// Query text; omit to match everything
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    #[arg(short, long, default_value = "plain")]
    pub mode: QueryMode,

    /// Restrict matching to these search fields
    #[arg(long = "field", value_name = "FIELD")]
    pub fields: Vec<String>,

    #[arg(long)]
    pub operator: Option<OperatorArg>,

    /// Compile an autocomplete query over the partial-match fields
    #[arg(long)]
    pub autocomplete: bool,

    /// Filter condition as `field[__transform][__lookup]=value`; values are JSON or plain text
    #[arg(long = "filter", value_name = "EXPR=VALUE")]
    pub filters: Vec<String>,

    /// Order by a filter field, `-` prefixed for descending; disables relevance ordering
    #[arg(long = "order-by", value_name = "FIELD", allow_hyphen_values = true)]
    pub order_by: Vec<String>,

    #[arg(short, long, default_value = "elasticsearch7")]
    pub dialect: DialectArg,
}

#[derive(Parser, Debug, Clone)]
pub struct RebuildArgs {
    /// Backend settings file (JSON); defaults to a single database backend
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema: PathBuf,

    /// Objects as JSON lines
    #[arg(long, value_name = "DATA_FILE")]
    pub data: PathBuf,

    /// Only rebuild this backend
    #[arg(short, long, value_name = "NAME")]
    pub backend: Option<String>,

    /// Recreate indices and mappings without writing documents
    #[arg(long)]
    pub schema_only: bool,

    /// Objects per bulk request
    #[arg(long, default_value = "1000")]
    pub chunk_size: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Plain,
    Phrase,
    Fuzzy,
    /// Match everything; the query text is ignored
    All,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorArg {
    And,
    Or,
}

impl From<OperatorArg> for Operator {
    fn from(arg: OperatorArg) -> Self {
        match arg {
            OperatorArg::And => Operator::And,
            OperatorArg::Or => Operator::Or,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectArg {
    Elasticsearch7,
    Elasticsearch8,
    Elasticsearch9,
    Opensearch1,
    Opensearch2,
    Opensearch3,
}

impl From<DialectArg> for EngineKind {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Elasticsearch7 => EngineKind::Elasticsearch7,
            DialectArg::Elasticsearch8 => EngineKind::Elasticsearch8,
            DialectArg::Elasticsearch9 => EngineKind::Elasticsearch9,
            DialectArg::Opensearch1 => EngineKind::Opensearch1,
            DialectArg::Opensearch2 => EngineKind::Opensearch2,
            DialectArg::Opensearch3 => EngineKind::Opensearch3,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
