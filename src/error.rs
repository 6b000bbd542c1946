//! Error types for the searchgate library.
//!
//! Every fallible operation returns [`SearchGateError`]. The variants separate
//! problems in the caller's query (filters, unknown fields, unsupported query
//! kinds) from configuration problems and from failures reported by the search
//! engine, so callers can decide what to surface, what to retry and what to fix.
//!
//! # Examples
//!
//! ```
//! use searchgate::error::{SearchGateError, Result};
//!
//! fn compile() -> Result<()> {
//!     Err(SearchGateError::filter("Lookup \"iregex\" not recognised"))
//! }
//!
//! let err = compile().unwrap_err();
//! assert!(err.is_query_error());
//! assert!(!err.is_transient());
//! ```

use std::io;

use anyhow;
use thiserror::Error;

/// The main error type for searchgate operations.
#[derive(Error, Debug)]
pub enum SearchGateError {
    /// I/O errors (reading schema, config or data files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The caller supplied a lookup or filter shape that cannot be compiled.
    #[error("Filter error: {0}")]
    Filter(String),

    /// A filter names a field that is not declared as a `FilterField`.
    #[error("Filter field error: {message}")]
    FilterField { field_name: String, message: String },

    /// A query targets a field that is not declared as a `SearchField`.
    #[error("Search field error: {message}")]
    SearchField { field_name: String, message: String },

    /// An ordering names a field that is not declared as a `FilterField`.
    #[error("Order by field error: {message}")]
    OrderByField { field_name: String, message: String },

    /// The query kind is not supported in the requested mode.
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// A declared field does not exist on the indexed type.
    #[error("Mapping configuration error: {0}")]
    MappingConfiguration(String),

    /// The type registry could not be built.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Network, timeout or 5xx failure; the request may succeed if retried.
    #[error("Transient backend error: {0}")]
    TransientBackend(String),

    /// The engine rejected a request.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A swap reported success but the new index could not be verified.
    #[error("Inconsistent index state: {0}")]
    InconsistentIndexState(String),

    /// A rebuild step failed; carries where it stopped.
    #[error("Rebuild of index \"{index}\" on backend \"{backend}\" failed during {stage}: {source}")]
    Rebuild {
        backend: String,
        index: String,
        stage: String,
        #[source]
        source: Box<SearchGateError>,
    },

    /// Invalid operation for the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with SearchGateError.
pub type Result<T> = std::result::Result<T, SearchGateError>;

impl SearchGateError {
    /// Create a new filter error.
    pub fn filter<S: Into<String>>(msg: S) -> Self {
        SearchGateError::Filter(msg.into())
    }

    /// Create a new filter field error.
    pub fn filter_field<S: Into<String>, M: Into<String>>(field_name: S, msg: M) -> Self {
        SearchGateError::FilterField {
            field_name: field_name.into(),
            message: msg.into(),
        }
    }

    /// Create a new search field error.
    pub fn search_field<S: Into<String>, M: Into<String>>(field_name: S, msg: M) -> Self {
        SearchGateError::SearchField {
            field_name: field_name.into(),
            message: msg.into(),
        }
    }

    /// Create a new order by field error.
    pub fn order_by_field<S: Into<String>, M: Into<String>>(field_name: S, msg: M) -> Self {
        SearchGateError::OrderByField {
            field_name: field_name.into(),
            message: msg.into(),
        }
    }

    /// Create a new unsupported query error.
    pub fn unsupported_query<S: Into<String>>(msg: S) -> Self {
        SearchGateError::UnsupportedQuery(msg.into())
    }

    /// Create a new mapping configuration error.
    pub fn mapping_configuration<S: Into<String>>(msg: S) -> Self {
        SearchGateError::MappingConfiguration(msg.into())
    }

    /// Create a new schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        SearchGateError::Schema(msg.into())
    }

    /// Create a new transient backend error.
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        SearchGateError::TransientBackend(msg.into())
    }

    /// Create a new timeout error. Timeouts are transient.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        SearchGateError::TransientBackend(format!("Timeout: {}", msg.into()))
    }

    /// Create a new backend error.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        SearchGateError::Backend(msg.into())
    }

    /// Create a new inconsistent index state error.
    pub fn inconsistent<S: Into<String>>(msg: S) -> Self {
        SearchGateError::InconsistentIndexState(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        SearchGateError::InvalidOperation(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        SearchGateError::Config(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SearchGateError::Other(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        SearchGateError::Other(format!("Not found: {}", msg.into()))
    }

    /// Wrap an error raised by a rebuild step with the backend, index and stage it happened in.
    pub fn rebuild<B, I, S>(backend: B, index: I, stage: S, source: SearchGateError) -> Self
    where
        B: Into<String>,
        I: Into<String>,
        S: Into<String>,
    {
        SearchGateError::Rebuild {
            backend: backend.into(),
            index: index.into(),
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchGateError::TransientBackend(_) => true,
            SearchGateError::Rebuild { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Whether the error was caused by the shape of the caller's query.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            SearchGateError::Filter(_)
                | SearchGateError::FilterField { .. }
                | SearchGateError::SearchField { .. }
                | SearchGateError::OrderByField { .. }
                | SearchGateError::UnsupportedQuery(_)
        )
    }

    /// The offending field name for field-specific query errors.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            SearchGateError::FilterField { field_name, .. }
            | SearchGateError::SearchField { field_name, .. }
            | SearchGateError::OrderByField { field_name, .. } => Some(field_name),
            _ => None,
        }
    }
}
