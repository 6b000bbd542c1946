//! # searchgate
//!
//! One query and indexing API over interchangeable search engines.
//!
//! ## Features
//!
//! - Declarative field model with single-inheritance composition
//! - Engine mappings and documents built from the field model
//! - Query compilation (plain text, phrase, fuzzy, autocomplete) with filter trees
//! - Lazily evaluated, sliceable result streams with cursor paging
//! - Atomic alias-swap index rebuilds
//! - A relational fallback backend evaluated in process

pub mod backend;
pub mod cli;
pub mod engine;
pub mod error;
pub mod index;
pub mod mapping;
pub mod object;
pub mod query;
pub mod rebuild;
pub mod results;
pub mod schema;
pub mod util;

pub mod prelude {
    pub use crate::backend::{BackendFactory, SearchBackend};
    pub use crate::error::{Result, SearchGateError};
    pub use crate::object::{Attribute, FieldValue, ObjectRef, ObjectStore, Record, Searchable};
    pub use crate::query::{Filter, Operator, SearchOptions, SearchQuery, SearchScope};
    pub use crate::results::SearchResults;
    pub use crate::schema::{FieldSpec, IndexedType, TypeRegistry};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
