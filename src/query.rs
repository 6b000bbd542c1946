//! Query model and compilation into engine request bodies.

pub mod compiler;
pub mod filter;
pub mod search_query;

pub use compiler::{
    CompileMode, QueryDocument, SearchOptions, SearchQueryCompiler, SearchScope, check_query,
    compile, compile_autocomplete, resolve_filter_field,
};
pub use filter::{Condition, Filter, SUPPORTED_LOOKUPS};
pub use search_query::{Operator, SearchQuery};
