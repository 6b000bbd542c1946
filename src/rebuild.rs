//! Full reindexing.

pub mod driver;
pub mod rebuilder;

pub use driver::{
    BackendOutcome, BackendReport, DEFAULT_CHUNK_SIZE, IndexGroup, IndexReport, RebuildOptions,
    TypeReport, group_types_by_index, rebuild_all, rebuild_backend,
};
pub use rebuilder::{AtomicRebuilder, IndexRebuilder, RebuildState, SimpleRebuilder};
