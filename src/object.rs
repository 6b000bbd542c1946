//! Objects handed to the search layer by the host application.
//!
//! The search layer never owns application state. It reads attributes through
//! the [`Searchable`] trait and resolves identifiers back to objects through an
//! [`ObjectStore`].

pub mod record;
pub mod store;
pub mod value;

pub use record::{Attribute, ObjectRef, Record, Searchable};
pub use store::{MemoryStore, ObjectSnapshot, ObjectStore, SnapshotScope, VecSnapshot};
pub use value::FieldValue;
