//! Field model: which attributes of an indexed type are searchable, filterable or related.

pub mod field;
pub mod indexed;
pub mod registry;

pub use field::{FieldKind, FieldSpec, FilterField, RelatedFields, SearchField, dedup_fields};
pub use indexed::{AttributeDef, AttributeType, IndexedType};
pub use registry::{ResolvedAttribute, TypeInfo, TypeRegistry};
