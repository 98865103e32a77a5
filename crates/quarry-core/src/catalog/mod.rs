//! Model catalog.
//!
//! The catalog describes entities, their table mapping and the relations
//! between them. Descriptor sets are derived from it once per model and
//! query options.

mod entity;
mod field;
mod model;
mod relation;

pub use entity::{EntityDef, Hierarchy, LifecycleRules, SOFT_DELETE_FIELD};
pub use field::FieldDef;
pub use model::{Model, ModelId};
pub use relation::{Cardinality, RelationDef};
