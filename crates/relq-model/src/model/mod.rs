//! Entity metamodel: entities, scalar fields, and relationships.
//!
//! The model is the read-only description of the queryable world. Queries
//! reference it through aliases and typed field handles; the resolver checks
//! every reference against it before execution.

mod entity;
mod field;
mod model;
mod relation;

pub use entity::EntityDef;
pub use field::FieldDef;
pub use model::Model;
pub use relation::{Cardinality, RelationDef};
