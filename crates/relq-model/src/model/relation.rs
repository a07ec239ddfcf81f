//! Relationship definitions between entities.

use serde::{Deserialize, Serialize};

/// Cardinality of a relationship, seen from its source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// Each source row references at most one target row.
    ToOne,
    /// Each source row is referenced by any number of target rows.
    ToMany,
}

/// Definition of a named relationship from one entity to another.
///
/// Rows are related when the source row's `source_field` equals the target
/// row's `target_field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relationship name, unique per source entity.
    pub name: String,
    /// Entity declaring the relationship.
    pub source: String,
    /// Entity the relationship points at.
    pub target: String,
    /// Cardinality from the source's point of view.
    pub cardinality: Cardinality,
    /// Field on the source entity holding the join key.
    pub source_field: String,
    /// Field on the target entity the join key matches.
    pub target_field: String,
}

impl RelationDef {
    /// Create a to-one relationship; the join key lives on the source.
    pub fn to_one(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        RelationDef {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            cardinality: Cardinality::ToOne,
            source_field: source_field.into(),
            target_field: target_field.into(),
        }
    }

    /// Create a to-many relationship; the join key lives on the target.
    pub fn to_many(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        RelationDef {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            cardinality: Cardinality::ToMany,
            source_field: source_field.into(),
            target_field: target_field.into(),
        }
    }

    /// Check if this relationship fans out to many target rows.
    pub fn is_to_many(&self) -> bool {
        self.cardinality == Cardinality::ToMany
    }
}
