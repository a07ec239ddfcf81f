//! Scalar field definitions.

use serde::{Deserialize, Serialize};

use crate::types::ScalarType;

/// Definition of one scalar field on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name, unique within its entity.
    pub name: String,
    /// Scalar type of the stored value.
    pub scalar_type: ScalarType,
    /// Whether the field may hold null.
    pub nullable: bool,
}

impl FieldDef {
    /// Create a required field.
    pub fn new(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        FieldDef {
            name: name.into(),
            scalar_type,
            nullable: false,
        }
    }

    /// Create a nullable field.
    pub fn optional(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        FieldDef {
            name: name.into(),
            scalar_type,
            nullable: true,
        }
    }
}
