//! Entity definitions.

use serde::{Deserialize, Serialize};

use super::field::FieldDef;

/// Immutable descriptor of an entity: its name, identity field, and ordered
/// scalar fields.
///
/// Entity definitions are created once at startup and shared read-only by
/// every query built against the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name, unique within a model.
    pub name: String,
    /// Name of the field holding the entity's identity.
    pub identity_field: String,
    /// Scalar fields in declaration order.
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    /// Create a new entity definition with no fields yet.
    pub fn new(name: impl Into<String>, identity_field: impl Into<String>) -> Self {
        EntityDef {
            name: name.into(),
            identity_field: identity_field.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field (builder style).
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields (builder style).
    pub fn with_fields(mut self, fields: Vec<FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Look up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The identity field's definition, if it was declared.
    pub fn identity(&self) -> Option<&FieldDef> {
        self.get_field(&self.identity_field)
    }
}
